pub mod config;
pub mod manager;
pub mod package;
pub mod plugin;
pub mod registry;
pub mod runtime;
pub mod scoreboard;
