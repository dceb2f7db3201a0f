//! Plugin loading.
//!
//! An installed package provides environments through an explicit entry
//! point. Loading a package returns the identifiers (and factory references)
//! it provides; registering them is up to the caller.

mod python;

use serde::Deserialize;
use std::fmt;

pub use python::PythonLoader;

/// An environment offered by a package's entry point.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ProvidedEnv {
    pub id: String,
    #[serde(default)]
    pub entry_point: Option<String>,
}

impl ProvidedEnv {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry_point: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The module could not be imported at all.
    NotFound(String),
    /// The module imported but does not declare the entry point.
    NotPlugin,
    /// The module declares the entry point but it failed.
    Broken(String),
    /// Anything else (interpreter missing, garbled output).
    Failed(String),
}

impl LoadError {
    /// Only packages that declared themselves plugins are removed on failure;
    /// other failures are usually unrelated dependencies.
    pub fn is_declared_plugin(&self) -> bool {
        matches!(self, LoadError::Broken(_))
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NotFound(msg) => write!(f, "module not found: {}", msg),
            LoadError::NotPlugin => write!(f, "module does not provide environments"),
            LoadError::Broken(msg) => write!(f, "environment entry point failed: {}", msg),
            LoadError::Failed(msg) => write!(f, "unable to load module: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

#[cfg_attr(test, mockall::automock)]
pub trait PluginLoader {
    /// Load `module` (reloading it when `reload` is set) and return the
    /// environments it provides.
    fn load(&self, module: &str, reload: bool) -> Result<Vec<ProvidedEnv>, LoadError>;
}
