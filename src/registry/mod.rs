//! Environment registry.
//!
//! The host owns the registry; this crate only needs the operations below.
//! `EnvRegistry` is the in-process implementation used by the CLI.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A registered environment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnvSpec {
    /// Identifier of the form `owner/Name-vN` (or `Name-vN` for core environments).
    pub id: String,
    /// Factory reference provided by the package, e.g. `envpack.envs:EnvA`.
    pub entry_point: Option<String>,
    /// Display field: where the environment was pulled from.
    pub source: Option<String>,
    /// Display field: owning package and version.
    pub package: Option<String>,
}

impl EnvSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry_point: None,
            source: None,
            package: None,
        }
    }

    pub fn with_entry_point(mut self, entry_point: Option<String>) -> Self {
        self.entry_point = entry_point;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    InvalidId(String),
    AlreadyRegistered(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidId(id) => write!(
                f,
                "Attempted to register malformed environment ID: {}. (Currently all IDs must be of the form owner/Name-vVersion.)",
                id
            ),
            RegistryError::AlreadyRegistered(id) => {
                write!(f, "Cannot re-register id: {}", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

pub trait Registry {
    fn register(&mut self, spec: EnvSpec) -> Result<(), RegistryError>;

    /// Remove an environment. Warns and returns false if it was not registered.
    fn deregister(&mut self, id: &str) -> bool;

    /// All identifiers, sorted case-insensitively.
    fn list(&self) -> Vec<String>;

    fn spec(&self, id: &str) -> Option<&EnvSpec>;

    fn spec_mut(&mut self, id: &str) -> Option<&mut EnvSpec>;
}

/// Check an identifier against `^([\w/:-]+)-v(\d+)$`.
pub fn is_valid_env_id(id: &str) -> bool {
    let Some((name, version)) = id.rsplit_once("-v") else {
        return false;
    };
    !name.is_empty()
        && !version.is_empty()
        && version.chars().all(|c| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '/' | ':' | '-'))
}

/// In-memory registry keyed by identifier.
#[derive(Debug, Default)]
pub struct EnvRegistry {
    specs: BTreeMap<String, EnvSpec>,
}

impl EnvRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &EnvSpec> {
        self.specs.values()
    }
}

impl Registry for EnvRegistry {
    fn register(&mut self, spec: EnvSpec) -> Result<(), RegistryError> {
        if !is_valid_env_id(&spec.id) {
            return Err(RegistryError::InvalidId(spec.id));
        }
        if self.specs.contains_key(&spec.id) {
            return Err(RegistryError::AlreadyRegistered(spec.id));
        }
        self.specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    fn deregister(&mut self, id: &str) -> bool {
        if self.specs.remove(id).is_none() {
            warn!(
                "Unable to deregister id: {}. Are you certain it is registered?",
                id
            );
            return false;
        }
        true
    }

    fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.specs.keys().cloned().collect();
        ids.sort_by_key(|id| id.to_lowercase());
        ids
    }

    fn spec(&self, id: &str) -> Option<&EnvSpec> {
        self.specs.get(id)
    }

    fn spec_mut(&mut self, id: &str) -> Option<&mut EnvSpec> {
        self.specs.get_mut(id)
    }
}
