//! Package management module
//!
//! This module provides abstractions for the packages pulled into the host:
//! installer plumbing, installed-package snapshots, version ordering, source
//! parsing and the persisted package cache.

mod cache;
mod inventory;
mod pip;
mod source;
pub mod version;

use serde::{Deserialize, Serialize};

pub use cache::{CacheLine, CacheLines, PackageCache};
pub use inventory::{ChangeKind, Inventory, PackageChange};
pub use pip::Pip;
pub use source::{PullSource, SUPPORTED_HOST, USAGE};
pub use version::LooseVersion;

/// A package pulled from a source, as stored in the cache.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub source: String,
}

impl PackageRecord {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source: source.into(),
        }
    }

    /// Module providing the package's environments (`alice-envpack` -> `alice_envpack`).
    pub fn module_name(&self) -> String {
        self.name.replace('-', "_")
    }

    /// Label shown on registry entries, e.g. `alice-envpack (1.0.0)`.
    pub fn display_label(&self) -> String {
        format!("{} ({})", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization() {
        let record = PackageRecord::new("alice-envpack", "1.0.0", "github.com/alice/envpack");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"name":"alice-envpack","version":"1.0.0","source":"github.com/alice/envpack"}"#
        );
        assert_eq!(record.module_name(), "alice_envpack");
        assert_eq!(record.display_label(), "alice-envpack (1.0.0)");
    }
}
