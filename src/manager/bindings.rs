//! Environment binding tracker.
//!
//! Keeps the attribution of registered environments to the package and
//! source that provided them, mirrored into the registry's display fields.

use log::debug;
use std::collections::BTreeMap;

use crate::package::PackageRecord;
use crate::registry::Registry;

/// One environment attributed to a package.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentBinding {
    pub environment_id: String,
    pub package_name: String,
    pub source: String,
}

#[derive(Debug, Default)]
pub struct BindingTracker {
    // keyed by lower-cased environment id
    bindings: BTreeMap<String, EnvironmentBinding>,
    packages: BTreeMap<String, PackageRecord>,
}

impl BindingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn contains(&self, env_id: &str) -> bool {
        self.bindings.contains_key(&env_id.to_lowercase())
    }

    pub fn binding(&self, env_id: &str) -> Option<&EnvironmentBinding> {
        self.bindings.get(&env_id.to_lowercase())
    }

    pub fn bindings(&self) -> impl Iterator<Item = &EnvironmentBinding> {
        self.bindings.values()
    }

    /// Attribute a registered environment to `record`, updating the
    /// registry entry's display fields. Returns false if the registry does
    /// not know the environment.
    pub fn add_binding<G: Registry>(
        &mut self,
        registry: &mut G,
        env_id: &str,
        record: &PackageRecord,
    ) -> bool {
        let Some(spec) = registry.spec_mut(env_id) else {
            return false;
        };
        spec.source = Some(record.source.clone());
        spec.package = Some(record.display_label());

        self.bindings.insert(
            env_id.to_lowercase(),
            EnvironmentBinding {
                environment_id: env_id.to_string(),
                package_name: record.name.clone(),
                source: record.source.clone(),
            },
        );
        true
    }

    /// Deregister every environment attributed to `source`.
    ///
    /// Each environment is removed from the registry before it is dropped
    /// locally. Package records left without bindings are forgotten.
    /// Returns the removed identifiers.
    pub fn remove_bindings_for_source<G: Registry>(
        &mut self,
        registry: &mut G,
        source: &str,
    ) -> Vec<String> {
        let mut ids: Vec<String> = registry
            .list()
            .into_iter()
            .filter(|id| {
                registry
                    .spec(id)
                    .and_then(|spec| spec.source.as_deref())
                    == Some(source)
            })
            .collect();
        for binding in self.bindings.values() {
            if binding.source == source
                && !ids
                    .iter()
                    .any(|id| id.to_lowercase() == binding.environment_id.to_lowercase())
            {
                ids.push(binding.environment_id.clone());
            }
        }

        for id in &ids {
            if registry.spec(id).is_some() {
                registry.deregister(id);
            }
            self.bindings.remove(&id.to_lowercase());
        }
        if !ids.is_empty() {
            debug!("Deregistered {} environment(s) from {}", ids.len(), source);
        }

        let owners: Vec<String> = self.bindings.values().map(|b| b.package_name.clone()).collect();
        self.packages.retain(|name, _| owners.contains(name));
        ids
    }

    /// Identifiers currently attributed to `package`, in original case.
    pub fn bindings_for_package(&self, package: &str) -> Vec<&str> {
        self.bindings
            .values()
            .filter(|b| b.package_name == package)
            .map(|b| b.environment_id.as_str())
            .collect()
    }

    pub fn record(&self, package: &str) -> Option<&PackageRecord> {
        self.packages.get(package)
    }

    /// Package records, ordered by name.
    pub fn records(&self) -> impl Iterator<Item = &PackageRecord> {
        self.packages.values()
    }

    pub fn records_for_source(&self, source: &str) -> Vec<PackageRecord> {
        self.packages
            .values()
            .filter(|r| r.source == source)
            .cloned()
            .collect()
    }

    /// Record a package that owns at least one binding.
    pub fn insert_record(&mut self, record: PackageRecord) {
        self.packages.insert(record.name.clone(), record);
    }

    /// Forget a package and deregister whatever it still owns.
    pub fn forget_package<G: Registry>(&mut self, registry: &mut G, package: &str) {
        let ids: Vec<String> = self
            .bindings_for_package(package)
            .into_iter()
            .map(String::from)
            .collect();
        for id in ids {
            registry.deregister(&id);
            self.bindings.remove(&id.to_lowercase());
        }
        self.packages.remove(package);
    }
}
