//! Package manager - reconciles installed packages with registered environments.
//!
//! The manager itself is stateless apart from its collaborators. Everything
//! that changes across operations lives in a [`Session`] owned by the caller.

mod bindings;
mod load;
mod outcome;
mod pull;

use anyhow::Result;
use log::{debug, warn};
use std::collections::BTreeSet;

use crate::config::Config;
use crate::package::{Inventory, PackageCache, PackageRecord, Pip};
use crate::plugin::{LoadError, PluginLoader};
use crate::registry::{EnvSpec, Registry};
use crate::runtime::Runtime;

pub use bindings::{BindingTracker, EnvironmentBinding};
pub use outcome::PullOutcome;

/// Reconciliation state carried between operations.
#[derive(Debug, Default)]
pub struct Session {
    pub bindings: BindingTracker,
    cache_dirty: bool,
    loaded_modules: BTreeSet<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cache file no longer matches the records and must be rewritten.
    pub fn is_cache_dirty(&self) -> bool {
        self.cache_dirty
    }

    pub fn mark_cache_dirty(&mut self) {
        self.cache_dirty = true;
    }

    pub fn is_loaded(&self, module: &str) -> bool {
        self.loaded_modules.contains(module)
    }
}

pub struct PackageManager<'a, R: Runtime, L: PluginLoader> {
    pip: Pip<'a, R>,
    cache: PackageCache<'a, R>,
    loader: &'a L,
    host_package: String,
}

impl<'a, R: Runtime, L: PluginLoader> PackageManager<'a, R, L> {
    pub fn new(runtime: &'a R, loader: &'a L, config: &Config) -> Self {
        Self {
            pip: Pip::new(runtime, config.pip.clone()),
            cache: PackageCache::new(runtime, config.cache_path.clone()),
            loader,
            host_package: config.host_package.clone(),
        }
    }

    /// Rewrite the cache from the session's records.
    pub fn persist(&self, session: &mut Session) -> Result<()> {
        self.cache.save(session.bindings.records())?;
        session.cache_dirty = false;
        Ok(())
    }

    fn uninstall(&self, package: &str) -> Result<()> {
        let code = self.pip.uninstall(package)?;
        if code != 0 {
            warn!(
                "Uninstalling \"{}\" failed with exit code {}. You may need to remove it manually.",
                package, code
            );
        }
        Ok(())
    }

    /// Load a package's plugin and bind the environments it newly provides.
    ///
    /// Returns the identifiers attributed to the package. The package is
    /// recorded only if it ends up owning at least one environment.
    fn load_package<G: Registry>(
        &self,
        session: &mut Session,
        registry: &mut G,
        record: &PackageRecord,
        installed: &Inventory,
    ) -> Result<Vec<String>> {
        let Some(installed_version) = installed.get(&record.name) else {
            session.cache_dirty = true;
            warn!(
                "The package \"{}\" does not seem to be installed anymore. User environments from this \
                 package will not be registered, and the package will no longer be loaded.",
                record.name
            );
            return Ok(Vec::new());
        };
        let mut record = record.clone();
        if record.version != installed_version {
            session.cache_dirty = true;
            record.version = installed_version.to_string();
        }

        let module = record.module_name();
        let reload = session.loaded_modules.contains(&module);
        if reload {
            session.cache_dirty = true;
        }

        let known: BTreeSet<String> = registry
            .list()
            .into_iter()
            .map(|id| id.to_lowercase())
            .collect();

        let provided = match self.loader.load(&module, reload) {
            Ok(provided) => {
                session.loaded_modules.insert(module);
                provided
            }
            Err(e) if e.is_declared_plugin() => {
                session.cache_dirty = true;
                warn!(
                    "Unable to load the module \"{}\" from package \"{}\" ({}): {}. The package will be \
                     uninstalled and no longer be loaded.",
                    module, record.name, record.version, e
                );
                session.bindings.forget_package(registry, &record.name);
                self.uninstall(&record.name)?;
                return Ok(Vec::new());
            }
            Err(e @ LoadError::Failed(_)) => {
                warn!(
                    "Unable to load the module \"{}\" from package \"{}\" ({}): {}. No user \
                     environments were registered from it.",
                    module, record.name, record.version, e
                );
                return Ok(Vec::new());
            }
            Err(e) => {
                debug!(
                    "Skipping module \"{}\" from package \"{}\": {}",
                    module, record.name, e
                );
                return Ok(Vec::new());
            }
        };

        let mut registered = Vec::new();
        for env in provided {
            if known.contains(&env.id.to_lowercase()) {
                debug!("Environment {} is already registered, skipping", env.id);
                continue;
            }
            let spec = EnvSpec::new(env.id.clone()).with_entry_point(env.entry_point);
            if let Err(e) = registry.register(spec) {
                warn!("Package \"{}\": {}", record.name, e);
                continue;
            }
            session.bindings.add_binding(registry, &env.id, &record);
            registered.push(env.id);
        }

        if !registered.is_empty() {
            session.bindings.insert_record(record);
        }
        Ok(registered)
    }
}
