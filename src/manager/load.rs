//! Restoring user environments recorded in the cache.

use anyhow::Result;
use log::{debug, info, warn};

use crate::package::CacheLine;
use crate::plugin::PluginLoader;
use crate::registry::Registry;
use crate::runtime::Runtime;

use super::{PackageManager, Session};

impl<R: Runtime, L: PluginLoader> PackageManager<'_, R, L> {
    /// Tag the host's own environments, then register the environments of
    /// every package in the cache.
    ///
    /// Returns the number of user environments bound afterwards. Unreadable
    /// cache lines and packages that are no longer installed are skipped and
    /// the cache is rewritten without them.
    #[tracing::instrument(skip(self, session, registry))]
    pub fn load_user_envs<G: Registry>(
        &self,
        session: &mut Session,
        registry: &mut G,
    ) -> Result<usize> {
        let installed = self.pip.list_packages()?;

        let core_source = format!("{} core package", self.host_package);
        let core_package = match installed.get(&self.host_package) {
            Some(version) => format!("{} ({})", self.host_package, version),
            None => self.host_package.clone(),
        };
        for id in registry.list() {
            if let Some(spec) = registry.spec_mut(&id)
                && spec.source.is_none()
            {
                spec.source = Some(core_source.clone());
                spec.package = Some(core_package.clone());
            }
        }

        for line in self.cache.load()? {
            match line {
                CacheLine::Record(record) => {
                    let registered = self.load_package(session, registry, &record, &installed)?;
                    debug!(
                        "Installed {} user environments from package \"{}\"",
                        registered.len(),
                        record.name
                    );
                }
                CacheLine::Corrupt { line, reason } => {
                    session.mark_cache_dirty();
                    warn!(
                        "Skipping unreadable line in {:?} ({}): {}",
                        self.cache.path(),
                        reason,
                        line
                    );
                }
            }
        }

        if session.is_cache_dirty() {
            self.persist(session)?;
        }

        let count = session.bindings.len();
        if count > 0 {
            info!("Found and registered {} user environments.", count);
        }
        Ok(count)
    }
}
