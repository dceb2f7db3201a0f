//! Pulling packages from a source.

use anyhow::Result;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::package::{PackageRecord, PullSource, USAGE};
use crate::plugin::PluginLoader;
use crate::registry::{EnvSpec, Registry};
use crate::runtime::Runtime;

use super::{PackageManager, PullOutcome, Session};

impl<R: Runtime, L: PluginLoader> PackageManager<'_, R, L> {
    /// Install a package from `source` and register the environments it provides.
    ///
    /// Domain failures (bad source, installer error, conflicts, naming
    /// violations) are reported through [`PullOutcome`]. `Err` means the
    /// environment itself failed (installer could not be spawned, cache
    /// could not be written).
    #[tracing::instrument(skip(self, session, registry))]
    pub fn pull<G: Registry>(
        &self,
        session: &mut Session,
        registry: &mut G,
        source: &str,
    ) -> Result<PullOutcome> {
        let source = match source.parse::<PullSource>() {
            Ok(source) => source,
            Err(e) => {
                warn!("{}\n\n{}", e, USAGE);
                return Ok(PullOutcome::InvalidSource(e.to_string()));
            }
        };
        let key = source.to_string();

        let before = self.pip.list_packages()?;
        let code = self.pip.install(&source.git_url())?;
        if code != 0 {
            return Ok(PullOutcome::InstallFailed(code));
        }
        let after = self.pip.list_packages()?;
        let changes = after.changes_since(&before);

        let conflict = changes.iter().find_map(|change| {
            session
                .bindings
                .record(&change.name)
                .filter(|record| record.source != key)
                .map(|record| (change.name.clone(), record.source.clone()))
        });
        if let Some((package, previous_source)) = conflict {
            warn!(
                "Package conflict - The package \"{}\" from \"{}\" was already installed from \"{}\". \
                 Uninstalling both packages. Please reinstall the one you want.",
                package, key, previous_source
            );
            self.resolve_conflict(session, registry, &package, &key, &previous_source)?;
            return Ok(PullOutcome::Conflict {
                package,
                source: key,
                previous_source,
            });
        }

        if changes.is_empty() {
            warn!(
                "The user environments for \"{}\" are already up-to-date (no new version detected).",
                key
            );
            return Ok(PullOutcome::UpToDate { source: key });
        }

        let was_dirty = session.is_cache_dirty();
        let records_before: Vec<PackageRecord> = session.bindings.records().cloned().collect();
        let previous = session.bindings.records_for_source(&key);
        let previous_envs: Vec<(String, EnvSpec)> = session
            .bindings
            .bindings()
            .filter(|binding| binding.source == key)
            .filter_map(|binding| {
                registry
                    .spec(&binding.environment_id)
                    .map(|spec| (binding.package_name.clone(), spec.clone()))
            })
            .collect();

        // Packages previously pulled from this source lose their bindings
        // below, so they are loaded again along with the modified ones.
        let mut targets: BTreeMap<String, String> = changes
            .iter()
            .map(|change| (change.name.clone(), change.version.clone()))
            .collect();
        for record in &previous {
            if let Some(version) = after.get(&record.name) {
                targets
                    .entry(record.name.clone())
                    .or_insert_with(|| version.to_string());
            }
        }
        session.bindings.remove_bindings_for_source(registry, &key);

        let mut new_envs = Vec::new();
        let mut violation = None;
        for (name, version) in &targets {
            let record = PackageRecord::new(name, version, &key);
            for env_id in self.load_package(session, registry, &record, &after)? {
                if violation.is_none() && !source.owns_env(&env_id) {
                    violation = Some(env_id.clone());
                }
                new_envs.push(env_id);
            }
        }

        if let Some(env_id) = violation {
            warn!(
                "This package does not respect the naming convention and will be uninstalled to avoid \
                 conflicts. Expected user environment to start with \"{}\", but got \"{}\" instead.",
                source.env_prefix(),
                env_id
            );
            session.bindings.remove_bindings_for_source(registry, &key);
            let mut uninstalled = Vec::new();
            for change in &changes {
                session.bindings.forget_package(registry, &change.name);
                self.uninstall(&change.name)?;
                uninstalled.push(change.name.clone());
            }
            restore_unmodified(session, registry, previous, &previous_envs, &uninstalled);

            let records_after: Vec<PackageRecord> = session.bindings.records().cloned().collect();
            if was_dirty || records_after != records_before {
                self.persist(session)?;
            } else {
                session.cache_dirty = false;
            }
            return Ok(PullOutcome::ConventionViolation {
                expected_prefix: source.env_prefix(),
                env_id,
                uninstalled,
            });
        }

        self.persist(session)?;

        info!("--------------------------------------------------");
        if new_envs.is_empty() {
            let modified: Vec<String> = changes.into_iter().map(|change| change.name).collect();
            info!(
                "No environments have been registered. The following packages were modified: {}",
                modified.join(",")
            );
            return Ok(PullOutcome::NoEnvironments(modified));
        }

        new_envs.sort_by_key(|env| env.to_lowercase());
        for env in &new_envs {
            info!("Successfully registered the environment: \"{}\"", env);
        }
        Ok(PullOutcome::Registered(new_envs))
    }

    /// Remove both sides of a conflict: every environment of `source` and
    /// `previous_source`, and every package recorded for either, plus the
    /// contested package itself.
    fn resolve_conflict<G: Registry>(
        &self,
        session: &mut Session,
        registry: &mut G,
        package: &str,
        source: &str,
        previous_source: &str,
    ) -> Result<()> {
        let mut packages: BTreeSet<String> = session
            .bindings
            .records_for_source(source)
            .into_iter()
            .chain(session.bindings.records_for_source(previous_source))
            .map(|record| record.name)
            .collect();
        packages.insert(package.to_string());

        session.bindings.remove_bindings_for_source(registry, source);
        session.bindings.remove_bindings_for_source(registry, previous_source);
        for name in &packages {
            session.bindings.forget_package(registry, name);
            self.uninstall(name)?;
        }
        self.persist(session)
    }
}

/// Put back what a rejected pull took from packages it did not modify.
fn restore_unmodified<G: Registry>(
    session: &mut Session,
    registry: &mut G,
    previous: Vec<PackageRecord>,
    previous_envs: &[(String, EnvSpec)],
    modified: &[String],
) {
    for record in previous {
        if modified.contains(&record.name) {
            continue;
        }
        for (_, spec) in previous_envs.iter().filter(|(name, _)| *name == record.name) {
            if let Err(e) = registry.register(spec.clone()) {
                warn!("Package \"{}\": {}", record.name, e);
                continue;
            }
            session.bindings.add_binding(registry, &spec.id, &record);
        }
        if !session.bindings.bindings_for_package(&record.name).is_empty() {
            session.bindings.insert_record(record);
        }
    }
}
