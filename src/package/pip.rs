//! Installer command plumbing.

use anyhow::{Context, Result, bail};
use log::{debug, info};

use crate::runtime::Runtime;

use super::Inventory;

#[cfg(windows)]
const NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
const NULL_DEVICE: &str = "/dev/null";

const LISTING_FILE: &str = "pip_list.txt";

/// Runs the package installer through the runtime.
pub struct Pip<'a, R: Runtime> {
    runtime: &'a R,
    exec: String,
}

impl<'a, R: Runtime> Pip<'a, R> {
    pub fn new(runtime: &'a R, exec: impl Into<String>) -> Self {
        Self {
            runtime,
            exec: exec.into(),
        }
    }

    /// Install or upgrade from a git URL. Returns the installer's exit code;
    /// the installer prints its own diagnostics.
    #[tracing::instrument(skip(self))]
    pub fn install(&self, git_url: &str) -> Result<i32> {
        info!("Installing pip package from \"{}\"", git_url);
        self.runtime
            .run(&format!("{} install --upgrade git+{}", self.exec, git_url))
    }

    #[tracing::instrument(skip(self))]
    pub fn uninstall(&self, name: &str) -> Result<i32> {
        info!("Uninstalling package \"{}\"", name);
        self.runtime
            .run(&format!("{} uninstall -y {}", self.exec, name))
    }

    /// Snapshot the installed packages.
    ///
    /// The listing is written to a log file inside a private temporary
    /// directory, which is removed when this function returns.
    #[tracing::instrument(skip(self))]
    pub fn list_packages(&self) -> Result<Inventory> {
        let dir = tempfile::Builder::new()
            .prefix("envpull-")
            .tempdir()
            .context("Failed to create temporary directory for package listing")?;
        let log_path = dir.path().join(LISTING_FILE);

        let command = format!(
            "{} list --format=legacy --log \"{}\" > {}",
            self.exec,
            log_path.display(),
            NULL_DEVICE
        );
        let code = self.runtime.run(&command)?;
        if code != 0 {
            bail!("Listing installed packages failed with exit code {}", code);
        }

        let listing = self
            .runtime
            .read_to_string(&log_path)
            .with_context(|| format!("Failed to read package listing {:?}", log_path))?;
        let inventory = Inventory::parse(&listing);
        debug!("Found {} installed package(s)", inventory.len());
        Ok(inventory)
    }
}
