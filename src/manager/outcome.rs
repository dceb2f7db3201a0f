use std::fmt;

/// What a pull ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    /// The source string was malformed; nothing was touched.
    InvalidSource(String),
    /// The installer exited with a non-zero code; nothing was touched.
    InstallFailed(i32),
    /// The package was already provided by another source. Both sources
    /// were removed.
    Conflict {
        package: String,
        source: String,
        previous_source: String,
    },
    /// No package changed version.
    UpToDate { source: String },
    /// A package registered an environment outside the owner's namespace.
    /// The pull was rolled back and the modified packages uninstalled.
    ConventionViolation {
        expected_prefix: String,
        env_id: String,
        uninstalled: Vec<String>,
    },
    /// Newly registered environments, sorted case-insensitively.
    Registered(Vec<String>),
    /// Packages changed but none provided an environment.
    NoEnvironments(Vec<String>),
}

impl PullOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PullOutcome::Registered(_) | PullOutcome::NoEnvironments(_) | PullOutcome::UpToDate { .. }
        )
    }
}

impl fmt::Display for PullOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullOutcome::InvalidSource(reason) => write!(f, "{}", reason),
            PullOutcome::InstallFailed(code) => {
                write!(f, "The installer failed with exit code {}.", code)
            }
            PullOutcome::Conflict {
                package,
                source,
                previous_source,
            } => write!(
                f,
                "Package conflict - The package \"{}\" from \"{}\" was already installed from \"{}\". \
                 Both were uninstalled. Please reinstall the one you want.",
                package, source, previous_source
            ),
            PullOutcome::UpToDate { source } => write!(
                f,
                "The user environments for \"{}\" are already up-to-date (no new version detected).",
                source
            ),
            PullOutcome::ConventionViolation {
                expected_prefix,
                env_id,
                uninstalled,
            } => write!(
                f,
                "Expected user environment to start with \"{}\", but got \"{}\" instead. \
                 Uninstalled: {}",
                expected_prefix,
                env_id,
                uninstalled.join(", ")
            ),
            PullOutcome::Registered(envs) => {
                for (i, env) in envs.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "Successfully registered the environment: \"{}\"", env)?;
                }
                Ok(())
            }
            PullOutcome::NoEnvironments(packages) => write!(
                f,
                "No environments have been registered. The following packages were modified: {}",
                packages.join(",")
            ),
        }
    }
}
