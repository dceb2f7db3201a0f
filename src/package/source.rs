//! Pull source parsing.

use anyhow::{Result, anyhow, bail};
use std::fmt;
use std::str::FromStr;

/// The only host packages can be pulled from.
pub const SUPPORTED_HOST: &str = "github.com";

pub const USAGE: &str = "Syntax: envpull pull github.com/username/repository[@branch]\n\n\
where username is a GitHub username, repository is the name of a GitHub repository \
and branch optionally selects a branch, tag or commit.";

/// A repository locator that packages can be pulled from.
/// Format: "github.com/owner/repo" or "github.com/owner/repo@branch"
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PullSource {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
}

impl PullSource {
    /// URL handed to the installer, e.g. `https://github.com/owner/repo.git@dev`.
    pub fn git_url(&self) -> String {
        let base = format!("https://{}/{}/{}.git", self.host, self.owner, self.repo);
        match &self.branch {
            Some(branch) => format!("{}@{}", base, branch),
            None => base,
        }
    }

    /// Prefix every environment provided from this source must start with.
    pub fn env_prefix(&self) -> String {
        format!("{}/", self.owner)
    }

    /// Whether `env_id` respects the `<owner>/` naming convention (case-insensitive).
    pub fn owns_env(&self, env_id: &str) -> bool {
        env_id
            .to_lowercase()
            .starts_with(&self.env_prefix().to_lowercase())
    }
}

/// Canonical source string recorded for bindings and cache entries.
/// The branch only affects what gets installed, not who owns the package.
impl fmt::Display for PullSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.repo)
    }
}

impl FromStr for PullSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (locator, branch) = match s.split_once('@') {
            Some((locator, branch)) => {
                if branch.is_empty() || branch.contains('@') {
                    return Err(anyhow!(
                        "Invalid source '{}': expected a single non-empty branch after '@'.",
                        s
                    ));
                }
                (locator, Some(branch.to_string()))
            }
            None => (s, None),
        };

        let parts: Vec<&str> = locator.split('/').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            bail!(
                "Invalid source '{}': expected the format 'github.com/username/repository[@branch]'.",
                s
            );
        }
        if !parts[0].eq_ignore_ascii_case(SUPPORTED_HOST) {
            bail!(
                "Invalid source '{}': only repositories hosted on {} are supported.",
                s,
                SUPPORTED_HOST
            );
        }

        Ok(PullSource {
            host: SUPPORTED_HOST.to_string(),
            owner: parts[1].to_string(),
            repo: parts[2].to_string(),
            branch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_without_branch() {
        let source = PullSource::from_str("github.com/alice/envpack").unwrap();
        assert_eq!(source.host, "github.com");
        assert_eq!(source.owner, "alice");
        assert_eq!(source.repo, "envpack");
        assert_eq!(source.branch, None);
        assert_eq!(source.git_url(), "https://github.com/alice/envpack.git");
    }

    #[test]
    fn test_parse_with_branch() {
        let source = PullSource::from_str("github.com/alice/envpack@dev").unwrap();
        assert_eq!(source.branch, Some("dev".to_string()));
        assert!(source.git_url().ends_with("@dev"));
        // branch is not part of the canonical source
        assert_eq!(source.to_string(), "github.com/alice/envpack");
    }

    #[test]
    fn test_host_is_case_insensitive() {
        let source = PullSource::from_str("GitHub.com/alice/envpack").unwrap();
        assert_eq!(source.to_string(), "github.com/alice/envpack");
    }

    #[test]
    fn test_reject_other_host() {
        let result = PullSource::from_str("gitlab.com/alice/envpack");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("github.com"));
    }

    #[test]
    fn test_reject_wrong_segment_count() {
        assert!(PullSource::from_str("alice/envpack").is_err());
        assert!(PullSource::from_str("github.com/alice").is_err());
        assert!(PullSource::from_str("github.com/alice/envpack/extra").is_err());
        assert!(PullSource::from_str("github.com//envpack").is_err());
        assert!(PullSource::from_str("").is_err());
    }

    #[test]
    fn test_reject_bad_branch() {
        assert!(PullSource::from_str("github.com/alice/envpack@").is_err());
        assert!(PullSource::from_str("github.com/alice/envpack@a@b").is_err());
    }

    #[test]
    fn test_owns_env_is_case_insensitive() {
        let source = PullSource::from_str("github.com/Alice/envpack").unwrap();
        assert_eq!(source.env_prefix(), "Alice/");
        assert!(source.owns_env("alice/EnvA-v0"));
        assert!(source.owns_env("ALICE/EnvA-v0"));
        assert!(!source.owns_env("bob/EnvX-v0"));
        assert!(!source.owns_env("alicex/EnvA-v0"));
        assert!(!source.owns_env("EnvA-v0"));
    }
}
