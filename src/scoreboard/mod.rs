//! Glue towards the hosting service and the scoreboard.
//!
//! Resolves commit references, fetches the per-repository `.openai.yml`
//! configuration and guards uploads of pulled environments.

mod github;

use anyhow::{Result, bail};
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use std::fmt;

use crate::package::PullSource;
use crate::registry::EnvSpec;

pub use github::GitHubHosting;

/// Configuration file read from the top-level folder of a repository.
pub const CONFIG_FILE: &str = ".openai.yml";

/// Reference used when a source names no branch.
pub const DEFAULT_BRANCH: &str = "master";

/// Classified failures of the hosting service.
#[derive(Debug, Clone, PartialEq)]
pub enum HostingError {
    /// HTTP 403, usually the anonymous rate limit.
    Forbidden { body: String, path: String },
    /// Any other status the caller cannot act on.
    Unexpected { status: u16, body: String, path: String },
}

impl fmt::Display for HostingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostingError::Forbidden { body, path } => write!(
                f,
                "Unable to retrieve full commit hash. GitHub returned a 403/Forbidden error. Try setting the \
                 environment variable GITHUB_API_KEY with your GitHub OAuth2.0 key. \
                 GitHub returned \"403 -- {}\". Tried \"GET {}\".",
                body, path
            ),
            HostingError::Unexpected { status, body, path } => write!(
                f,
                "Unable to retrieve data from GitHub. GitHub returned \"{} -- {}\". Tried \"GET {}\".",
                status, body, path
            ),
        }
    }
}

impl std::error::Error for HostingError {}

/// Parsed `.openai.yml` of a repository at one commit.
#[derive(Debug, Clone, PartialEq)]
pub struct UserEnvConfig {
    /// `owner/repo`
    pub id: String,
    pub commit: String,
    pub values: serde_yaml::Mapping,
}

impl UserEnvConfig {
    pub fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.values.get(key)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Full commit hash for `reference`, or `None` if the repository has no such reference.
    async fn commit_hash(&self, owner: &str, repo: &str, reference: &str) -> Result<Option<String>>;

    /// The repository's `.openai.yml` at `reference`.
    async fn user_env_config(&self, owner: &str, repo: &str, reference: &str)
    -> Result<UserEnvConfig>;
}

/// Fetch a source's configuration pinned to the commit its branch points at.
#[tracing::instrument(skip(api))]
pub async fn pinned_env_config<H: HostingApi + ?Sized>(
    api: &H,
    source: &PullSource,
) -> Result<UserEnvConfig> {
    let reference = source.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
    let Some(commit) = api.commit_hash(&source.owner, &source.repo, reference).await? else {
        bail!("Could not find the reference '{}' in {}", reference, source);
    };
    debug!("Resolved {}@{} to {}", source, reference, commit);
    api.user_env_config(&source.owner, &source.repo, &commit).await
}

/// Refuse to upload results of a pulled environment to the scoreboard.
pub fn ensure_uploadable(env_id: &str) -> Result<()> {
    if env_id.contains('/') {
        bail!(
            "Custom user environments pulled with envpull can not be uploaded to the scoreboard ({}).",
            env_id
        );
    }
    Ok(())
}

/// Environment properties recorded alongside training results.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EnvInfo {
    pub env_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl From<&EnvSpec> for EnvInfo {
    fn from(spec: &EnvSpec) -> Self {
        Self {
            env_id: spec.id.clone(),
            entry_point: spec.entry_point.clone(),
            package: spec.package.clone(),
            source: spec.source.clone(),
        }
    }
}
