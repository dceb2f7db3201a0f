use anyhow::{Context, Result};
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use std::path::PathBuf;

use crate::runtime::Runtime;

pub const CACHE_FILE_NAME: &str = ".envs.json";
pub const DEFAULT_PIP: &str = "pip3";
pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_HOST_PACKAGE: &str = "gym";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Where and how to reach the hosting service.
#[derive(Debug, Clone, PartialEq)]
pub struct GitHubSettings {
    pub api_base: String,
    pub raw_base: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub cache_path: PathBuf,
    pub pip: String,
    pub python: String,
    /// Package name of the host registry, used to tag its own environments.
    pub host_package: String,
    pub github: GitHubSettings,
}

impl Config {
    /// Resolve the configuration. Explicit values win; the hosting settings
    /// come from `GITHUB_API_KEY`, `OPENAI_GITHUB_API_BASE` and
    /// `OPENAI_GITHUB_RAW_BASE`.
    pub fn new<R: Runtime>(
        runtime: &R,
        cache_path: Option<PathBuf>,
        pip: Option<String>,
        python: Option<String>,
        host_package: Option<String>,
    ) -> Result<Self> {
        let cache_path = match cache_path {
            Some(path) => path,
            None => default_cache_path(runtime)?,
        };
        debug!("Using package cache {:?}", cache_path);

        let github = GitHubSettings {
            api_base: runtime
                .env_var("OPENAI_GITHUB_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            raw_base: runtime
                .env_var("OPENAI_GITHUB_RAW_BASE")
                .unwrap_or_else(|_| DEFAULT_RAW_BASE.to_string()),
            api_key: runtime
                .env_var("GITHUB_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
        };

        Ok(Self {
            cache_path,
            pip: pip.unwrap_or_else(|| DEFAULT_PIP.to_string()),
            python: python.unwrap_or_else(|| DEFAULT_PYTHON.to_string()),
            host_package: host_package.unwrap_or_else(|| DEFAULT_HOST_PACKAGE.to_string()),
            github,
        })
    }

    /// HTTP client for the hosting service, authenticated when a key is set.
    pub fn http_client(&self) -> Result<Client> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.github.api_key {
            let mut auth_value = HeaderValue::from_str(&format!("token {}", key))
                .context("GITHUB_API_KEY contains invalid characters")?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
            debug!("Using GITHUB_API_KEY for authentication");
        }

        let client = Client::builder()
            .user_agent(concat!("envpull/", env!("ENVPULL_VERSION")))
            .default_headers(headers)
            .build()?;
        Ok(client)
    }
}

fn default_cache_path<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if let Some(data) = runtime.data_dir() {
        return Ok(data.join("envpull").join(CACHE_FILE_NAME));
    }
    let home = runtime
        .home_dir()
        .context("Could not determine a data or home directory for the package cache")?;
    Ok(home.join(".envpull").join(CACHE_FILE_NAME))
}
