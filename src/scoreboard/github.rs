use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode, header::ACCEPT};

use crate::config::GitHubSettings;

use super::{CONFIG_FILE, HostingApi, HostingError, UserEnvConfig};

const SHA_MEDIA_TYPE: &str = "application/vnd.github.v3.sha";

pub struct GitHubHosting {
    client: Client,
    api_base: String,
    raw_base: String,
}

impl GitHubHosting {
    #[tracing::instrument(skip(client, settings))]
    pub fn new(client: Client, settings: &GitHubSettings) -> Self {
        Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            raw_base: settings.raw_base.trim_end_matches('/').to_string(),
        }
    }
}

/// Form-encode one path segment (spaces become `+`).
fn segment(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[async_trait]
impl HostingApi for GitHubHosting {
    #[tracing::instrument(skip(self))]
    async fn commit_hash(&self, owner: &str, repo: &str, reference: &str) -> Result<Option<String>> {
        let path = format!(
            "/repos/{}/{}/commits/{}",
            segment(owner),
            segment(repo),
            segment(reference)
        );
        let url = format!("{}{}", self.api_base, path);
        debug!("Resolving commit hash from {}...", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, SHA_MEDIA_TYPE)
            .send()
            .await
            .context("Failed to send request to GitHub API")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response from GitHub API")?;

        match status {
            StatusCode::OK => Ok(Some(body.trim().to_string())),
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::FORBIDDEN => Err(HostingError::Forbidden { body, path }.into()),
            status => Err(HostingError::Unexpected {
                status: status.as_u16(),
                body,
                path,
            }
            .into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn user_env_config(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<UserEnvConfig> {
        let path = format!(
            "/{}/{}/{}/{}",
            segment(owner),
            segment(repo),
            segment(reference),
            segment(CONFIG_FILE)
        );
        let url = format!("{}{}", self.raw_base, path);
        debug!("Fetching user environment config from {}...", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request for the user environment config")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read the user environment config")?;
        if !status.is_success() {
            return Err(HostingError::Unexpected {
                status: status.as_u16(),
                body,
                path,
            }
            .into());
        }

        let values = match serde_yaml::from_str::<serde_yaml::Value>(&body)
            .with_context(|| format!("Invalid YAML in {} of {}/{}", CONFIG_FILE, owner, repo))?
        {
            serde_yaml::Value::Mapping(values) => values,
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            _ => bail!("{} of {}/{} is not a mapping", CONFIG_FILE, owner, repo),
        };

        Ok(UserEnvConfig {
            id: format!("{}/{}", owner, repo),
            commit: reference.to_string(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn hosting(url: &str) -> GitHubHosting {
        let settings = GitHubSettings {
            api_base: url.to_string(),
            raw_base: format!("{}/raw/", url),
            api_key: None,
        };
        GitHubHosting::new(Client::new(), &settings)
    }

    #[tokio::test]
    async fn test_commit_hash() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/alice/envpack/commits/dev")
            .match_header("accept", SHA_MEDIA_TYPE)
            .with_status(200)
            .with_body("6dcb09b5b57875f334f61aebed695e2e4193db5e\n")
            .create_async()
            .await;

        let hash = hosting(&server.url())
            .commit_hash("alice", "envpack", "dev")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(hash.as_deref(), Some("6dcb09b5b57875f334f61aebed695e2e4193db5e"));
    }

    #[tokio::test]
    async fn test_commit_hash_unknown_reference() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/alice/envpack/commits/nope")
            .with_status(404)
            .create_async()
            .await;

        let hash = hosting(&server.url())
            .commit_hash("alice", "envpack", "nope")
            .await
            .unwrap();
        assert_eq!(hash, None);
    }

    #[tokio::test]
    async fn test_commit_hash_rate_limited() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/alice/envpack/commits/master")
            .with_status(403)
            .with_body("API rate limit exceeded")
            .create_async()
            .await;

        let err = hosting(&server.url())
            .commit_hash("alice", "envpack", "master")
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<HostingError>(),
            Some(HostingError::Forbidden { .. })
        ));
        assert!(err.to_string().contains("GITHUB_API_KEY"));
    }

    #[tokio::test]
    async fn test_commit_hash_server_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/alice/envpack/commits/master")
            .with_status(500)
            .create_async()
            .await;

        let err = hosting(&server.url())
            .commit_hash("alice", "envpack", "master")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostingError>(),
            Some(HostingError::Unexpected { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_user_env_config() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/raw/alice/envpack/0123abcd/.openai.yml")
            .with_status(200)
            .with_body("environments:\n  - EnvA\nmaintainer: alice\n")
            .create_async()
            .await;

        let config = hosting(&server.url())
            .user_env_config("alice", "envpack", "0123abcd")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(config.id, "alice/envpack");
        assert_eq!(config.commit, "0123abcd");
        assert_eq!(
            config.get("maintainer"),
            Some(&serde_yaml::Value::String("alice".into()))
        );
    }

    #[tokio::test]
    async fn test_user_env_config_encodes_segments() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/raw/alice/env+pack/dev/.openai.yml")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let config = hosting(&server.url())
            .user_env_config("alice", "env pack", "dev")
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(config.values.is_empty());
    }

    #[tokio::test]
    async fn test_user_env_config_missing_file() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/raw/alice/envpack/master/.openai.yml")
            .with_status(404)
            .with_body("404: Not Found")
            .create_async()
            .await;

        let result = hosting(&server.url())
            .user_env_config("alice", "envpack", "master")
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_segment() {
        assert_eq!(segment("owner"), "owner");
        assert_eq!(segment("a b"), "a+b");
        assert_eq!(segment(".openai.yml"), ".openai.yml");
    }
}
