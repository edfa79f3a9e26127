//! GitHub-backed remote store
//!
//! Implements [`RemoteStore`] on top of the GitHub contents API. Each
//! document is a file in a data repository and the blob SHA serves as the
//! version token: a `PUT` carrying a stale SHA is rejected by GitHub, which
//! is exactly the conditional-write primitive the engine needs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::{Document, RemoteStore, VersionToken};

/// Configuration for the GitHub-backed store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base API URL (e.g. "https://api.github.com")
    pub api_url: String,
    /// Personal access token with contents read/write on both repos
    pub token: String,
    /// "owner/repo" holding live session state
    pub data_repo: String,
    /// "owner/repo" receiving finalized attendance CSVs
    pub archive_repo: String,
}

impl StoreConfig {
    /// Create a new StoreConfig from environment variables
    ///
    /// # Environment Variables
    /// - `ULAS_GITHUB_API_URL`: API base URL (default: "https://api.github.com")
    /// - `ULAS_GITHUB_TOKEN`: personal access token (required)
    /// - `ULAS_DATA_REPO`: "owner/repo" for session state (required)
    /// - `ULAS_ARCHIVE_REPO`: "owner/repo" for attendance archives (required)
    pub fn from_env() -> StoreResult<Self> {
        let api_url = std::env::var("ULAS_GITHUB_API_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_string());
        let token = std::env::var("ULAS_GITHUB_TOKEN")
            .map_err(|_| StoreError::Configuration("ULAS_GITHUB_TOKEN not set".to_string()))?;
        let data_repo = std::env::var("ULAS_DATA_REPO")
            .map_err(|_| StoreError::Configuration("ULAS_DATA_REPO not set".to_string()))?;
        let archive_repo = std::env::var("ULAS_ARCHIVE_REPO")
            .map_err(|_| StoreError::Configuration("ULAS_ARCHIVE_REPO not set".to_string()))?;

        Ok(StoreConfig {
            api_url,
            token,
            data_repo,
            archive_repo,
        })
    }
}

/// File payload returned by the contents API
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: Option<String>,
    sha: String,
}

/// Write payload returned by the contents API
#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    sha: String,
}

/// GitHub contents API client scoped to one repository
#[derive(Clone)]
pub struct GithubStore {
    http: reqwest::Client,
    api_url: String,
    token: String,
    repo: String,
}

impl GithubStore {
    /// Store handle for the live data repository
    pub fn data(config: &StoreConfig) -> StoreResult<Self> {
        Self::new(config, config.data_repo.clone())
    }

    /// Store handle for the archive repository
    pub fn archive(config: &StoreConfig) -> StoreResult<Self> {
        Self::new(config, config.archive_repo.clone())
    }

    fn new(config: &StoreConfig, repo: String) -> StoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        info!("GitHub store initialized for repo: {}", repo);
        Ok(GithubStore {
            http,
            api_url: config.api_url.clone(),
            token: config.token.clone(),
            repo,
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.api_url, self.repo, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.contents_url(path))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "ulas-attendance")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn api_error(path: &str, response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StoreError::Api {
            status,
            path: path.to_string(),
            message: message.chars().take(300).collect(),
        }
    }

    /// Perform a write through the contents API
    ///
    /// `sha = None` is a create: GitHub answers 422 if the file already
    /// exists. `sha = Some(..)` is a conditional update: GitHub answers 409
    /// when the SHA is stale.
    async fn put(
        &self,
        path: &str,
        content: &str,
        sha: Option<&str>,
        message: &str,
    ) -> StoreResult<VersionToken> {
        let mut payload = json!({
            "message": message,
            "content": BASE64.encode(content.as_bytes()),
        });
        if let Some(sha) = sha {
            payload["sha"] = json!(sha);
        }

        let response = self
            .request(reqwest::Method::PUT, path)
            .json(&payload)
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 201 => {
                let body: WriteResponse =
                    response.json().await.map_err(|e| StoreError::Decode {
                        path: path.to_string(),
                        message: e.to_string(),
                    })?;
                Ok(VersionToken(body.content.sha))
            }
            409 => {
                warn!("Conditional write rejected for {}: stale version", path);
                Err(StoreError::VersionMismatch(path.to_string()))
            }
            422 if sha.is_none() => Err(StoreError::AlreadyExists(path.to_string())),
            _ => Err(Self::api_error(path, response).await),
        }
    }
}

impl RemoteStore for GithubStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Document>> {
        let response = self.request(reqwest::Method::GET, path).send().await?;

        match response.status().as_u16() {
            200 => {
                let body: ContentsResponse =
                    response.json().await.map_err(|e| StoreError::Decode {
                        path: path.to_string(),
                        message: e.to_string(),
                    })?;
                // GitHub wraps the base64 payload across lines
                let encoded: String = body
                    .content
                    .unwrap_or_default()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                let bytes = BASE64.decode(encoded).map_err(|e| StoreError::Decode {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;
                let content = String::from_utf8(bytes).map_err(|e| StoreError::Decode {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Some(Document {
                    content,
                    version: VersionToken(body.sha),
                }))
            }
            404 => Ok(None),
            _ => Err(Self::api_error(path, response).await),
        }
    }

    async fn put_if_match(
        &self,
        path: &str,
        content: &str,
        expected: &VersionToken,
        message: &str,
    ) -> StoreResult<VersionToken> {
        self.put(path, content, Some(expected.as_str()), message)
            .await
    }

    async fn create_if_absent(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> StoreResult<VersionToken> {
        self.put(path, content, None, message).await
    }

    async fn delete(
        &self,
        path: &str,
        expected: &VersionToken,
        message: &str,
    ) -> StoreResult<()> {
        let payload = json!({
            "message": message,
            "sha": expected.as_str(),
        });

        let response = self
            .request(reqwest::Method::DELETE, path)
            .json(&payload)
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 204 => Ok(()),
            404 => Err(StoreError::NotFound(path.to_string())),
            409 => Err(StoreError::VersionMismatch(path.to_string())),
            _ => Err(Self::api_error(path, response).await),
        }
    }

    async fn health_check(&self) -> StoreResult<bool> {
        let url = format!("{}/repos/{}", self.api_url, self.repo);
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "ulas-attendance")
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_store_config_from_env() {
        unsafe {
            std::env::set_var("ULAS_GITHUB_TOKEN", "ghp_test");
            std::env::set_var("ULAS_DATA_REPO", "futo-ict/ulas-data");
            std::env::set_var("ULAS_ARCHIVE_REPO", "futo-ict/ulas-archive");
        }

        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.token, "ghp_test");
        assert_eq!(config.data_repo, "futo-ict/ulas-data");
        assert_eq!(config.archive_repo, "futo-ict/ulas-archive");

        unsafe {
            std::env::remove_var("ULAS_GITHUB_TOKEN");
            std::env::remove_var("ULAS_DATA_REPO");
            std::env::remove_var("ULAS_ARCHIVE_REPO");
        }
    }

    #[test]
    #[serial]
    fn test_store_config_requires_token() {
        unsafe {
            std::env::remove_var("ULAS_GITHUB_TOKEN");
            std::env::set_var("ULAS_DATA_REPO", "futo-ict/ulas-data");
            std::env::set_var("ULAS_ARCHIVE_REPO", "futo-ict/ulas-archive");
        }

        assert!(StoreConfig::from_env().is_err());

        unsafe {
            std::env::remove_var("ULAS_DATA_REPO");
            std::env::remove_var("ULAS_ARCHIVE_REPO");
        }
    }
}
