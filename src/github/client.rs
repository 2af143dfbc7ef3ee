//! GitHub contents API client with bounded retry for transient errors.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{ContentStore, DirEntry, EntryKind, RepoFile};
use crate::config::Config;
use crate::error::ProxyError;

const GITHUB_API: &str = "https://api.github.com";

/// Retry policy for transient GitHub failures (network errors, 5xx,
/// rate limiting). Conflicts and 4xx are never retried here; SHA
/// conflicts are handled one level up with a fresh read.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2,
        }
    }
}

/// Client for the GitHub contents API, scoped to one repository and
/// branch.
pub struct GitHubClient {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    branch: String,
    retry: RetryConfig,
}

impl GitHubClient {
    pub fn new(config: &Config) -> Self {
        Self::with_retry_config(config, RetryConfig::default())
    }

    pub fn with_retry_config(config: &Config, retry: RetryConfig) -> Self {
        Self {
            client: Client::new(),
            token: config.github_token.clone(),
            owner: config.github_owner.clone(),
            repo: config.github_repo.clone(),
            branch: config.github_branch.clone(),
            retry,
        }
    }

    fn contents_url(&self, path: &str) -> String {
        // Encode each segment; slashes must survive.
        let encoded: Vec<String> = path
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect();
        format!(
            "{}/repos/{}/{}/contents/{}",
            GITHUB_API,
            self.owner,
            self.repo,
            encoded.join("/")
        )
    }

    fn auth_request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "delivery-proxy")
    }

    /// Run `op` with bounded exponential backoff on retryable errors.
    async fn with_retries<T, F, Fut>(&self, mut op: F) -> Result<T, ProxyError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProxyError>>,
    {
        let mut attempt = 0;
        let mut delay = self.retry.initial_delay;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    attempt += 1;
                    let transient = matches!(e, ProxyError::Upstream(_));
                    if !transient || attempt >= self.retry.max_attempts {
                        if transient {
                            tracing::error!(
                                "GitHub call failed after {} attempts: {}",
                                attempt,
                                e
                            );
                        }
                        return Err(e);
                    }
                    tracing::warn!(
                        "Retrying GitHub call ({}/{}) due to: {}",
                        attempt,
                        self.retry.max_attempts,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= self.retry.backoff_factor;
                }
            }
        }
    }

    async fn get_file_once(&self, path: &str) -> Result<RepoFile, ProxyError> {
        let url = format!("{}?ref={}", self.contents_url(path), self.branch);
        let resp = self
            .auth_request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(format!("GitHub request failed: {}", e)))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(ProxyError::NotFound(format!("File {} not found", path)));
        }
        if !status.is_success() {
            return Err(classify_failure(status, path, &body));
        }

        let file: ContentsResponse = serde_json::from_str(&body)
            .map_err(|e| ProxyError::Upstream(format!("Bad contents payload: {}", e)))?;
        // Content arrives base64 with embedded newlines.
        let raw: String = file.content.unwrap_or_default();
        let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = BASE64
            .decode(cleaned.as_bytes())
            .map_err(|e| ProxyError::Upstream(format!("Bad base64 for {}: {}", path, e)))?;
        let content = String::from_utf8(decoded)
            .map_err(|e| ProxyError::Upstream(format!("Non-UTF8 content in {}: {}", path, e)))?;

        Ok(RepoFile {
            path: file.path,
            content,
            sha: file.sha,
        })
    }

    async fn put_file_once(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<String, ProxyError> {
        let mut body = serde_json::json!({
            "message": message,
            "content": BASE64.encode(content.as_bytes()),
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }

        let resp = self
            .auth_request(self.client.put(self.contents_url(path)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(format!("GitHub request failed: {}", e)))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if is_sha_conflict(status, &text) {
            return Err(ProxyError::Conflict(format!(
                "SHA mismatch writing {}: {}",
                path, text
            )));
        }
        if !status.is_success() {
            return Err(classify_failure(status, path, &text));
        }

        let committed: PutResponse = serde_json::from_str(&text)
            .map_err(|e| ProxyError::Upstream(format!("Bad commit payload: {}", e)))?;
        Ok(committed.content.sha)
    }

    async fn list_dir_once(&self, path: &str) -> Result<Vec<DirEntry>, ProxyError> {
        let url = format!("{}?ref={}", self.contents_url(path), self.branch);
        let resp = self
            .auth_request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(format!("GitHub request failed: {}", e)))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(ProxyError::NotFound(format!("Path {} not found", path)));
        }
        if !status.is_success() {
            return Err(classify_failure(status, path, &body));
        }

        // A file path returns a single object instead of an array.
        let entries: Vec<ListingEntry> = match serde_json::from_str::<Vec<ListingEntry>>(&body) {
            Ok(list) => list,
            Err(_) => serde_json::from_str::<ListingEntry>(&body)
                .map(|e| vec![e])
                .map_err(|e| ProxyError::Upstream(format!("Bad listing payload: {}", e)))?,
        };

        Ok(entries
            .into_iter()
            .map(|e| DirEntry {
                path: e.path,
                name: e.name,
                kind: if e.entry_type == "dir" {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                },
            })
            .collect())
    }
}

#[async_trait]
impl ContentStore for GitHubClient {
    async fn get_file(&self, path: &str) -> Result<RepoFile, ProxyError> {
        self.with_retries(|| self.get_file_once(path)).await
    }

    async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<String, ProxyError> {
        self.with_retries(|| self.put_file_once(path, content, message, sha))
            .await
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, ProxyError> {
        self.with_retries(|| self.list_dir_once(path)).await
    }
}

fn classify_failure(status: StatusCode, path: &str, body: &str) -> ProxyError {
    ProxyError::Upstream(format!("GitHub {} for {}: {}", status.as_u16(), path, body))
}

/// GitHub reports SHA races as 409, or as 422 with a message naming the
/// sha ("does not match", "wasn't supplied"). Other 422s are plain
/// validation failures (bad branch, oversized content) and must not be
/// treated as retryable conflicts.
fn is_sha_conflict(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && body.to_lowercase().contains("sha"))
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    path: String,
    sha: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    path: String,
    name: String,
    #[serde(rename = "type")]
    entry_type: String,
}
