//! GitHub content access.
//!
//! The `ContentStore` trait is the seam between the domain logic and
//! the GitHub contents API; tests substitute an in-memory fake.

mod client;

pub use client::{GitHubClient, RetryConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// A file fetched from the repository, content already decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
    /// Blob SHA used for conditional updates.
    pub sha: String,
}

/// Kind of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry from a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Read/write access to files in the project repository.
///
/// Writes are conditional: an update must present the current blob SHA
/// and fails with [`ProxyError::Conflict`] when it no longer matches.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch a file's decoded content and SHA.
    async fn get_file(&self, path: &str) -> Result<RepoFile, ProxyError>;

    /// Create (`sha: None`) or update (`sha: Some`) a file.
    /// Returns the new blob SHA.
    async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<String, ProxyError>;

    /// List the immediate entries of a directory.
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, ProxyError>;
}
