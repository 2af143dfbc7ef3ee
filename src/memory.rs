//! Memory index operations.
//!
//! The memory index (`project/memory.yaml`) is a list of entries keyed
//! by repository path. Most entries are maintained as a side effect of
//! the commit-and-log routine; the operations here cover bulk
//! reindexing, drift detection, manual additions, search, and stats.

use std::collections::BTreeMap;

use async_recursion::async_recursion;
use serde::Serialize;

use crate::error::ProxyError;
use crate::github::EntryKind;
use crate::model::{MemoryEntry, MEMORY_FILE};
use crate::store::ProjectStore;

/// Directories scanned when no explicit base paths are given.
pub const DEFAULT_INDEX_ROOTS: &[&str] = &["prompts", "docs", "project/outputs"];

/// Result of a bulk reindex.
#[derive(Debug, Clone, Serialize)]
pub struct IndexOutcome {
    pub scanned: usize,
    pub added: usize,
    pub enriched: usize,
}

/// Drift between the memory index and the repository.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryDiff {
    /// Files present in the scanned directories but not in memory.
    pub untracked: Vec<String>,
    /// Memory entries whose file no longer exists.
    pub stale: Vec<String>,
}

/// Aggregate counts over the memory index.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total: usize,
    pub by_file_type: BTreeMap<String, usize>,
    pub by_tag: BTreeMap<String, usize>,
    pub by_pod_owner: BTreeMap<String, usize>,
    pub needing_enrichment: usize,
}

impl ProjectStore {
    /// Load the memory index (empty when the file doesn't exist yet).
    pub async fn load_memory(&self) -> Result<Vec<MemoryEntry>, ProxyError> {
        self.fetch_yaml_or_default(MEMORY_FILE).await
    }

    /// All file paths under `path`, recursively. A missing directory is
    /// treated as empty.
    #[async_recursion]
    pub async fn collect_files(&self, path: &str) -> Result<Vec<String>, ProxyError> {
        let entries = match self.github().list_dir(path).await {
            Ok(entries) => entries,
            Err(ProxyError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for entry in entries {
            match entry.kind {
                EntryKind::File => files.push(entry.path),
                EntryKind::Dir => files.extend(self.collect_files(&entry.path).await?),
            }
        }
        Ok(files)
    }

    /// Scan the given directories and index every file not yet in
    /// memory, enriching incomplete existing entries along the way.
    pub async fn index_memory(&self, base_paths: &[String]) -> Result<IndexOutcome, ProxyError> {
        let mut memory = self.load_memory().await?;
        let mut scanned = 0;
        let mut added = 0;
        let mut enriched = 0;

        for base in base_paths {
            for path in self.collect_files(base).await? {
                if path == MEMORY_FILE {
                    continue;
                }
                scanned += 1;
                let existed = memory.iter().any(|e| e.path == path);
                if existed && !memory.iter().any(|e| e.path == path && e.needs_enrichment()) {
                    continue;
                }
                let file = self.github().get_file(&path).await?;
                if self.upsert_memory_entry(&mut memory, &path, &file.content).await {
                    if existed {
                        enriched += 1;
                    } else {
                        added += 1;
                    }
                }
            }
        }

        if added > 0 || enriched > 0 {
            let content = serde_yaml::to_string(&memory)?;
            self.commit_and_log(
                MEMORY_FILE,
                &content,
                &format!("Reindex memory ({} added, {} enriched)", added, enriched),
                None,
                None,
            )
            .await?;
        }
        tracing::info!(
            "Memory reindex scanned {} files: {} added, {} enriched",
            scanned,
            added,
            enriched
        );

        Ok(IndexOutcome {
            scanned,
            added,
            enriched,
        })
    }

    /// Report drift without changing anything.
    pub async fn memory_diff(&self, base_paths: &[String]) -> Result<MemoryDiff, ProxyError> {
        let memory = self.load_memory().await?;

        let mut on_disk = Vec::new();
        for base in base_paths {
            on_disk.extend(self.collect_files(base).await?);
        }

        let untracked = on_disk
            .iter()
            .filter(|p| p.as_str() != MEMORY_FILE && !memory.iter().any(|e| &e.path == *p))
            .cloned()
            .collect();
        let mut stale = Vec::new();
        for entry in &memory {
            match self.github().get_file(&entry.path).await {
                Ok(_) => {}
                Err(ProxyError::NotFound(_)) => stale.push(entry.path.clone()),
                Err(e) => return Err(e),
            }
        }

        Ok(MemoryDiff { untracked, stale })
    }

    /// Index one file on demand, with caller-supplied metadata taking
    /// precedence over the describer. The file must exist.
    pub async fn add_to_memory(
        &self,
        path: &str,
        description: Option<String>,
        tags: Vec<String>,
    ) -> Result<MemoryEntry, ProxyError> {
        let file = self.github().get_file(path).await?;
        let mut memory = self.load_memory().await?;

        self.upsert_memory_entry(&mut memory, path, &file.content)
            .await;
        let entry = memory
            .iter_mut()
            .find(|e| e.path == path)
            .ok_or_else(|| ProxyError::Upstream(format!("Memory entry for {} vanished", path)))?;
        if let Some(description) = description {
            entry.description = description;
        }
        if !tags.is_empty() {
            entry.tags = tags;
        }
        entry.last_updated = chrono::Utc::now().date_naive().to_string();
        let entry = entry.clone();

        let content = serde_yaml::to_string(&memory)?;
        self.commit_and_log(
            MEMORY_FILE,
            &content,
            &format!("Add {} to memory index", path),
            None,
            None,
        )
        .await?;
        Ok(entry)
    }

    /// Case-insensitive substring search over path, description, and
    /// tags.
    pub async fn search_memory(&self, query: &str) -> Result<Vec<MemoryEntry>, ProxyError> {
        let needle = query.to_lowercase();
        let memory = self.load_memory().await?;
        Ok(memory
            .into_iter()
            .filter(|e| {
                e.path.to_lowercase().contains(&needle)
                    || e.description.to_lowercase().contains(&needle)
                    || e.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .collect())
    }

    /// Aggregate counts over the index.
    pub async fn memory_stats(&self) -> Result<MemoryStats, ProxyError> {
        let memory = self.load_memory().await?;

        let mut by_file_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_tag: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_pod_owner: BTreeMap<String, usize> = BTreeMap::new();
        let mut needing_enrichment = 0;
        for entry in &memory {
            *by_file_type.entry(entry.file_type.clone()).or_default() += 1;
            for tag in &entry.tags {
                *by_tag.entry(tag.clone()).or_default() += 1;
            }
            let owner = if entry.pod_owner.is_empty() {
                "unassigned".to_string()
            } else {
                entry.pod_owner.clone()
            };
            *by_pod_owner.entry(owner).or_default() += 1;
            if entry.needs_enrichment() {
                needing_enrichment += 1;
            }
        }

        Ok(MemoryStats {
            total: memory.len(),
            by_file_type,
            by_tag,
            by_pod_owner,
            needing_enrichment,
        })
    }
}
