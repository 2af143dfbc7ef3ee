//! Project file store: every tracked write goes through
//! [`ProjectStore::commit_and_log`], which commits the file, appends a
//! changelog entry, and keeps the memory index in sync.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProxyError;
use crate::github::ContentStore;
use crate::llm::{describe_file, ChatClient, FileMetadata};
use crate::model::{file_type_of, ChangelogEntry, MemoryEntry, CHANGELOG_FILE, MEMORY_FILE};

/// How many times a read-modify-write is re-applied against fresh
/// content before the conflict is surfaced.
const WRITE_ATTEMPTS: u32 = 3;

/// Access to the project repository's YAML documents.
pub struct ProjectStore {
    github: Arc<dyn ContentStore>,
    llm: Arc<dyn ChatClient>,
    /// Base URL for raw file links recorded in memory entries.
    raw_base: String,
}

impl ProjectStore {
    pub fn new(github: Arc<dyn ContentStore>, llm: Arc<dyn ChatClient>, raw_base: String) -> Self {
        Self {
            github,
            llm,
            raw_base: raw_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn github(&self) -> &dyn ContentStore {
        self.github.as_ref()
    }

    pub fn llm(&self) -> &dyn ChatClient {
        self.llm.as_ref()
    }

    /// Fetch and parse a YAML document.
    pub async fn fetch_yaml<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProxyError> {
        let file = self.github.get_file(path).await?;
        Ok(serde_yaml::from_str(&file.content)?)
    }

    /// Fetch and parse a YAML document, falling back to `T::default()`
    /// when the file does not exist yet.
    pub async fn fetch_yaml_or_default<T>(&self, path: &str) -> Result<T, ProxyError>
    where
        T: DeserializeOwned + Default,
    {
        match self.github.get_file(path).await {
            Ok(file) => Ok(serde_yaml::from_str(&file.content)?),
            Err(ProxyError::NotFound(_)) => Ok(T::default()),
            Err(e) => Err(e),
        }
    }

    /// Create-or-update a file with the caller's content, conditional
    /// on the current SHA.
    ///
    /// Single-shot: a concurrent write to the same path surfaces as
    /// `Conflict` rather than being overwritten with the caller's
    /// stale view. Documents that must absorb concurrent edits go
    /// through [`ProjectStore::update_yaml`] instead.
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), ProxyError> {
        let sha = match self.github.get_file(path).await {
            Ok(file) => Some(file.sha),
            Err(ProxyError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        self.github
            .put_file(path, content, message, sha.as_deref())
            .await?;
        Ok(())
    }

    /// Read-modify-write a YAML document with SHA-checked optimistic
    /// concurrency.
    ///
    /// Each attempt fetches the current document (default when absent),
    /// re-applies `apply` to it, and writes conditionally. A conflict
    /// means another writer landed in between; their content is picked
    /// up by the next attempt's fetch, so nothing gets overwritten with
    /// a stale view. The last conflict is surfaced once attempts run
    /// out.
    pub async fn update_yaml<T, F>(
        &self,
        path: &str,
        message: &str,
        mut apply: F,
    ) -> Result<(), ProxyError>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnMut(&mut T),
    {
        let mut last_conflict = None;
        for _ in 0..WRITE_ATTEMPTS {
            let (mut doc, sha) = match self.github.get_file(path).await {
                Ok(file) => (serde_yaml::from_str::<T>(&file.content)?, Some(file.sha)),
                Err(ProxyError::NotFound(_)) => (T::default(), None),
                Err(e) => return Err(e),
            };
            apply(&mut doc);
            let content = serde_yaml::to_string(&doc)?;
            match self
                .github
                .put_file(path, &content, message, sha.as_deref())
                .await
            {
                Ok(_) => return Ok(()),
                Err(ProxyError::Conflict(msg)) => {
                    tracing::warn!("Conflict updating {}, re-applying on fresh content", path);
                    last_conflict = Some(msg);
                }
                Err(e) => return Err(e),
            }
        }
        Err(ProxyError::Conflict(last_conflict.unwrap_or_else(|| {
            format!("update of {} kept conflicting", path)
        })))
    }

    /// Commit a file and record the write.
    ///
    /// Steps: write the target file, then (for any path other than the
    /// memory index itself) upsert a memory entry for the path with
    /// describer metadata, then append a changelog entry for the write
    /// (plus one for the memory update when it happened). The memory
    /// and changelog updates go through `update_yaml`, so concurrent
    /// appends survive a conflicted attempt. A failure partway leaves
    /// the changelog or memory index stale relative to the committed
    /// file; the caller sees the error of the step that failed.
    pub async fn commit_and_log(
        &self,
        path: &str,
        content: &str,
        message: &str,
        task_id: Option<&str>,
        committed_by: Option<&str>,
    ) -> Result<(), ProxyError> {
        let timestamp = Utc::now();

        self.write_file(path, content, message).await?;
        tracing::info!("Committed {} ({})", path, message);

        // The memory index never indexes itself.
        let mut memory_updated = false;
        if path != MEMORY_FILE {
            let memory: Vec<MemoryEntry> = self.fetch_yaml_or_default(MEMORY_FILE).await?;
            let needs = memory
                .iter()
                .find(|e| e.path == path)
                .map_or(true, MemoryEntry::needs_enrichment);
            if needs {
                let meta = describe_file(self.llm.as_ref(), path, content).await;
                self.update_yaml(
                    MEMORY_FILE,
                    &format!("Update memory index for {}", path),
                    |memory: &mut Vec<MemoryEntry>| {
                        self.apply_metadata(memory, path, &meta);
                    },
                )
                .await?;
                memory_updated = true;
            }
        }

        let write_entry = ChangelogEntry {
            timestamp,
            path: path.to_string(),
            task_id: task_id.map(String::from),
            committed_by: committed_by.map(String::from),
            message: message.to_string(),
        };
        let memory_entry = memory_updated.then(|| ChangelogEntry {
            timestamp,
            path: MEMORY_FILE.to_string(),
            task_id: task_id.map(String::from),
            committed_by: committed_by.map(String::from),
            message: format!("Memory update related to {}", path),
        });
        self.update_yaml(
            CHANGELOG_FILE,
            &format!("Update changelog at {}", timestamp.to_rfc3339()),
            |changelog: &mut Vec<ChangelogEntry>| {
                changelog.push(write_entry.clone());
                if let Some(entry) = &memory_entry {
                    changelog.push(entry.clone());
                }
            },
        )
        .await
    }

    /// Upsert a memory entry for `path`, filling missing metadata via
    /// the describer. Returns whether the index changed.
    pub async fn upsert_memory_entry(
        &self,
        memory: &mut Vec<MemoryEntry>,
        path: &str,
        content: &str,
    ) -> bool {
        let needs = memory
            .iter()
            .find(|e| e.path == path)
            .map_or(true, MemoryEntry::needs_enrichment);
        if !needs {
            return false;
        }
        let meta = describe_file(self.llm.as_ref(), path, content).await;
        self.apply_metadata(memory, path, &meta)
    }

    /// Apply already-computed metadata to the index: fill only missing
    /// fields on an existing entry, or create a new one. Synchronous so
    /// it can be re-applied inside a conflicted `update_yaml` attempt.
    fn apply_metadata(
        &self,
        memory: &mut Vec<MemoryEntry>,
        path: &str,
        meta: &FileMetadata,
    ) -> bool {
        let today = Utc::now().date_naive().to_string();

        if let Some(entry) = memory.iter_mut().find(|e| e.path == path) {
            if !entry.needs_enrichment() {
                return false;
            }
            if entry.description.is_empty() {
                entry.description = meta.description.clone();
            }
            if entry.tags.is_empty() {
                entry.tags = meta.tags.clone();
            }
            if entry.pod_owner.is_empty() {
                entry.pod_owner = meta.pod_owner.clone();
            }
            entry.last_updated = today;
            return true;
        }

        memory.push(MemoryEntry {
            path: path.to_string(),
            raw_url: format!("{}/{}", self.raw_base, path),
            file_type: file_type_of(path),
            description: meta.description.clone(),
            tags: meta.tags.clone(),
            last_updated: today,
            pod_owner: meta.pod_owner.clone(),
        });
        true
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fakes shared by the domain-logic tests.

    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::error::ProxyError;
    use crate::github::{ContentStore, DirEntry, EntryKind, RepoFile};
    use crate::llm::ChatClient;

    use super::ProjectStore;

    /// In-memory `ContentStore` with SHA-checked conditional writes.
    #[derive(Default)]
    pub struct FakeRepo {
        files: Mutex<BTreeMap<String, (String, String)>>,
        counter: AtomicU64,
    }

    impl FakeRepo {
        pub fn seed(&self, path: &str, content: &str) {
            let sha = format!("sha{}", self.counter.fetch_add(1, Ordering::SeqCst));
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), (content.to_string(), sha));
        }

        pub fn read(&self, path: &str) -> Option<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|(c, _)| c.clone())
        }
    }

    #[async_trait]
    impl ContentStore for FakeRepo {
        async fn get_file(&self, path: &str) -> Result<RepoFile, ProxyError> {
            let files = self.files.lock().unwrap();
            match files.get(path) {
                Some((content, sha)) => Ok(RepoFile {
                    path: path.to_string(),
                    content: content.clone(),
                    sha: sha.clone(),
                }),
                None => Err(ProxyError::NotFound(format!("File {} not found", path))),
            }
        }

        async fn put_file(
            &self,
            path: &str,
            content: &str,
            _message: &str,
            sha: Option<&str>,
        ) -> Result<String, ProxyError> {
            let mut files = self.files.lock().unwrap();
            let current = files.get(path).map(|(_, s)| s.clone());
            if current.as_deref() != sha {
                return Err(ProxyError::Conflict(format!(
                    "SHA mismatch writing {}",
                    path
                )));
            }
            let new_sha = format!("sha{}", self.counter.fetch_add(1, Ordering::SeqCst));
            files.insert(path.to_string(), (content.to_string(), new_sha.clone()));
            Ok(new_sha)
        }

        async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, ProxyError> {
            let files = self.files.lock().unwrap();
            let prefix = format!("{}/", path.trim_end_matches('/'));
            let mut seen = std::collections::BTreeSet::new();
            let mut entries = Vec::new();
            for file_path in files.keys() {
                if let Some(rest) = file_path.strip_prefix(&prefix) {
                    match rest.split_once('/') {
                        Some((dir, _)) => {
                            if seen.insert(dir.to_string()) {
                                entries.push(DirEntry {
                                    path: format!("{}{}", prefix, dir),
                                    name: dir.to_string(),
                                    kind: EntryKind::Dir,
                                });
                            }
                        }
                        None => entries.push(DirEntry {
                            path: file_path.clone(),
                            name: rest.to_string(),
                            kind: EntryKind::File,
                        }),
                    }
                }
            }
            if entries.is_empty() {
                return Err(ProxyError::NotFound(format!("Path {} not found", path)));
            }
            Ok(entries)
        }
    }

    /// `ChatClient` fake returning a fixed reply or a fixed failure.
    pub struct FakeLlm {
        pub reply: Result<String, String>,
    }

    impl FakeLlm {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: Err("model unavailable".to_string()),
            }
        }

        /// Well-formed describer output used by most tests.
        pub fn describer() -> Self {
            Self::replying(
                "description: Described by fake\ntags:\n  - auto\n  - test\npod_owner: DevPod",
            )
        }
    }

    #[async_trait]
    impl ChatClient for FakeLlm {
        async fn complete(&self, _prompt: &str, _temperature: f64) -> anyhow::Result<String> {
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    /// A `ProjectStore` wired to fakes, plus a handle to the fake repo.
    pub fn store_with(llm: FakeLlm) -> (Arc<FakeRepo>, ProjectStore) {
        let repo = Arc::new(FakeRepo::default());
        let store = ProjectStore::new(
            Arc::clone(&repo) as Arc<dyn ContentStore>,
            Arc::new(llm),
            "https://raw.githubusercontent.com/acme/delivery/main".to_string(),
        );
        (repo, store)
    }
}
