//! Request and response bodies for the HTTP surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{HandoffNote, ReasoningTrace};
use crate::tasks::{MetadataPatch, NewTask, OutputFile};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub repository: String,
}

#[derive(Debug, Deserialize)]
pub struct FileRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchFileRequest {
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub path: String,
    pub content: String,
    pub sha: String,
}

/// Batch responses carry per-path errors instead of failing the whole
/// request.
#[derive(Debug, Serialize)]
pub struct BatchFileResponse {
    pub files: Vec<FileResponse>,
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub task_id: String,
    #[serde(flatten)]
    pub task: NewTask,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub task_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskIdRequest {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub task_id: String,
    #[serde(default)]
    pub outputs: Vec<OutputFile>,
    #[serde(default)]
    pub reasoning_trace: Option<ReasoningTrace>,
    #[serde(default)]
    pub handoff_note: Option<HandoffNote>,
    #[serde(default)]
    pub handoff_to_same_pod: bool,
    #[serde(default)]
    pub token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ReopenRequest {
    pub task_id: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CloneRequest {
    pub original_task_id: String,
    pub descriptor: String,
}

#[derive(Debug, Deserialize)]
pub struct ScaleOutRequest {
    pub task_id: String,
    pub reason: String,
    #[serde(default)]
    pub handoff_note: Option<HandoffNote>,
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub pod_owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMetadataRequest {
    pub task_id: String,
    #[serde(flatten)]
    pub patch: MetadataPatch,
}

#[derive(Debug, Deserialize)]
pub struct ThoughtRequest {
    pub task_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct HandoffRequest {
    pub task_id: String,
    #[serde(flatten)]
    pub note: HandoffNote,
}

#[derive(Debug, Deserialize)]
pub struct TaskIdQuery {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MemoryIndexRequest {
    /// Directories to scan; defaults to the standard roots when empty.
    #[serde(default)]
    pub base_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemoryAddRequest {
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub project_name: String,
}
