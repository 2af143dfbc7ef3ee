//! Typed records for the YAML documents stored in the project repository.
//!
//! Every document the service reads or writes has an explicit struct
//! here; duck-typed maps never cross the deserialization boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository-relative path of the task file.
pub const TASK_FILE: &str = "project/task.yaml";
/// Repository-relative path of the memory index.
pub const MEMORY_FILE: &str = "project/memory.yaml";
/// Repository-relative path of the append-only changelog.
pub const CHANGELOG_FILE: &str = "project/outputs/changelog.yaml";

/// Output directory for a task's generated artifacts.
pub fn task_output_dir(task_id: &str) -> String {
    format!("project/outputs/{}", task_id)
}

pub fn chain_of_thought_path(task_id: &str) -> String {
    format!("project/outputs/{}/chain_of_thought.yaml", task_id)
}

pub fn reasoning_trace_path(task_id: &str) -> String {
    format!("project/outputs/{}/reasoning_trace.yaml", task_id)
}

pub fn handoff_notes_path(task_id: &str) -> String {
    format!("project/outputs/{}/handoff_notes.yaml", task_id)
}

/// Lifecycle status of a task. Tasks are never deleted, only
/// status-transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Planned,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Whether moving from `self` to `to` is an allowed transition.
    ///
    /// Forward edges: backlog -> planned -> in_progress -> completed.
    /// The single back-edge is reopen: completed or in_progress back to
    /// in_progress.
    pub fn can_transition(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Backlog, Planned)
                | (Planned, InProgress)
                | (InProgress, Completed)
                | (Completed, InProgress)
                | (InProgress, InProgress)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Backlog => "backlog",
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Backlog
    }
}

/// A unit of delivery work tracked in `project/task.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Owning pod (team/agent role).
    #[serde(default)]
    pub pod_owner: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Repository path of the prompt file for this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Ids of tasks this one depends on; completing a dependency
    /// cascade-activates this task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Id of the task that handed work off to this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_from: Option<String>,
}

/// The whole task file: a single `tasks` mapping keyed by task id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
}

impl TaskFile {
    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn get_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(task_id)
    }
}

/// One record in the append-only changelog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub timestamp: DateTime<Utc>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_by: Option<String>,
    pub message: String,
}

/// One record in the memory index, keyed by `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub path: String,
    #[serde(default)]
    pub raw_url: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Date (YYYY-MM-DD) of the last enrichment.
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub pod_owner: String,
}

impl MemoryEntry {
    /// An entry with no description, tags, or owner still needs the
    /// describer.
    pub fn needs_enrichment(&self) -> bool {
        self.description.is_empty() || self.tags.is_empty() || self.pod_owner.is_empty()
    }
}

/// File extension used as `file_type` in memory entries.
pub fn file_type_of(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((_, ext)) if !ext.contains('/') => ext.to_string(),
        _ => "unknown".to_string(),
    }
}

/// One timestamped free-text entry in a task's chain of thought.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// A structured context-transfer record between work sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandoffNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub from_pod: String,
    #[serde(default)]
    pub to_pod: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub next_prompt: String,
    #[serde(default)]
    pub reference_files: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub ways_of_working: String,
    /// Set to "scale" for same-pod context-limit handoffs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_type: Option<String>,
}

/// The per-task handoff file: an append-only `handoffs` list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandoffFile {
    #[serde(default)]
    pub handoffs: Vec<HandoffNote>,
}

/// One thought in a reasoning trace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceThought {
    pub thought: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Self-assessment scores recorded with a reasoning trace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceScoring {
    #[serde(default)]
    pub thought_quality: u32,
    #[serde(default)]
    pub recall_used: bool,
    #[serde(default)]
    pub novel_insight: bool,
}

/// Reasoning trace attached to a completed task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub task_id: String,
    #[serde(default)]
    pub thoughts: Vec<TraceThought>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub improvement_opportunities: Vec<String>,
    #[serde(default)]
    pub scoring: TraceScoring,
    #[serde(default)]
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_lifecycle() {
        use TaskStatus::*;
        assert!(Backlog.can_transition(Planned));
        assert!(Planned.can_transition(InProgress));
        assert!(InProgress.can_transition(Completed));
        // reopen back-edge
        assert!(Completed.can_transition(InProgress));
        assert!(InProgress.can_transition(InProgress));
        // everything else is rejected
        assert!(!Backlog.can_transition(Completed));
        assert!(!Backlog.can_transition(InProgress));
        assert!(!Completed.can_transition(Backlog));
        assert!(!Planned.can_transition(Completed));
        assert!(!Completed.can_transition(Planned));
    }

    #[test]
    fn status_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(yaml.trim(), "in_progress");
        let back: TaskStatus = serde_yaml::from_str("in_progress").unwrap();
        assert_eq!(back, TaskStatus::InProgress);
    }

    #[test]
    fn task_file_roundtrip_with_missing_fields() {
        let yaml = r#"
tasks:
  1.1_capture_goals:
    description: Capture project goals
    pod_owner: DeliveryPod
    status: planned
"#;
        let file: TaskFile = serde_yaml::from_str(yaml).unwrap();
        let task = file.get("1.1_capture_goals").unwrap();
        assert_eq!(task.status, TaskStatus::Planned);
        assert!(task.inputs.is_empty());
        assert!(task.created_at.is_none());
        assert!(!task.done);
    }

    #[test]
    fn file_type_extraction() {
        assert_eq!(file_type_of("project/task.yaml"), "yaml");
        assert_eq!(file_type_of("docs/notes.md"), "md");
        assert_eq!(file_type_of("Makefile"), "unknown");
        assert_eq!(file_type_of("a.b/Makefile"), "unknown");
    }

    #[test]
    fn memory_entry_enrichment_check() {
        let mut entry = MemoryEntry {
            path: "a.md".into(),
            raw_url: String::new(),
            file_type: "md".into(),
            description: "doc".into(),
            tags: vec!["auto".into()],
            last_updated: String::new(),
            pod_owner: "DevPod".into(),
        };
        assert!(!entry.needs_enrichment());
        entry.pod_owner.clear();
        assert!(entry.needs_enrichment());
    }

    #[test]
    fn output_paths_follow_convention() {
        assert_eq!(
            chain_of_thought_path("2.1a_build"),
            "project/outputs/2.1a_build/chain_of_thought.yaml"
        );
        assert_eq!(
            reasoning_trace_path("2.1a_build"),
            "project/outputs/2.1a_build/reasoning_trace.yaml"
        );
        assert_eq!(
            handoff_notes_path("2.1a_build"),
            "project/outputs/2.1a_build/handoff_notes.yaml"
        );
    }
}
