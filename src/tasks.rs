//! Task lifecycle operations.
//!
//! Every operation loads `project/task.yaml`, locates the task by id
//! (NotFound if absent), checks the status transition, mutates, and
//! persists through the commit-and-log routine.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::model::{
    chain_of_thought_path, handoff_notes_path, reasoning_trace_path, HandoffFile, HandoffNote,
    ReasoningTrace, Task, TaskFile, TaskStatus, ThoughtEntry, TASK_FILE,
};
use crate::store::ProjectStore;

/// Filters accepted by the task listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub pod_owner: Option<String>,
    pub category: Option<String>,
}

/// Fields for a newly created task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub description: String,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub pod_owner: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Partial metadata update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataPatch {
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub inputs: Option<Vec<String>>,
    pub outputs: Option<Vec<String>>,
    pub ready: Option<bool>,
    pub done: Option<bool>,
}

/// An output file committed when completing a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: String,
    pub content: String,
}

/// Everything an agent needs to begin working on a started task.
#[derive(Debug, Clone, Serialize)]
pub struct StartContext {
    pub task_id: String,
    pub prompt_content: String,
    pub inputs: Vec<String>,
    /// Latest handoff note from the upstream task, when `handoff_from`
    /// is set and a note exists.
    pub handoff_note: Option<HandoffNote>,
}

/// Result of completing a task.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub task_id: String,
    pub committed_outputs: Vec<String>,
    /// Downstream tasks cascade-activated because they depended on the
    /// completed one.
    pub activated: Vec<String>,
}

/// Result of cloning or scaling out a task.
#[derive(Debug, Clone, Serialize)]
pub struct CloneOutcome {
    pub new_task_id: String,
    pub task: Task,
}

fn ensure_transition(task_id: &str, from: TaskStatus, to: TaskStatus) -> Result<(), ProxyError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(ProxyError::Validation(format!(
            "Task {} cannot move from {} to {}",
            task_id, from, to
        )))
    }
}

impl ProjectStore {
    /// Load the task file.
    pub async fn load_tasks(&self) -> Result<TaskFile, ProxyError> {
        self.fetch_yaml(TASK_FILE).await
    }

    /// List tasks matching the filter.
    pub async fn list_tasks(
        &self,
        filter: &TaskFilter,
    ) -> Result<BTreeMap<String, Task>, ProxyError> {
        let file = self.load_tasks().await?;
        Ok(file
            .tasks
            .into_iter()
            .filter(|(_, t)| {
                filter.status.map_or(true, |s| t.status == s)
                    && filter
                        .pod_owner
                        .as_ref()
                        .map_or(true, |p| &t.pod_owner == p)
                    && filter
                        .category
                        .as_ref()
                        .map_or(true, |c| t.category.as_ref() == Some(c))
            })
            .collect())
    }

    /// Fetch a single task by id.
    pub async fn get_task(&self, task_id: &str) -> Result<Task, ProxyError> {
        let file = self.load_tasks().await?;
        file.tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| ProxyError::task_not_found(task_id))
    }

    /// Create a new task in backlog.
    pub async fn create_task(&self, task_id: &str, new: NewTask) -> Result<Task, ProxyError> {
        let mut file = self.load_tasks().await?;
        if file.tasks.contains_key(task_id) {
            return Err(ProxyError::Validation(format!(
                "Task {} already exists",
                task_id
            )));
        }

        let now = Utc::now();
        let task = Task {
            description: new.description,
            phase: new.phase,
            category: new.category,
            pod_owner: new.pod_owner.clone(),
            status: TaskStatus::Backlog,
            prompt: new.prompt,
            inputs: new.inputs,
            outputs: new.outputs,
            ready: true,
            done: false,
            created_by: new.created_by.or_else(|| Some("human".to_string())),
            created_at: Some(now),
            updated_at: Some(now),
            depends_on: new.depends_on,
            handoff_from: None,
        };
        file.tasks.insert(task_id.to_string(), task.clone());

        self.save_tasks(
            &file,
            &format!("Create new task {}", task_id),
            Some(task_id),
            Some(&new.pod_owner),
        )
        .await?;
        Ok(task)
    }

    /// Move one or more backlog tasks to planned.
    pub async fn activate_tasks(&self, task_ids: &[String]) -> Result<Vec<String>, ProxyError> {
        let mut file = self.load_tasks().await?;

        for task_id in task_ids {
            let task = file
                .tasks
                .get(task_id)
                .ok_or_else(|| ProxyError::task_not_found(task_id))?;
            ensure_transition(task_id, task.status, TaskStatus::Planned)?;
        }
        let now = Utc::now();
        for task_id in task_ids {
            if let Some(task) = file.tasks.get_mut(task_id) {
                task.status = TaskStatus::Planned;
                task.updated_at = Some(now);
            }
        }

        let first_owner = task_ids
            .first()
            .and_then(|id| file.tasks.get(id))
            .map(|t| t.pod_owner.clone());
        self.save_tasks(
            &file,
            &format!("Planned tasks {:?}", task_ids),
            task_ids.first().map(String::as_str),
            first_owner.as_deref(),
        )
        .await?;
        Ok(task_ids.to_vec())
    }

    /// Move a planned task to in_progress and gather its working
    /// context.
    pub async fn start_task(&self, task_id: &str) -> Result<StartContext, ProxyError> {
        let mut file = self.load_tasks().await?;
        let task = file
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ProxyError::task_not_found(task_id))?;
        ensure_transition(task_id, task.status, TaskStatus::InProgress)?;

        task.status = TaskStatus::InProgress;
        task.updated_at = Some(Utc::now());
        let prompt_path = task.prompt.clone();
        let inputs = task.inputs.clone();
        let handoff_from = task.handoff_from.clone();
        let pod_owner = task.pod_owner.clone();

        self.save_tasks(
            &file,
            &format!("Start task {}", task_id),
            Some(task_id),
            Some(&pod_owner),
        )
        .await?;

        let prompt_content = match prompt_path {
            Some(path) => match self.github().get_file(&path).await {
                Ok(f) => f.content,
                Err(_) => "Prompt file missing.".to_string(),
            },
            None => String::new(),
        };

        let handoff_note = match handoff_from {
            Some(upstream) => self.latest_handoff_note(&upstream).await?,
            None => None,
        };

        Ok(StartContext {
            task_id: task_id.to_string(),
            prompt_content,
            inputs,
            handoff_note,
        })
    }

    /// Complete a task: commit outputs, mark done, attach trace and
    /// handoff note, and cascade-activate dependents.
    pub async fn complete_task(
        &self,
        task_id: &str,
        outputs: Vec<OutputFile>,
        reasoning_trace: Option<ReasoningTrace>,
        handoff_note: Option<HandoffNote>,
        handoff_to_same_pod: bool,
        token_count: Option<u64>,
    ) -> Result<CompletionOutcome, ProxyError> {
        let mut file = self.load_tasks().await?;
        let task = file
            .tasks
            .get(task_id)
            .ok_or_else(|| ProxyError::task_not_found(task_id))?;
        ensure_transition(task_id, task.status, TaskStatus::Completed)?;
        let pod_owner = task.pod_owner.clone();

        let mut committed = Vec::new();
        for output in &outputs {
            self.commit_and_log(
                &output.path,
                &output.content,
                &format!("Save output for {}", task_id),
                Some(task_id),
                Some(&pod_owner),
            )
            .await?;
            committed.push(output.path.clone());
        }

        let now = Utc::now();
        if let Some(task) = file.tasks.get_mut(task_id) {
            task.status = TaskStatus::Completed;
            task.done = true;
            task.updated_at = Some(now);
            for path in &committed {
                if !task.outputs.contains(path) {
                    task.outputs.push(path.clone());
                }
            }
        }

        // Cascade: dependents waiting in backlog become planned.
        let mut activated = Vec::new();
        for (id, t) in file.tasks.iter_mut() {
            if id != task_id
                && t.status == TaskStatus::Backlog
                && t.depends_on.iter().any(|d| d == task_id)
            {
                t.status = TaskStatus::Planned;
                t.updated_at = Some(now);
                activated.push(id.clone());
            }
        }

        self.save_tasks(
            &file,
            &format!("Mark task {} complete", task_id),
            Some(task_id),
            Some(&pod_owner),
        )
        .await?;
        if !activated.is_empty() {
            tracing::info!(
                "Auto-activated downstream tasks of {}: {:?}",
                task_id,
                activated
            );
        }

        if let Some(trace) = reasoning_trace {
            let content = serde_yaml::to_string(&trace)?;
            self.commit_and_log(
                &reasoning_trace_path(task_id),
                &content,
                &format!("Log reasoning trace for {}", task_id),
                Some(task_id),
                Some(&pod_owner),
            )
            .await?;
        }

        let mut note = match handoff_note {
            Some(note) => note,
            None => self.generate_handoff_note(task_id, &file).await?,
        };
        if handoff_to_same_pod {
            note.handoff_type = Some("scale".to_string());
            if let Some(tokens) = token_count {
                note.token_count = tokens;
            }
        }
        self.append_handoff_note(task_id, note).await?;

        Ok(CompletionOutcome {
            task_id: task_id.to_string(),
            committed_outputs: committed,
            activated,
        })
    }

    /// Reopen a completed (or stuck in-progress) task.
    pub async fn reopen_task(&self, task_id: &str, reason: &str) -> Result<(), ProxyError> {
        let mut file = self.load_tasks().await?;
        let task = file
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ProxyError::task_not_found(task_id))?;
        ensure_transition(task_id, task.status, TaskStatus::InProgress)?;

        task.status = TaskStatus::InProgress;
        task.done = false;
        task.updated_at = Some(Utc::now());
        let pod_owner = task.pod_owner.clone();

        self.save_tasks(
            &file,
            &format!("Reopen task {}", task_id),
            Some(task_id),
            Some(&pod_owner),
        )
        .await?;

        self.append_chain_of_thought(task_id, &format!("Reopened: {}", reason))
            .await?;
        Ok(())
    }

    /// Clone a task into a fresh backlog entry.
    pub async fn clone_task(
        &self,
        original_task_id: &str,
        descriptor: &str,
    ) -> Result<CloneOutcome, ProxyError> {
        let mut file = self.load_tasks().await?;
        let original = file
            .tasks
            .get(original_task_id)
            .ok_or_else(|| ProxyError::task_not_found(original_task_id))?
            .clone();

        let new_task_id = format!("{}_clone_{}", original_task_id, descriptor);
        if file.tasks.contains_key(&new_task_id) {
            return Err(ProxyError::Validation(format!(
                "Task {} already exists",
                new_task_id
            )));
        }

        let now = Utc::now();
        let mut task = original;
        task.status = TaskStatus::Backlog;
        task.done = false;
        task.created_at = Some(now);
        task.updated_at = Some(now);
        file.tasks.insert(new_task_id.clone(), task.clone());

        let pod_owner = task.pod_owner.clone();
        self.save_tasks(
            &file,
            &format!("Cloned task {} to {}", original_task_id, new_task_id),
            Some(&new_task_id),
            Some(&pod_owner),
        )
        .await?;

        Ok(CloneOutcome { new_task_id, task })
    }

    /// Spin up a continuation task when the current one hit a
    /// context/token limit, with a scale-type handoff note.
    pub async fn scale_out_task(
        &self,
        task_id: &str,
        reason: &str,
        handoff_note: Option<HandoffNote>,
    ) -> Result<CloneOutcome, ProxyError> {
        let mut file = self.load_tasks().await?;
        let original = file
            .tasks
            .get(task_id)
            .ok_or_else(|| ProxyError::task_not_found(task_id))?
            .clone();
        let pod_owner = original.pod_owner.clone();

        let mut clone_index = 1;
        while file
            .tasks
            .contains_key(&format!("{}_clone_{}", task_id, clone_index))
        {
            clone_index += 1;
        }
        let new_task_id = format!("{}_clone_{}", task_id, clone_index);

        let mut task = original.clone();
        task.status = TaskStatus::Planned;
        task.done = false;
        task.created_at = Some(Utc::now());
        task.updated_at = None;
        task.handoff_from = Some(task_id.to_string());
        task.description = format!("Scale-out clone of {}", task_id);
        file.tasks.insert(new_task_id.clone(), task.clone());

        self.save_tasks(
            &file,
            &format!("Scale out task {} to {}", task_id, new_task_id),
            Some(&new_task_id),
            Some(&pod_owner),
        )
        .await?;

        let note = handoff_note.unwrap_or_else(|| HandoffNote {
            timestamp: Some(Utc::now()),
            from_pod: pod_owner.clone(),
            to_pod: pod_owner.clone(),
            reason: reason.to_string(),
            handoff_type: Some("scale".to_string()),
            reference_files: original.outputs.clone(),
            notes: format!(
                "Context/token limit reached on {}. Work handed off to {}.",
                task_id, new_task_id
            ),
            ways_of_working: "Resume mid-task using prior context".to_string(),
            ..HandoffNote::default()
        });
        self.append_handoff_note(task_id, note).await?;

        Ok(CloneOutcome { new_task_id, task })
    }

    /// Candidate tasks to pick up next: planned or backlog, optionally
    /// restricted to one pod.
    pub async fn next_tasks(
        &self,
        pod_owner: Option<&str>,
    ) -> Result<BTreeMap<String, Task>, ProxyError> {
        let file = self.load_tasks().await?;
        Ok(file
            .tasks
            .into_iter()
            .filter(|(_, t)| {
                matches!(t.status, TaskStatus::Planned | TaskStatus::Backlog)
                    && pod_owner.map_or(true, |p| t.pod_owner == p)
            })
            .collect())
    }

    /// Apply a partial metadata update.
    pub async fn update_metadata(
        &self,
        task_id: &str,
        patch: MetadataPatch,
    ) -> Result<Task, ProxyError> {
        let mut file = self.load_tasks().await?;
        let task = file
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ProxyError::task_not_found(task_id))?;

        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(prompt) = patch.prompt {
            task.prompt = Some(prompt);
        }
        if let Some(inputs) = patch.inputs {
            task.inputs = inputs;
        }
        if let Some(outputs) = patch.outputs {
            task.outputs = outputs;
        }
        if let Some(ready) = patch.ready {
            task.ready = ready;
        }
        if let Some(done) = patch.done {
            task.done = done;
        }
        task.updated_at = Some(Utc::now());
        let updated = task.clone();
        let pod_owner = updated.pod_owner.clone();

        self.save_tasks(
            &file,
            &format!("Update metadata for {}", task_id),
            Some(task_id),
            Some(&pod_owner),
        )
        .await?;
        Ok(updated)
    }

    /// Append a timestamped thought to the task's chain of thought.
    pub async fn append_chain_of_thought(
        &self,
        task_id: &str,
        message: &str,
    ) -> Result<ThoughtEntry, ProxyError> {
        let file = self.load_tasks().await?;
        let pod_owner = file
            .tasks
            .get(task_id)
            .ok_or_else(|| ProxyError::task_not_found(task_id))?
            .pod_owner
            .clone();

        let path = chain_of_thought_path(task_id);
        let mut chain: Vec<ThoughtEntry> = self.fetch_yaml_or_default(&path).await?;
        let entry = ThoughtEntry {
            timestamp: Utc::now(),
            message: message.to_string(),
        };
        chain.push(entry.clone());

        let content = serde_yaml::to_string(&chain)?;
        self.commit_and_log(
            &path,
            &content,
            &format!("Append chain of thought for {}", task_id),
            Some(task_id),
            Some(&pod_owner),
        )
        .await?;
        Ok(entry)
    }

    /// Read the task's chain of thought (empty when none exists).
    pub async fn fetch_chain_of_thought(
        &self,
        task_id: &str,
    ) -> Result<Vec<ThoughtEntry>, ProxyError> {
        self.fetch_yaml_or_default(&chain_of_thought_path(task_id))
            .await
    }

    /// Append a handoff note to the task's handoff file.
    pub async fn append_handoff_note(
        &self,
        task_id: &str,
        mut note: HandoffNote,
    ) -> Result<HandoffNote, ProxyError> {
        if note.timestamp.is_none() {
            note.timestamp = Some(Utc::now());
        }
        let path = handoff_notes_path(task_id);
        let mut file: HandoffFile = self.fetch_yaml_or_default(&path).await?;
        file.handoffs.push(note.clone());

        let committed_by = note.from_pod.clone();
        let content = serde_yaml::to_string(&file)?;
        self.commit_and_log(
            &path,
            &content,
            &format!("Log handoff note for {}", task_id),
            Some(task_id),
            Some(&committed_by),
        )
        .await?;
        Ok(note)
    }

    /// Latest handoff note left by `task_id`, if any.
    pub async fn latest_handoff_note(
        &self,
        task_id: &str,
    ) -> Result<Option<HandoffNote>, ProxyError> {
        let file: HandoffFile = self
            .fetch_yaml_or_default(&handoff_notes_path(task_id))
            .await?;
        Ok(file.handoffs.into_iter().last())
    }

    /// Read a task's reasoning trace.
    pub async fn fetch_reasoning_trace(
        &self,
        task_id: &str,
    ) -> Result<ReasoningTrace, ProxyError> {
        self.fetch_yaml(&reasoning_trace_path(task_id)).await
    }

    /// Build a default handoff note from task metadata and the last few
    /// chain-of-thought messages.
    async fn generate_handoff_note(
        &self,
        task_id: &str,
        file: &TaskFile,
    ) -> Result<HandoffNote, ProxyError> {
        let task = file
            .tasks
            .get(task_id)
            .ok_or_else(|| ProxyError::task_not_found(task_id))?;

        let chain = self.fetch_chain_of_thought(task_id).await?;
        let notes = chain
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|t| t.message.clone())
            .collect::<Vec<_>>()
            .join("\n");

        let mut reference_files = task.outputs.clone();
        reference_files.push(format!("{}/", crate::model::task_output_dir(task_id)));

        Ok(HandoffNote {
            timestamp: Some(Utc::now()),
            from_pod: task.pod_owner.clone(),
            to_pod: String::new(),
            reason: "Auto-generated handoff on task completion.".to_string(),
            token_count: 0,
            next_prompt: format!("Follow up based on task: {}", task.description),
            reference_files,
            notes,
            ways_of_working: "Continue using async updates and reasoning logs.".to_string(),
            handoff_type: None,
        })
    }

    async fn save_tasks(
        &self,
        file: &TaskFile,
        message: &str,
        task_id: Option<&str>,
        committed_by: Option<&str>,
    ) -> Result<(), ProxyError> {
        let content = serde_yaml::to_string(file)?;
        self.commit_and_log(TASK_FILE, &content, message, task_id, committed_by)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangelogEntry, CHANGELOG_FILE};
    use crate::store::testing::{store_with, FakeLlm, FakeRepo};

    fn seed_tasks(repo: &FakeRepo, yaml: &str) {
        repo.seed(TASK_FILE, yaml);
    }

    fn tasks_of(repo: &FakeRepo) -> TaskFile {
        serde_yaml::from_str(&repo.read(TASK_FILE).unwrap()).unwrap()
    }

    fn changelog_of(repo: &FakeRepo) -> Vec<ChangelogEntry> {
        serde_yaml::from_str(&repo.read(CHANGELOG_FILE).unwrap()).unwrap()
    }

    const BASIC_TASKS: &str = r#"
tasks:
  1.1_capture_goals:
    description: Capture project goals
    pod_owner: DeliveryPod
    status: backlog
    inputs: [docs/context.md]
    outputs: [outputs/project_goals.md]
  2.1_build_model:
    description: Build the model
    pod_owner: DevPod
    status: in_progress
  3.1_test_model:
    description: Test the model
    pod_owner: QAPod
    status: backlog
    depends_on: [2.1_build_model]
"#;

    #[tokio::test]
    async fn unknown_task_id_is_not_found_never_a_no_op() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        let err = store.start_task("nope").await.unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(_)));
        let err = store
            .activate_tasks(&["nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(_)));
        let err = store.reopen_task("nope", "because").await.unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(_)));
        // task file untouched
        assert_eq!(tasks_of(&repo).tasks.len(), 3);
    }

    #[tokio::test]
    async fn activate_moves_backlog_to_planned() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        store
            .activate_tasks(&["1.1_capture_goals".to_string()])
            .await
            .unwrap();
        let file = tasks_of(&repo);
        assert_eq!(
            file.get("1.1_capture_goals").unwrap().status,
            TaskStatus::Planned
        );
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        // in_progress cannot be re-activated
        let err = store
            .activate_tasks(&["2.1_build_model".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
        // backlog cannot be started without activation
        let err = store.start_task("1.1_capture_goals").await.unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
        // backlog cannot be reopened
        let err = store
            .reopen_task("1.1_capture_goals", "why")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
    }

    #[tokio::test]
    async fn start_returns_prompt_and_inputs() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(
            &repo,
            r#"
tasks:
  2.2_refine:
    description: Refine the model
    pod_owner: DevPod
    status: planned
    prompt: prompts/refine.txt
    inputs: [data/model.csv]
"#,
        );
        repo.seed("prompts/refine.txt", "Refine carefully.");

        let ctx = store.start_task("2.2_refine").await.unwrap();
        assert_eq!(ctx.prompt_content, "Refine carefully.");
        assert_eq!(ctx.inputs, vec!["data/model.csv"]);
        assert!(ctx.handoff_note.is_none());
        assert_eq!(
            tasks_of(&repo).get("2.2_refine").unwrap().status,
            TaskStatus::InProgress
        );
    }

    #[tokio::test]
    async fn start_surfaces_latest_upstream_handoff_note() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(
            &repo,
            r#"
tasks:
  2.1_build_model:
    description: Build the model
    pod_owner: DevPod
    status: completed
  2.1_build_model_clone_1:
    description: Scale-out clone of 2.1_build_model
    pod_owner: DevPod
    status: planned
    handoff_from: 2.1_build_model
"#,
        );
        repo.seed(
            &handoff_notes_path("2.1_build_model"),
            r#"
handoffs:
  - from_pod: DevPod
    to_pod: DevPod
    reason: first attempt
  - from_pod: DevPod
    to_pod: DevPod
    reason: token limit reached
    handoff_type: scale
"#,
        );

        let ctx = store.start_task("2.1_build_model_clone_1").await.unwrap();
        let note = ctx.handoff_note.expect("upstream note should be surfaced");
        assert_eq!(note.reason, "token limit reached");
        assert_eq!(note.handoff_type.as_deref(), Some("scale"));
    }

    #[tokio::test]
    async fn start_surfaces_missing_prompt_as_placeholder() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(
            &repo,
            r#"
tasks:
  2.2_refine:
    description: Refine
    pod_owner: DevPod
    status: planned
    prompt: prompts/gone.txt
"#,
        );
        let ctx = store.start_task("2.2_refine").await.unwrap();
        assert_eq!(ctx.prompt_content, "Prompt file missing.");
    }

    #[tokio::test]
    async fn complete_commits_outputs_and_logs_them() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        let outcome = store
            .complete_task(
                "2.1_build_model",
                vec![OutputFile {
                    path: "a.md".to_string(),
                    content: "x".to_string(),
                }],
                None,
                None,
                false,
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.committed_outputs, vec!["a.md"]);
        assert_eq!(repo.read("a.md").unwrap(), "x");

        let task = tasks_of(&repo).get("2.1_build_model").cloned().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.done);
        assert!(task.outputs.contains(&"a.md".to_string()));

        let changelog = changelog_of(&repo);
        assert!(changelog.iter().any(|e| e.path == "a.md"));
    }

    #[tokio::test]
    async fn complete_cascade_activates_dependents() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        let outcome = store
            .complete_task("2.1_build_model", Vec::new(), None, None, false, None)
            .await
            .unwrap();

        assert_eq!(outcome.activated, vec!["3.1_test_model"]);
        assert_eq!(
            tasks_of(&repo).get("3.1_test_model").unwrap().status,
            TaskStatus::Planned
        );
    }

    #[tokio::test]
    async fn complete_writes_auto_handoff_note() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        store
            .complete_task("2.1_build_model", Vec::new(), None, None, true, Some(4200))
            .await
            .unwrap();

        let handoffs: HandoffFile =
            serde_yaml::from_str(&repo.read(&handoff_notes_path("2.1_build_model")).unwrap())
                .unwrap();
        assert_eq!(handoffs.handoffs.len(), 1);
        let note = &handoffs.handoffs[0];
        assert_eq!(note.from_pod, "DevPod");
        assert_eq!(note.handoff_type.as_deref(), Some("scale"));
        assert_eq!(note.token_count, 4200);
    }

    #[tokio::test]
    async fn reopen_escapes_completed_and_notes_why() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);
        store
            .complete_task("2.1_build_model", Vec::new(), None, None, false, None)
            .await
            .unwrap();

        store
            .reopen_task("2.1_build_model", "needs another pass")
            .await
            .unwrap();

        let task = tasks_of(&repo).get("2.1_build_model").cloned().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(!task.done);

        let chain = store.fetch_chain_of_thought("2.1_build_model").await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].message, "Reopened: needs another pass");
    }

    #[tokio::test]
    async fn clone_resets_status_and_timestamps() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        let before = Utc::now();
        let outcome = store
            .clone_task("2.1_build_model", "retrain")
            .await
            .unwrap();

        assert_eq!(outcome.new_task_id, "2.1_build_model_clone_retrain");
        assert_ne!(outcome.new_task_id, "2.1_build_model");
        assert_eq!(outcome.task.status, TaskStatus::Backlog);
        assert_eq!(outcome.task.description, "Build the model");
        assert_eq!(outcome.task.pod_owner, "DevPod");
        assert!(outcome.task.created_at.unwrap() >= before);
        assert!(outcome.task.updated_at.unwrap() >= before);
        assert!(tasks_of(&repo)
            .tasks
            .contains_key("2.1_build_model_clone_retrain"));
    }

    #[tokio::test]
    async fn scale_out_picks_first_free_suffix_and_hands_off() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        let first = store
            .scale_out_task("2.1_build_model", "token limit", None)
            .await
            .unwrap();
        assert_eq!(first.new_task_id, "2.1_build_model_clone_1");
        assert_eq!(first.task.status, TaskStatus::Planned);
        assert_eq!(first.task.handoff_from.as_deref(), Some("2.1_build_model"));

        let second = store
            .scale_out_task("2.1_build_model", "token limit", None)
            .await
            .unwrap();
        assert_eq!(second.new_task_id, "2.1_build_model_clone_2");

        let handoffs: HandoffFile =
            serde_yaml::from_str(&repo.read(&handoff_notes_path("2.1_build_model")).unwrap())
                .unwrap();
        assert_eq!(handoffs.handoffs.len(), 2);
        assert_eq!(handoffs.handoffs[0].handoff_type.as_deref(), Some("scale"));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        let err = store
            .create_task(
                "2.1_build_model",
                NewTask {
                    description: "dup".into(),
                    pod_owner: "DevPod".into(),
                    ..NewTask::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
    }

    #[tokio::test]
    async fn update_metadata_patches_only_given_fields() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        let updated = store
            .update_metadata(
                "1.1_capture_goals",
                MetadataPatch {
                    description: Some("Capture and rank goals".into()),
                    ready: Some(false),
                    ..MetadataPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.description, "Capture and rank goals");
        assert!(!updated.ready);
        // untouched fields survive
        assert_eq!(updated.pod_owner, "DeliveryPod");
        assert_eq!(updated.inputs, vec!["docs/context.md"]);
    }

    #[tokio::test]
    async fn next_tasks_filters_by_pod() {
        let (repo, store) = store_with(FakeLlm::describer());
        seed_tasks(&repo, BASIC_TASKS);

        let all = store.next_tasks(None).await.unwrap();
        assert_eq!(all.len(), 2); // both backlog tasks
        let qa = store.next_tasks(Some("QAPod")).await.unwrap();
        assert_eq!(qa.len(), 1);
        assert!(qa.contains_key("3.1_test_model"));
    }
}
