//! Project initialization, tracked as background jobs.
//!
//! Scaffolding a project writes several files to the repository, so the
//! HTTP handler returns a job id immediately and the work runs in a
//! spawned task. Clients poll the job until it completes or fails.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::model::{Task, TaskFile, TaskStatus, MEMORY_FILE, TASK_FILE};
use crate::store::ProjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One tracked initialization job.
#[derive(Debug, Clone, Serialize)]
pub struct InitJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory registry of initialization jobs.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, InitJob>>,
}

impl JobRegistry {
    pub async fn create(&self) -> InitJob {
        let job = InitJob {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            message: "Queued".to_string(),
            created_at: Utc::now(),
        };
        self.jobs.write().await.insert(job.id, job.clone());
        job
    }

    pub async fn update(&self, id: Uuid, status: JobStatus, message: impl Into<String>) {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            job.status = status;
            job.message = message.into();
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<InitJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<InitJob> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}

/// Scaffold the project files and record the outcome on the job.
pub async fn run_initialization(
    store: Arc<ProjectStore>,
    registry: Arc<JobRegistry>,
    job_id: Uuid,
    project_name: &str,
) {
    registry
        .update(job_id, JobStatus::Running, "Scaffolding project files")
        .await;

    match scaffold_project(&store, project_name).await {
        Ok(()) => {
            tracing::info!("Project {} initialized (job {})", project_name, job_id);
            registry
                .update(
                    job_id,
                    JobStatus::Completed,
                    format!("Project {} initialized", project_name),
                )
                .await;
        }
        Err(e) => {
            tracing::warn!("Initialization of {} failed: {}", project_name, e);
            registry.update(job_id, JobStatus::Failed, e.to_string()).await;
        }
    }
}

async fn scaffold_project(store: &ProjectStore, project_name: &str) -> Result<(), ProxyError> {
    match store.github().get_file(TASK_FILE).await {
        Ok(_) => {
            return Err(ProxyError::Validation(format!(
                "Project already initialized: {} exists",
                TASK_FILE
            )))
        }
        Err(ProxyError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let now = Utc::now();
    let mut file = TaskFile::default();
    file.tasks.insert(
        "1.1_define_goals".to_string(),
        Task {
            description: format!("Define the goals and scope for {}", project_name),
            pod_owner: "DeliveryPod".to_string(),
            status: TaskStatus::Backlog,
            ready: true,
            created_by: Some("system".to_string()),
            created_at: Some(now),
            updated_at: Some(now),
            ..Task::default()
        },
    );

    let content = serde_yaml::to_string(&file)?;
    store
        .commit_and_log(
            TASK_FILE,
            &content,
            &format!("Initialize project {}", project_name),
            None,
            Some("system"),
        )
        .await?;

    store
        .commit_and_log(
            MEMORY_FILE,
            "[]\n",
            &format!("Initialize memory index for {}", project_name),
            None,
            Some("system"),
        )
        .await
}
