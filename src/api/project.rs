//! Project initialization endpoints.
//!
//! Initialization writes several files, so the POST returns a job id
//! immediately and the scaffolding runs in a spawned task.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::project::{run_initialization, InitJob};

use super::routes::AppState;
use super::types::InitRequest;

pub async fn init(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InitRequest>,
) -> Result<Json<InitJob>, ProxyError> {
    if req.project_name.trim().is_empty() {
        return Err(ProxyError::Validation(
            "project_name must not be empty".to_string(),
        ));
    }

    let job = state.init_jobs.create().await;
    let store = Arc::clone(&state.store);
    let registry = Arc::clone(&state.init_jobs);
    let job_id = job.id;
    let project_name = req.project_name.clone();
    tokio::spawn(async move {
        run_initialization(store, registry, job_id, &project_name).await;
    });

    Ok(Json(job))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<InitJob>, ProxyError> {
    state
        .init_jobs
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ProxyError::NotFound(format!("Init job {} not found", id)))
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<InitJob>> {
    Json(state.init_jobs.list().await)
}
