//! Task lifecycle endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::model::{HandoffNote, ReasoningTrace, Task, ThoughtEntry};
use crate::tasks::{CloneOutcome, CompletionOutcome, StartContext, TaskFilter};

use super::routes::AppState;
use super::types::*;

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<BTreeMap<String, Task>>, ProxyError> {
    Ok(Json(state.store.list_tasks(&filter).await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ProxyError> {
    Ok(Json(state.store.get_task(&task_id).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, ProxyError> {
    Ok(Json(state.store.create_task(&req.task_id, req.task).await?))
}

pub async fn activate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<Value>, ProxyError> {
    let activated = state.store.activate_tasks(&req.task_ids).await?;
    Ok(Json(json!({ "activated": activated })))
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TaskIdRequest>,
) -> Result<Json<StartContext>, ProxyError> {
    Ok(Json(state.store.start_task(&req.task_id).await?))
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<CompletionOutcome>, ProxyError> {
    let outcome = state
        .store
        .complete_task(
            &req.task_id,
            req.outputs,
            req.reasoning_trace,
            req.handoff_note,
            req.handoff_to_same_pod,
            req.token_count,
        )
        .await?;
    Ok(Json(outcome))
}

pub async fn reopen(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReopenRequest>,
) -> Result<Json<Value>, ProxyError> {
    state.store.reopen_task(&req.task_id, &req.reason).await?;
    Ok(Json(json!({ "task_id": req.task_id, "status": "in_progress" })))
}

pub async fn clone_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CloneRequest>,
) -> Result<Json<CloneOutcome>, ProxyError> {
    Ok(Json(
        state
            .store
            .clone_task(&req.original_task_id, &req.descriptor)
            .await?,
    ))
}

pub async fn scale_out(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScaleOutRequest>,
) -> Result<Json<CloneOutcome>, ProxyError> {
    Ok(Json(
        state
            .store
            .scale_out_task(&req.task_id, &req.reason, req.handoff_note)
            .await?,
    ))
}

pub async fn next(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NextQuery>,
) -> Result<Json<BTreeMap<String, Task>>, ProxyError> {
    Ok(Json(
        state.store.next_tasks(query.pod_owner.as_deref()).await?,
    ))
}

pub async fn update_metadata(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateMetadataRequest>,
) -> Result<Json<Task>, ProxyError> {
    Ok(Json(
        state.store.update_metadata(&req.task_id, req.patch).await?,
    ))
}

pub async fn post_thought(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ThoughtRequest>,
) -> Result<Json<ThoughtEntry>, ProxyError> {
    Ok(Json(
        state
            .store
            .append_chain_of_thought(&req.task_id, &req.message)
            .await?,
    ))
}

pub async fn get_thoughts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskIdQuery>,
) -> Result<Json<Vec<ThoughtEntry>>, ProxyError> {
    Ok(Json(
        state.store.fetch_chain_of_thought(&query.task_id).await?,
    ))
}

pub async fn post_handoff(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HandoffRequest>,
) -> Result<Json<HandoffNote>, ProxyError> {
    Ok(Json(
        state
            .store
            .append_handoff_note(&req.task_id, req.note)
            .await?,
    ))
}

pub async fn get_handoff(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskIdQuery>,
) -> Result<Json<Value>, ProxyError> {
    let note = state.store.latest_handoff_note(&query.task_id).await?;
    Ok(Json(json!({ "task_id": query.task_id, "handoff_note": note })))
}

pub async fn get_trace(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskIdQuery>,
) -> Result<Json<ReasoningTrace>, ProxyError> {
    Ok(Json(state.store.fetch_reasoning_trace(&query.task_id).await?))
}
