//! Router assembly and server startup.

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::github::GitHubClient;
use crate::llm::OpenAiClient;
use crate::project::JobRegistry;
use crate::store::ProjectStore;

use super::actions;
use super::files;
use super::memory as memory_api;
use super::metrics as metrics_api;
use super::project as project_api;
use super::tasks as tasks_api;
use super::types::HealthResponse;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<ProjectStore>,
    pub init_jobs: Arc<JobRegistry>,
    /// OpenAPI document loaded once at startup, when present.
    pub openapi: Option<Value>,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let github = Arc::new(GitHubClient::new(&config));
    let llm = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
    ));
    let store = Arc::new(ProjectStore::new(github, llm, config.raw_content_base()));

    let openapi = match tokio::fs::read_to_string(&config.openapi_path).await {
        Ok(text) => match serde_json::from_str::<Value>(&text) {
            Ok(doc) => {
                tracing::info!("Loaded OpenAPI document from {}", config.openapi_path);
                Some(doc)
            }
            Err(e) => {
                tracing::warn!("OpenAPI document {} is not JSON: {}", config.openapi_path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("OpenAPI document {} not loaded: {}", config.openapi_path, e);
            None
        }
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        init_jobs: Arc::new(JobRegistry::default()),
        openapi,
    });

    let app = router(Arc::clone(&state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "Serving repository {}/{} on {}",
        config.github_owner,
        config.github_repo,
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/openapi.json", get(actions::openapi))
        .route("/actions/list", get(actions::list))
        // File proxy
        .route("/files/get", post(files::get_file))
        .route("/files/batch", post(files::get_batch))
        // Task lifecycle
        .route("/tasks/list", get(tasks_api::list))
        .route("/tasks/next", get(tasks_api::next))
        .route("/tasks/create", post(tasks_api::create))
        .route("/tasks/activate", post(tasks_api::activate))
        .route("/tasks/start", post(tasks_api::start))
        .route("/tasks/complete", post(tasks_api::complete))
        .route("/tasks/reopen", post(tasks_api::reopen))
        .route("/tasks/clone", post(tasks_api::clone_task))
        .route("/tasks/scale_out", post(tasks_api::scale_out))
        .route("/tasks/update_metadata", patch(tasks_api::update_metadata))
        .route(
            "/tasks/chain_of_thought",
            get(tasks_api::get_thoughts).post(tasks_api::post_thought),
        )
        .route(
            "/tasks/handoff",
            get(tasks_api::get_handoff).post(tasks_api::post_handoff),
        )
        .route("/tasks/reasoning_trace", get(tasks_api::get_trace))
        .route("/tasks/:task_id", get(tasks_api::get))
        // Memory index
        .route("/memory/index", post(memory_api::index))
        .route("/memory/diff", post(memory_api::diff))
        .route("/memory/add", post(memory_api::add))
        .route("/memory/search", get(memory_api::search))
        .route("/memory/stats", get(memory_api::stats))
        // Metrics
        .route("/metrics/summary", get(metrics_api::summary))
        .route("/metrics/reasoning_summary", get(metrics_api::reasoning_summary))
        // Project scaffolding
        .route(
            "/project/init",
            post(project_api::init).get(project_api::list_jobs),
        )
        .route("/project/init/:id", get(project_api::get_job))
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        repository: format!("{}/{}", state.config.github_owner, state.config.github_repo),
    })
}

/// Wait for SIGTERM/SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to install signal handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
