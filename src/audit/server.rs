//! HTTP routes of the audit surface
//!
//! ```text
//! GET  /health        - health check
//! GET  /plan          - plan document
//! POST /plan          - replace the plan (audited as SET_PLAN)
//! GET  /guidelines    - guidelines document
//! POST /guidelines    - replace the guidelines (audited as SET_GUIDELINES)
//! GET  /audit         - audit log
//! POST /audit         - append an audit entry
//! POST /logPrompt     - record a user prompt
//! POST /logResponse   - record an assistant response
//! GET  /readme        - project README as markdown
//! GET  /structure     - project directory tree
//! ```

use super::store::AuditStore;
use crate::config::AuditConfig;
use crate::error::ServerError;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Store = State<Arc<AuditStore>>;

/// Body of `/logPrompt` and `/logResponse`
#[derive(Debug, Deserialize)]
pub struct ContentBody {
    #[serde(default)]
    pub content: Value,
}

/// Build the audit router over `store`.
pub fn router(store: Arc<AuditStore>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/plan", get(get_plan_handler).post(set_plan_handler))
        .route(
            "/guidelines",
            get(get_guidelines_handler).post(set_guidelines_handler),
        )
        .route("/audit", get(get_audit_handler).post(append_audit_handler))
        .route("/logPrompt", post(log_prompt_handler))
        .route("/logResponse", post(log_response_handler))
        .route("/readme", get(readme_handler))
        .route("/structure", get(structure_handler))
        .with_state(store)
}

/// Bind the audit surface and serve it until `cancel` fires.
///
/// Returns the bound address and the serving task.
pub async fn start_audit_server(
    config: &AuditConfig,
    cancel: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    let addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind {
            addr: bind_addr,
            source,
        })?;

    let app = router(Arc::new(AuditStore::new(config)));
    log::info!("Audit server listening on http://{}", addr);
    log::debug!("Audit data directory: {}", config.data_dir.display());

    let task = tokio::spawn(async move {
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            log::error!("Audit server error: {}", e);
        }
        log::info!("Audit server on {} stopped", addr);
    });

    Ok((addr, task))
}

fn stored(result: Result<Value, String>) -> (StatusCode, Json<Value>) {
    match result {
        Ok(_) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(e) => {
            log::error!("Audit store write failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e })),
            )
        }
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "mcpwire-audit",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn get_plan_handler(State(store): Store) -> Json<Value> {
    Json(store.plan().await)
}

async fn set_plan_handler(
    State(store): Store,
    Json(plan): Json<Map<String, Value>>,
) -> (StatusCode, Json<Value>) {
    stored(store.set_plan(plan).await)
}

async fn get_guidelines_handler(State(store): Store) -> Json<Value> {
    Json(store.guidelines().await)
}

async fn set_guidelines_handler(
    State(store): Store,
    Json(guidelines): Json<Map<String, Value>>,
) -> (StatusCode, Json<Value>) {
    stored(store.set_guidelines(guidelines).await)
}

async fn get_audit_handler(State(store): Store) -> Json<Value> {
    Json(store.audit_log().await)
}

async fn append_audit_handler(
    State(store): Store,
    Json(entry): Json<Map<String, Value>>,
) -> (StatusCode, Json<Value>) {
    stored(store.append(entry).await)
}

async fn log_prompt_handler(
    State(store): Store,
    Json(body): Json<ContentBody>,
) -> (StatusCode, Json<Value>) {
    stored(store.log_prompt(body.content).await)
}

async fn log_response_handler(
    State(store): Store,
    Json(body): Json<ContentBody>,
) -> (StatusCode, Json<Value>) {
    stored(store.log_response(body.content).await)
}

async fn readme_handler(State(store): Store) -> Response {
    match store.readme().await {
        Some(readme) => (
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            readme,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "# README not found").into_response(),
    }
}

async fn structure_handler(State(store): Store) -> (StatusCode, Json<Value>) {
    let tree = store.structure().await.and_then(|tree| {
        serde_json::to_value(tree).map_err(|e| format!("Failed to encode tree: {}", e))
    });
    match tree {
        Ok(tree) => (StatusCode::OK, Json(tree)),
        Err(e) => {
            log::error!("Structure snapshot failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e })),
            )
        }
    }
}
