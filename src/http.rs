// src/http.rs

//! HTTP layer: maps routes onto the [`JobManager`] facade.
//!
//! Every route answers 200; errors travel inside the JSON body as
//! `{"error": ..}`, the same way the job manager reports them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::errors::CosiError;
use crate::jobs::{JobListing, JobManager};
use crate::services;
use crate::types::JobRequest;

type Params = Query<HashMap<String, String>>;

fn missing_argument(name: &str) -> Response {
    Json(json!({ "error": format!("no '{name}' argument in request") })).into_response()
}

async fn handle_index() -> Json<Value> {
    Json(json!({ "services": services::names() }))
}

async fn run_payload(manager: &JobManager, payload: Map<String, Value>) -> Json<Value> {
    match JobRequest::try_from(payload) {
        Ok(request) => {
            debug!(service = %request.service(), "incoming request");
            Json(manager.run(request).await)
        }
        Err(err) => Json(err.envelope()),
    }
}

async fn handle_service_get(State(manager): State<Arc<JobManager>>, Query(params): Params) -> Json<Value> {
    let payload = params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    run_payload(&manager, payload).await
}

/// Malformed bodies get an error envelope, not a rejection.
async fn handle_service_post(State(manager): State<Arc<JobManager>>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(payload)) => run_payload(&manager, payload).await,
        Ok(_) => Json(CosiError::MissingService.envelope()),
        Err(err) => Json(json!({ "error": format!("invalid request body: {err}") })),
    }
}

async fn handle_manage(State(manager): State<Arc<JobManager>>) -> Json<JobListing> {
    Json(manager.list())
}

async fn handle_terminate(State(manager): State<Arc<JobManager>>, Query(params): Params) -> Response {
    let Some(token) = params.get("id") else {
        return missing_argument("id");
    };
    let outcome = manager.kill(token);
    Json(json!({ "result": outcome.to_string() })).into_response()
}

async fn handle_log(State(manager): State<Arc<JobManager>>, Query(params): Params) -> Response {
    let Some(token) = params.get("id") else {
        return missing_argument("id");
    };
    match manager.get_log(token) {
        Ok(text) => text.into_response(),
        Err(err) => Json(err.envelope()).into_response(),
    }
}

async fn handle_info(State(manager): State<Arc<JobManager>>, Query(params): Params) -> Response {
    let Some(service) = params.get("service") else {
        return missing_argument("service");
    };
    match manager.get_info(service) {
        Ok(text) => text.into_response(),
        Err(err) => Json(err.envelope()).into_response(),
    }
}

/// Build the router over a shared job manager.
pub fn router(manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/service", get(handle_service_get).post(handle_service_post))
        .route("/manage", get(handle_manage))
        .route("/terminate", get(handle_terminate))
        .route("/log", get(handle_log))
        .route("/info", get(handle_info))
        .with_state(manager)
}

/// Serve the API on `bind_addr` until Ctrl+C (or SIGTERM on Unix).
pub async fn serve(manager: Arc<JobManager>, bind_addr: &str) -> Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "cosi listening (Ctrl+C/SIGTERM to stop)");
    axum::serve(listener, router(manager))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("cosi stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for Ctrl+C");
        }
    }
}
