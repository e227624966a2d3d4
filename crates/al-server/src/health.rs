use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::handler::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub models_loaded: usize,
    pub models_trained: usize,
    pub training_jobs: usize,
}

/// Liveness plus a summary of the in-memory model pool. Unauthenticated.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        models_loaded: state.models.len().await,
        models_trained: state.models.trained().await,
        training_jobs: state.jobs.total_running(),
    })
}
