use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

use al_core::core::{AutoLabelError, DocumentId, PredictionService, ProjectId};

use crate::handler::{ApiError, AppState};
use crate::projects::views;
use crate::training;

// ---------------------------------------------------------------------------
// Auto-labeling endpoints
// ---------------------------------------------------------------------------

/// Predicts annotations for one document with the published model.
///
/// Project types without a model adapter answer `[]`.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let document = DocumentId::new(document);
    let adapter = state.models.current(&project).await;

    let prediction = state
        .blocking(move |store| {
            PredictionService::new(store).predict_for_document(
                adapter.as_deref(),
                &project,
                document,
            )
        })
        .await?;
    tracing::debug!(document = %document, empty = prediction.is_empty(), "prediction served");
    Ok(Json(prediction.to_response()).into_response())
}

/// Trains the project's model on the caller's annotations of the document.
pub async fn retrain(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;

    let outcome =
        training::retrain_document(&state, project, DocumentId::new(document), user.id).await?;
    Ok(Json(outcome).into_response())
}

/// Replaces the caller's annotations of the document with the current
/// prediction and returns what was written.
///
/// Project types without a model adapter are rejected, and so is an empty
/// prediction; neither touches the stored annotations.
pub async fn accept(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let document = DocumentId::new(document);
    let adapter = state
        .models
        .current(&project)
        .await
        .ok_or(AutoLabelError::UnsupportedProjectType(project.project_type))?;

    let written = state
        .blocking(move |store| {
            let service = PredictionService::new(store);
            let prediction =
                service.predict_for_document(Some(adapter.as_ref()), &project, document)?;
            service.accept_prediction(&project, document, &user.id, &prediction)
        })
        .await?;
    tracing::info!(document = %document, annotations = written.len(), "prediction accepted");
    Ok(Json(views(written)).into_response())
}

/// Retrains the project's model from scratch on every stored annotation.
pub async fn rebuild(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;

    let outcome = training::rebuild_project(&state, project).await?;
    Ok(Json(outcome).into_response())
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;

    let cancelled = state.jobs.cancel(project.id);
    if cancelled > 0 {
        tracing::warn!(project = %project.id, cancelled, "training cancelled on request");
    }
    Ok(Json(serde_json::json!({ "cancelled": cancelled })).into_response())
}
