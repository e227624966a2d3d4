use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use al_core::core::{
    validate_annotation, Annotation, AnnotationId, AuthService, AutoLabelError, DocumentId,
    LabelId, NewAnnotation, ProjectId, Span, UserId, ValidationError,
};
use al_store::NewProject;

use crate::handler::{parse_body, ApiError, AppState};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MemberRequest {
    user: UserId,
}

#[derive(Debug, Deserialize)]
struct TextRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentFilter {
    pub is_checked: Option<bool>,
    /// Case-insensitive substring of the document text.
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnnotationRequest {
    label: LabelId,
    start_offset: Option<usize>,
    end_offset: Option<usize>,
}

impl AnnotationRequest {
    fn into_new(self, text_len: usize) -> Result<NewAnnotation, ValidationError> {
        let span = match (self.start_offset, self.end_offset) {
            (Some(start), Some(end)) => Some(Span::new(start, end, text_len)?),
            (None, None) => None,
            _ => return Err(ValidationError::MissingSpan),
        };
        Ok(NewAnnotation {
            label: self.label,
            span,
        })
    }
}

/// Partial update; omitted fields keep their stored value. Offsets are
/// replaced together or not at all.
#[derive(Debug, Deserialize)]
struct AnnotationPatch {
    label: Option<LabelId>,
    start_offset: Option<usize>,
    end_offset: Option<usize>,
}

impl AnnotationPatch {
    fn apply(
        self,
        existing: &Annotation,
        text_len: usize,
    ) -> Result<NewAnnotation, ValidationError> {
        let span = match (self.start_offset, self.end_offset) {
            (Some(start), Some(end)) => Some(Span::new(start, end, text_len)?),
            (None, None) => existing.span,
            _ => return Err(ValidationError::MissingSpan),
        };
        Ok(NewAnnotation {
            label: self.label.unwrap_or(existing.label),
            span,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AnnotationView {
    pub id: AnnotationId,
    pub document: DocumentId,
    pub user: UserId,
    pub label: LabelId,
    pub start_offset: Option<usize>,
    pub end_offset: Option<usize>,
}

impl From<Annotation> for AnnotationView {
    fn from(a: Annotation) -> Self {
        Self {
            id: a.id,
            document: a.document,
            user: a.user,
            label: a.label,
            start_offset: a.span.map(|s| s.start()),
            end_offset: a.span.map(|s| s.end()),
        }
    }
}

pub(crate) fn views(annotations: Vec<Annotation>) -> Vec<AnnotationView> {
    annotations.into_iter().map(AnnotationView::from).collect()
}

// ---------------------------------------------------------------------------
// Projects and members
// ---------------------------------------------------------------------------

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    AuthService::require_admin(&user)?;
    let new: NewProject = parse_body(&body)?;

    let project = state
        .blocking(move |store| {
            let project = store.create_project(&new)?;
            store.add_member(project.id, &user.id)?;
            Ok(project)
        })
        .await?;
    tracing::info!(project = %project.id, project_type = %project.project_type, "project created");
    Ok((StatusCode::CREATED, Json(project)).into_response())
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let projects = state
        .blocking(move |store| Ok(store.list_projects_for_user(&user.id)?))
        .await?;
    Ok(Json(projects).into_response())
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    Ok(Json(project).into_response())
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    AuthService::require_admin(&user)?;
    let project = ProjectId::new(project);

    state.jobs.cancel(project);
    let deleted = state
        .blocking(move |store| Ok(store.delete_project(project)?))
        .await?;
    if !deleted {
        return Err(AutoLabelError::NotFound(format!("project {project}")).into());
    }
    state.models.evict(project).await;
    tracing::info!(project = %project, "project deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let members = state
        .blocking(move |store| Ok(store.list_members(project.id)?))
        .await?;
    Ok(Json(members).into_response())
}

pub async fn add_member(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    AuthService::require_admin(&user)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let request: MemberRequest = parse_body(&body)?;

    let members = state
        .blocking(move |store| {
            store.add_member(project.id, &request.user)?;
            Ok(store.list_members(project.id)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(members)).into_response())
}

pub async fn progress(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let progress = state
        .blocking(move |store| Ok(store.progress(project.id, &user.id)?))
        .await?;
    Ok(Json(progress).into_response())
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let stats = state
        .blocking(move |store| Ok(store.project_stats(project.id)?))
        .await?;
    Ok(Json(stats).into_response())
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

pub async fn list_labels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let labels = state
        .blocking(move |store| {
            let labels = store.project_labels(project.id)?;
            Ok(labels.iter().cloned().collect::<Vec<_>>())
        })
        .await?;
    Ok(Json(labels).into_response())
}

pub async fn create_label(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    AuthService::require_admin(&user)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let request: TextRequest = parse_body(&body)?;
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("label text must not be empty".to_owned()));
    }

    let label = state
        .blocking(move |store| Ok(store.create_label(project.id, request.text.trim())?))
        .await?;
    Ok((StatusCode::CREATED, Json(label)).into_response())
}

pub async fn get_label(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, label)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let label = LabelId::new(label);

    let label = state
        .blocking(move |store| {
            store
                .find_label(project.id, label)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("label {label}")))
        })
        .await?;
    Ok(Json(label).into_response())
}

/// Renames a label; label texts stay unique per project.
pub async fn update_label(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, label)): Path<(i64, i64)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    AuthService::require_admin(&user)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let label = LabelId::new(label);
    let request: TextRequest = parse_body(&body)?;
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("label text must not be empty".to_owned()));
    }

    let label = state
        .blocking(move |store| {
            store
                .rename_label(project.id, label, request.text.trim())?
                .ok_or_else(|| AutoLabelError::NotFound(format!("label {label}")))
        })
        .await?;
    Ok(Json(label).into_response())
}

pub async fn delete_label(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, label)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    AuthService::require_admin(&user)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let label = LabelId::new(label);

    let deleted = state
        .blocking(move |store| Ok(store.delete_label(project.id, label)?))
        .await?;
    if !deleted {
        return Err(AutoLabelError::NotFound(format!("label {label}")).into());
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// `?is_checked=true` lists documents the caller has annotated, `false` the
/// ones still waiting; `?q=` keeps documents whose text contains it. No
/// filter lists all.
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
    Query(filter): Query<DocumentFilter>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let documents = state
        .blocking(move |store| {
            let text = filter.q.as_deref().filter(|q| !q.is_empty());
            Ok(store.search_documents(project.id, &user.id, filter.is_checked, text)?)
        })
        .await?;
    Ok(Json(documents).into_response())
}

pub async fn create_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project): Path<i64>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    AuthService::require_admin(&user)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let request: TextRequest = parse_body(&body)?;

    let document = state
        .blocking(move |store| Ok(store.create_document(project.id, &request.text)?))
        .await?;
    Ok((StatusCode::CREATED, Json(document)).into_response())
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let document = DocumentId::new(document);

    let document = state
        .blocking(move |store| {
            store
                .find_document(project.id, document)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("document {document}")))
        })
        .await?;
    Ok(Json(document).into_response())
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    AuthService::require_admin(&user)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let document = DocumentId::new(document);

    let deleted = state
        .blocking(move |store| Ok(store.delete_document(project.id, document)?))
        .await?;
    if !deleted {
        return Err(AutoLabelError::NotFound(format!("document {document}")).into());
    }
    let forgotten = state.models.forget_document(project.id, document).await?;
    tracing::info!(project = %project.id, document = %document, forgotten, "document deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// The caller's own annotations of the document.
pub async fn list_annotations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let document = DocumentId::new(document);

    let annotations = state
        .blocking(move |store| {
            let document = store
                .find_document(project.id, document)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("document {document}")))?;
            Ok(store.document_annotations(document.id, Some(&user.id))?)
        })
        .await?;
    Ok(Json(views(annotations)).into_response())
}

pub async fn create_annotation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document)): Path<(i64, i64)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let document = DocumentId::new(document);
    let request: AnnotationRequest = parse_body(&body)?;

    let annotation = state
        .blocking(move |store| {
            let document = store
                .find_document(project.id, document)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("document {document}")))?;
            let labels = store.project_labels(project.id)?;
            let text_len = document.char_len();
            let new = request.into_new(text_len)?;
            validate_annotation(project.project_type, text_len, &labels, &new)?;
            Ok(store.create_annotation(document.id, &user.id, &new)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(AnnotationView::from(annotation))).into_response())
}

pub async fn get_annotation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document, annotation)): Path<(i64, i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let document = DocumentId::new(document);
    let annotation = AnnotationId::new(annotation);

    let annotation = state
        .blocking(move |store| {
            store
                .find_document(project.id, document)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("document {document}")))?;
            let existing = store
                .find_annotation(document, annotation)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("annotation {annotation}")))?;
            AuthService::require_owner(&existing, &user)?;
            Ok(existing)
        })
        .await?;
    Ok(Json(AnnotationView::from(annotation)).into_response())
}

/// Changes label or span of the caller's own annotation, validated like a
/// new one.
pub async fn update_annotation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document, annotation)): Path<(i64, i64, i64)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let document = DocumentId::new(document);
    let annotation = AnnotationId::new(annotation);
    let patch: AnnotationPatch = parse_body(&body)?;

    let updated = state
        .blocking(move |store| {
            let document = store
                .find_document(project.id, document)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("document {document}")))?;
            let existing = store
                .find_annotation(document.id, annotation)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("annotation {annotation}")))?;
            AuthService::require_owner(&existing, &user)?;

            let labels = store.project_labels(project.id)?;
            let text_len = document.char_len();
            let new = patch.apply(&existing, text_len)?;
            validate_annotation(project.project_type, text_len, &labels, &new)?;
            store
                .update_annotation(document.id, existing.id, &user.id, &new)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("annotation {annotation}")))
        })
        .await?;
    Ok(Json(AnnotationView::from(updated)).into_response())
}

pub async fn delete_annotation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((project, document, annotation)): Path<(i64, i64, i64)>,
) -> Result<Response, ApiError> {
    let user = state.authenticate(&headers)?;
    let project = state.member_project(&user, ProjectId::new(project)).await?;
    let document = DocumentId::new(document);
    let annotation = AnnotationId::new(annotation);

    state
        .blocking(move |store| {
            store
                .find_document(project.id, document)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("document {document}")))?;
            let existing = store
                .find_annotation(document, annotation)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("annotation {annotation}")))?;
            AuthService::require_owner(&existing, &user)?;
            store.delete_annotation(existing.id, &user.id)?;
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
