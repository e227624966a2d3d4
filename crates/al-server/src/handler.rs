use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;

use al_core::core::{
    AdapterRegistry, ApiKey, AuthError, AuthService, AutoLabelError, Project, ProjectId,
    RandomSource, StoreError, TrainingError, UserInfo, ValidationError,
};
use al_store::{DbError, SqliteAnnotationStore};

use crate::models::ModelPool;
use crate::training::{task_failure, TrainingJobs};

// ---------------------------------------------------------------------------
// AppState: shared state for all handlers
// ---------------------------------------------------------------------------

pub struct AppState {
    pub auth: AuthService,
    pub store: Arc<SqliteAnnotationStore>,
    pub registry: Arc<AdapterRegistry>,
    pub models: ModelPool,
    pub jobs: TrainingJobs,
}

impl AppState {
    pub fn new(auth: AuthService, store: SqliteAnnotationStore, rng: Arc<dyn RandomSource>) -> Self {
        let registry = Arc::new(AdapterRegistry::with_defaults(rng));
        Self {
            auth,
            store: Arc::new(store),
            models: ModelPool::new(Arc::clone(&registry)),
            registry,
            jobs: TrainingJobs::new(),
        }
    }

    pub(crate) fn authenticate(&self, headers: &HeaderMap) -> Result<UserInfo, ApiError> {
        let api_key = extract_api_key(headers)?;
        let user = self.auth.validate(&api_key)?;
        Ok(user.clone())
    }

    /// Runs `f` against the store on the blocking pool.
    pub(crate) async fn blocking<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteAnnotationStore) -> Result<T, AutoLabelError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(task_failure)?;
        Ok(result?)
    }

    /// Loads a project the caller may work in. Membership is checked first so
    /// non-members cannot tell which project ids exist.
    pub(crate) async fn member_project(
        &self,
        user: &UserInfo,
        project: ProjectId,
    ) -> Result<Project, ApiError> {
        let user = user.clone();
        self.blocking(move |store| {
            AuthService::require_member(store, project, &user)?;
            store
                .find_project(project)?
                .ok_or_else(|| AutoLabelError::NotFound(format!("project {project}")))
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// ApiError: everything a handler can fail with
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Domain(AutoLabelError),
    BadRequest(String),
}

impl From<AutoLabelError> for ApiError {
    fn from(err: AutoLabelError) -> Self {
        Self::Domain(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self::Domain(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Domain(err) => error_to_response(err),
            Self::BadRequest(message) => {
                error_body(StatusCode::BAD_REQUEST, "invalid_request_error", message)
            }
        }
    }
}

pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))
}

pub(crate) fn extract_api_key(headers: &HeaderMap) -> Result<ApiKey, AuthError> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::InvalidApiKey)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidApiKey)?;

    Ok(ApiKey::new(token))
}

// ---------------------------------------------------------------------------
// Error → HTTP response
// ---------------------------------------------------------------------------

pub fn error_to_response(err: AutoLabelError) -> Response {
    let (status, error_type) = match &err {
        AutoLabelError::Auth(AuthError::InvalidApiKey) => {
            (StatusCode::UNAUTHORIZED, "authentication_error")
        }
        AutoLabelError::Auth(_) => (StatusCode::FORBIDDEN, "permission_error"),
        AutoLabelError::Validation(
            ValidationError::EmptyLabelSet { .. }
            | ValidationError::EmptyCorpus { .. }
            | ValidationError::EmptyPrediction { .. },
        ) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
        AutoLabelError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
        AutoLabelError::UnsupportedProjectType(_) => {
            (StatusCode::BAD_REQUEST, "unsupported_project_type")
        }
        AutoLabelError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error"),
        AutoLabelError::Training(TrainingError::Cancelled) => {
            (StatusCode::CONFLICT, "training_cancelled")
        }
        AutoLabelError::Training(_) => (StatusCode::UNPROCESSABLE_ENTITY, "training_error"),
        AutoLabelError::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, "conflict_error"),
        AutoLabelError::Store(StoreError::Backend(_)) => {
            tracing::error!(error = %err, "store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
        }
    };

    error_body(status, error_type, err.to_string())
}

fn error_body(status: StatusCode, error_type: &str, message: String) -> Response {
    let body = serde_json::json!({
        "error": {
            "message": message,
            "type": error_type,
            "code": status.as_u16(),
        }
    });

    (status, axum::Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use al_core::core::{AnnotationId, DocumentId, ExampleKey, LabelId, ProjectType, UserId};
    use axum::http::HeaderValue;

    fn status_of(err: AutoLabelError) -> StatusCode {
        error_to_response(err).status()
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer al-sk-alice0000000000000000"),
        );
        let key = extract_api_key(&headers).unwrap();
        assert_eq!(key.as_str(), "al-sk-alice0000000000000000");
    }

    #[test]
    fn test_missing_or_malformed_header() {
        assert!(extract_api_key(&HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(matches!(
            extract_api_key(&headers),
            Err(AuthError::InvalidApiKey)
        ));
    }

    #[test]
    fn test_status_mapping() {
        let user = UserId::new("bob");
        assert_eq!(
            status_of(AuthError::InvalidApiKey.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AuthError::AdminRequired { user: user.clone() }.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ValidationError::MissingSpan.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                ValidationError::EmptyLabelSet {
                    project: ProjectId::new(1)
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(
                ValidationError::EmptyPrediction {
                    document: DocumentId::new(3)
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(
                ValidationError::OverlappingSpan {
                    start: 0,
                    end: 8,
                    existing: AnnotationId::new(2),
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AutoLabelError::UnsupportedProjectType(ProjectType::Seq2seq)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AutoLabelError::NotFound("document 9".to_owned())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(TrainingError::Cancelled.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                TrainingError::UnknownLabel {
                    key: ExampleKey {
                        document: DocumentId::new(1),
                        user,
                    },
                    label: LabelId::new(4),
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(StoreError::Conflict("label exists".to_owned()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(StoreError::Backend("disk full".to_owned()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bad_request_body() {
        let err = parse_body::<serde_json::Value>(b"{not json").unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
