use crate::core::{AnnotationId, DocumentId, ExampleKey, LabelId, ProjectId, ProjectType, UserId};

// ---------------------------------------------------------------------------
// Sub-error types
// ---------------------------------------------------------------------------

/// Input rejected before it reaches a model adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("span [{start}, {end}) is invalid for text of length {len}")]
    InvalidSpan { start: usize, end: usize, len: usize },
    #[error("label {label} is not defined in this project")]
    UnknownLabel { label: LabelId },
    #[error("sequence labeling annotations require start_offset and end_offset")]
    MissingSpan,
    #[error("document classification annotations must not carry offsets")]
    UnexpectedSpan,
    #[error("project {project} has no labels")]
    EmptyLabelSet { project: ProjectId },
    #[error("project {project} has no annotated documents")]
    EmptyCorpus { project: ProjectId },
    #[error("span [{start}, {end}) overlaps annotation {existing} by the same user")]
    OverlappingSpan {
        start: usize,
        end: usize,
        existing: AnnotationId,
    },
    #[error("prediction for document {document} is empty, nothing to accept")]
    EmptyPrediction { document: DocumentId },
}

/// Failure inside a model adapter; the adapter's state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrainingError {
    #[error("no training examples given")]
    NoExamples,
    #[error("label set is empty")]
    EmptyLabelSet,
    #[error("{key} references unknown label {label}")]
    UnknownLabel { key: ExampleKey, label: LabelId },
    #[error("{key} has span [{start}, {end}) outside text of length {len}")]
    OutOfBounds {
        key: ExampleKey,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("{key} is incompatible with this model: {reason}")]
    IncompatibleExample { key: ExampleKey, reason: String },
    #[error("training was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("user {user} is not a member of project {project}")]
    NotProjectMember { user: UserId, project: ProjectId },
    #[error("user {user} is not an administrator")]
    AdminRequired { user: UserId },
    #[error("annotation {annotation} is not owned by user {user}")]
    NotAnnotationOwner {
        annotation: AnnotationId,
        user: UserId,
    },
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AutoLabelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error("project type {0} has no registered model adapter")]
    UnsupportedProjectType(ProjectType),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0} not found")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
