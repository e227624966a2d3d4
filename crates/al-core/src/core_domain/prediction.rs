use serde::Serialize;

use crate::core::{
    normalize_spans, Annotation, AnnotationStore, AutoLabelError, DocumentId, LabelId, LabelSet,
    ModelAdapter, NewAnnotation, PredictedSpan, Project, UserId, ValidationError,
};

// ---------------------------------------------------------------------------
// Prediction: transient model output, never written back implicitly
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prediction {
    Class(LabelId),
    Spans(Vec<PredictedSpan>),
    Empty,
}

impl Prediction {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Class(_) => false,
            Self::Spans(spans) => spans.is_empty(),
            Self::Empty => true,
        }
    }

    /// The annotations a user would hold after accepting this prediction.
    pub fn to_annotations(&self) -> Vec<NewAnnotation> {
        match self {
            Self::Class(label) => vec![NewAnnotation {
                label: *label,
                span: None,
            }],
            Self::Spans(spans) => spans
                .iter()
                .map(|s| NewAnnotation {
                    label: s.label,
                    span: Some(s.span),
                })
                .collect(),
            Self::Empty => Vec::new(),
        }
    }

    pub fn to_response(&self) -> PredictionResponse {
        match self {
            Self::Class(label) => PredictionResponse::Class { label: *label },
            Self::Spans(spans) => PredictionResponse::Spans(
                spans
                    .iter()
                    .map(|s| SpanResponse {
                        label: s.label,
                        start_offset: s.span.start(),
                        end_offset: s.span.end(),
                    })
                    .collect(),
            ),
            Self::Empty => PredictionResponse::Spans(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes: {"label": id} | [{"label", "start_offset", "end_offset"}] | []
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Class { label: LabelId },
    Spans(Vec<SpanResponse>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpanResponse {
    pub label: LabelId,
    pub start_offset: usize,
    pub end_offset: usize,
}

// ---------------------------------------------------------------------------
// PredictionService: per-document prediction and explicit acceptance
// ---------------------------------------------------------------------------

pub struct PredictionService<'a> {
    store: &'a dyn AnnotationStore,
}

impl<'a> PredictionService<'a> {
    pub fn new(store: &'a dyn AnnotationStore) -> Self {
        Self { store }
    }

    /// Predicts annotations for `document`.
    ///
    /// Without an adapter for the project's type the result is
    /// `Prediction::Empty`. Model output is reconciled with the current label
    /// set and text: stale labels are dropped, spans are bounded, ordered by
    /// `(start, end)` and made disjoint.
    pub fn predict_for_document(
        &self,
        adapter: Option<&dyn ModelAdapter>,
        project: &Project,
        document: DocumentId,
    ) -> Result<Prediction, AutoLabelError> {
        let document = self
            .store
            .get_document(project.id, document)?
            .ok_or_else(|| AutoLabelError::NotFound(format!("document {document}")))?;

        let adapter = match adapter {
            Some(a) if a.project_type() == project.project_type => a,
            _ => return Ok(Prediction::Empty),
        };

        let labels = self.store.list_labels(project.id)?;
        let raw = adapter.predict(&document.text);
        Ok(reconcile(raw, &labels, document.char_len()))
    }

    /// Replaces `user`'s annotations on `document` with `prediction`.
    ///
    /// The prediction is reconciled again so a stale result can never write
    /// an out-of-bounds span or a deleted label. A prediction that is empty
    /// after reconciling is rejected and the stored annotations stay as they
    /// are.
    pub fn accept_prediction(
        &self,
        project: &Project,
        document: DocumentId,
        user: &UserId,
        prediction: &Prediction,
    ) -> Result<Vec<Annotation>, AutoLabelError> {
        let document = self
            .store
            .get_document(project.id, document)?
            .ok_or_else(|| AutoLabelError::NotFound(format!("document {document}")))?;
        let labels = self.store.list_labels(project.id)?;

        match (prediction, project.project_type.uses_spans()) {
            (Prediction::Class(_), true) => return Err(ValidationError::MissingSpan.into()),
            (Prediction::Spans(spans), false) if !spans.is_empty() => {
                return Err(ValidationError::UnexpectedSpan.into())
            }
            _ => {}
        }

        let prediction = reconcile(prediction.clone(), &labels, document.char_len());
        if prediction.is_empty() {
            return Err(ValidationError::EmptyPrediction {
                document: document.id,
            }
            .into());
        }
        let written =
            self.store
                .replace_annotations(document.id, user, &prediction.to_annotations())?;
        Ok(written)
    }
}

fn reconcile(raw: Prediction, labels: &LabelSet, text_len: usize) -> Prediction {
    match raw {
        Prediction::Class(label) if labels.contains(label) => Prediction::Class(label),
        Prediction::Class(_) | Prediction::Empty => Prediction::Empty,
        Prediction::Spans(spans) => {
            let known: Vec<PredictedSpan> = spans
                .into_iter()
                .filter(|s| labels.contains(s.label))
                .collect();
            Prediction::Spans(normalize_spans(known, text_len))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
