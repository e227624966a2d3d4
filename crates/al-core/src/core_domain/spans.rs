use serde::Serialize;

use crate::core::{LabelId, LabelSet, NewAnnotation, ProjectType, ValidationError};

// ---------------------------------------------------------------------------
// Span: half-open character range into a document text
// ---------------------------------------------------------------------------

/// `start < end` always holds; `end <= len(text)` holds for the text the span
/// was validated against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    /// Validates `0 <= start < end <= text_len` (character offsets).
    pub fn new(start: usize, end: usize, text_len: usize) -> Result<Self, ValidationError> {
        if start >= end || end > text_len {
            return Err(ValidationError::InvalidSpan {
                start,
                end,
                len: text_len,
            });
        }
        Ok(Self { start, end })
    }

    /// Rebuilds a span read back from storage, where the text bound was
    /// checked on insert.
    pub fn ordered(start: usize, end: usize) -> Result<Self, ValidationError> {
        Self::new(start, end, end)
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn width(&self) -> usize {
        self.end - self.start
    }

    pub fn fits(&self, text_len: usize) -> bool {
        self.end <= text_len
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The covered characters of `text`.
    pub fn slice(&self, text: &str) -> String {
        text.chars().skip(self.start).take(self.width()).collect()
    }
}

/// One labeled span emitted by a sequence-labeling model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PredictedSpan {
    pub label: LabelId,
    pub span: Span,
}

// ---------------------------------------------------------------------------
// normalize_spans: bounds, ordering and disjointness for model output
// ---------------------------------------------------------------------------

/// Drops spans outside `text_len`, orders by `(start, end)` ascending and
/// keeps a span only if it does not overlap an earlier kept one.
pub fn normalize_spans(mut spans: Vec<PredictedSpan>, text_len: usize) -> Vec<PredictedSpan> {
    spans.retain(|s| s.span.fits(text_len));
    spans.sort_by_key(|s| (s.span.start(), s.span.end(), s.label));

    let mut kept: Vec<PredictedSpan> = Vec::with_capacity(spans.len());
    for candidate in spans {
        match kept.last() {
            Some(prev) if prev.span.overlaps(&candidate.span) => {}
            _ => kept.push(candidate),
        }
    }
    kept
}

// ---------------------------------------------------------------------------
// validate_annotation: shape checks shared by the API layer and training
// ---------------------------------------------------------------------------

pub fn validate_annotation(
    project_type: ProjectType,
    text_len: usize,
    labels: &LabelSet,
    annotation: &NewAnnotation,
) -> Result<(), ValidationError> {
    if !labels.contains(annotation.label) {
        return Err(ValidationError::UnknownLabel {
            label: annotation.label,
        });
    }

    match (project_type.uses_spans(), annotation.span) {
        (true, None) => Err(ValidationError::MissingSpan),
        (true, Some(span)) if !span.fits(text_len) => Err(ValidationError::InvalidSpan {
            start: span.start(),
            end: span.end(),
            len: text_len,
        }),
        (false, Some(_)) => Err(ValidationError::UnexpectedSpan),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
