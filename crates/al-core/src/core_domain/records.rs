use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{AnnotationId, DocumentId, LabelId, ProjectId, Span, UserId};

// ---------------------------------------------------------------------------
// ProjectType: decides the adapter strategy and the valid annotation shape
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectType {
    DocumentClassification,
    SequenceLabeling,
    Seq2seq,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentClassification => "DocumentClassification",
            Self::SequenceLabeling => "SequenceLabeling",
            Self::Seq2seq => "Seq2seq",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DocumentClassification" => Some(Self::DocumentClassification),
            "SequenceLabeling" => Some(Self::SequenceLabeling),
            "Seq2seq" => Some(Self::Seq2seq),
            _ => None,
        }
    }

    /// Whether annotations of this project type carry character offsets.
    pub fn uses_spans(&self) -> bool {
        matches!(self, Self::SequenceLabeling)
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Snapshot records handed to the core by the persistence layer
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub project_type: ProjectType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub project: ProjectId,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub project: ProjectId,
    pub text: String,
}

impl Document {
    /// Length in characters, the unit every offset is expressed in.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub document: DocumentId,
    pub user: UserId,
    pub label: LabelId,
    pub span: Option<Span>,
}

/// An annotation about to be written: the store assigns id, document and user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAnnotation {
    pub label: LabelId,
    pub span: Option<Span>,
}

// ---------------------------------------------------------------------------
// LabelSet: a project's labels, ordered by id
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    pub fn new(mut labels: Vec<Label>) -> Self {
        labels.sort_by_key(|l| l.id);
        labels.dedup_by_key(|l| l.id);
        Self { labels }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn contains(&self, id: LabelId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: LabelId) -> Option<&Label> {
        self.labels
            .binary_search_by_key(&id, |l| l.id)
            .ok()
            .map(|idx| &self.labels[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.labels.iter().map(|l| l.id)
    }
}
