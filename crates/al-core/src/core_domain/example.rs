use std::fmt;

use crate::core::{
    Annotation, Document, DocumentId, LabelId, LabelSet, ProjectType, Span, UserId,
    ValidationError,
};

// ---------------------------------------------------------------------------
// ExampleKey: identity of a training example inside a model's memory
// ---------------------------------------------------------------------------

/// One example exists per `(document, user)`; retraining with the same key
/// replaces the previous example.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExampleKey {
    pub document: DocumentId,
    pub user: UserId,
}

impl fmt::Display for ExampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "example for document {} by {}", self.document, self.user)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExampleAnnotation {
    pub label: LabelId,
    pub span: Option<Span>,
}

// ---------------------------------------------------------------------------
// TrainingExample: (text, annotations) unit fed to model training
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingExample {
    pub key: ExampleKey,
    pub text: String,
    pub annotations: Vec<ExampleAnnotation>,
}

impl TrainingExample {
    /// Builds the example for one user's annotations on `document`.
    ///
    /// Sequence labeling keeps `(label, span)` pairs and requires every span
    /// to fit the text. Classification keeps one entry per distinct label and
    /// drops offsets. An empty annotation list is a valid example.
    pub fn from_annotations(
        project_type: ProjectType,
        document: &Document,
        user: &UserId,
        annotations: &[Annotation],
        labels: &LabelSet,
    ) -> Result<Self, ValidationError> {
        let text_len = document.char_len();
        let mut entries: Vec<ExampleAnnotation> = Vec::with_capacity(annotations.len());

        for ann in annotations.iter().filter(|a| &a.user == user) {
            if !labels.contains(ann.label) {
                return Err(ValidationError::UnknownLabel { label: ann.label });
            }

            if project_type.uses_spans() {
                let span = ann.span.ok_or(ValidationError::MissingSpan)?;
                if !span.fits(text_len) {
                    return Err(ValidationError::InvalidSpan {
                        start: span.start(),
                        end: span.end(),
                        len: text_len,
                    });
                }
                entries.push(ExampleAnnotation {
                    label: ann.label,
                    span: Some(span),
                });
            } else if !entries.iter().any(|e| e.label == ann.label) {
                entries.push(ExampleAnnotation {
                    label: ann.label,
                    span: None,
                });
            }
        }

        entries.sort_by_key(|e| (e.span, e.label));

        Ok(Self {
            key: ExampleKey {
                document: document.id,
                user: user.clone(),
            },
            text: document.text.clone(),
            annotations: entries,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.annotations.iter().map(|a| a.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AnnotationId, Label, ProjectId};

    fn doc(text: &str) -> Document {
        Document {
            id: DocumentId::new(10),
            project: ProjectId::new(1),
            text: text.to_owned(),
        }
    }

    fn labels() -> LabelSet {
        LabelSet::new(vec![
            Label {
                id: LabelId::new(1),
                project: ProjectId::new(1),
                text: "ANIMAL".to_owned(),
            },
            Label {
                id: LabelId::new(2),
                project: ProjectId::new(1),
                text: "PLACE".to_owned(),
            },
        ])
    }

    fn ann(id: i64, user: &str, label: i64, span: Option<(usize, usize)>) -> Annotation {
        Annotation {
            id: AnnotationId::new(id),
            document: DocumentId::new(10),
            user: UserId::new(user),
            label: LabelId::new(label),
            span: span.map(|(s, e)| Span::ordered(s, e).unwrap()),
        }
    }

    #[test]
    fn test_sequence_example_filters_to_user() {
        let document = doc("Do you like horses?");
        let anns = vec![
            ann(1, "alice", 1, Some((12, 18))),
            ann(2, "bob", 2, Some((0, 2))),
        ];
        let example = TrainingExample::from_annotations(
            ProjectType::SequenceLabeling,
            &document,
            &UserId::new("alice"),
            &anns,
            &labels(),
        )
        .unwrap();

        assert_eq!(example.key.user.as_str(), "alice");
        assert_eq!(example.annotations.len(), 1);
        assert_eq!(example.annotations[0].label, LabelId::new(1));
        assert_eq!(example.annotations[0].span.unwrap().slice(&example.text), "horses");
    }

    #[test]
    fn test_sequence_example_rejects_out_of_bounds() {
        let document = doc("short");
        let anns = vec![ann(1, "alice", 1, Some((2, 9)))];
        let err = TrainingExample::from_annotations(
            ProjectType::SequenceLabeling,
            &document,
            &UserId::new("alice"),
            &anns,
            &labels(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSpan { len: 5, .. }));
    }

    #[test]
    fn test_sequence_example_requires_span() {
        let document = doc("horses");
        let anns = vec![ann(1, "alice", 1, None)];
        let err = TrainingExample::from_annotations(
            ProjectType::SequenceLabeling,
            &document,
            &UserId::new("alice"),
            &anns,
            &labels(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingSpan);
    }

    #[test]
    fn test_classification_example_dedups_labels() {
        let document = doc("a nice day at the beach");
        let anns = vec![
            ann(1, "alice", 2, None),
            ann(2, "alice", 2, None),
            ann(3, "alice", 1, None),
        ];
        let example = TrainingExample::from_annotations(
            ProjectType::DocumentClassification,
            &document,
            &UserId::new("alice"),
            &anns,
            &labels(),
        )
        .unwrap();
        let labels: Vec<LabelId> = example.labels().collect();
        assert_eq!(labels, vec![LabelId::new(1), LabelId::new(2)]);
    }

    #[test]
    fn test_unknown_label_rejected() {
        let document = doc("horses");
        let anns = vec![ann(1, "alice", 77, None)];
        let err = TrainingExample::from_annotations(
            ProjectType::DocumentClassification,
            &document,
            &UserId::new("alice"),
            &anns,
            &labels(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownLabel { .. }));
    }

    #[test]
    fn test_no_annotations_builds_empty_example() {
        let document = doc("Do they bite?");
        let example = TrainingExample::from_annotations(
            ProjectType::SequenceLabeling,
            &document,
            &UserId::new("alice"),
            &[],
            &labels(),
        )
        .unwrap();
        assert!(example.annotations.is_empty());
        assert_eq!(example.text, "Do they bite?");
    }
}
