//! Shipped model adapters.
//!
//! Both adapters memorise every `(document, user)` example they have been
//! trained with and refit a small deterministic learner from that memory on
//! each `train` call and whenever a document is forgotten. Fitting happens on
//! a candidate; the adapter's state is replaced only once validation, fitting
//! and scoring all succeeded.

mod classification;
mod evaluation;
mod sequence;

pub use classification::NaiveBayes;
pub use evaluation::{HOLDOUT_FRACTION, HOLDOUT_MIN_EXAMPLES};
pub use sequence::Gazetteer;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::{
    DocumentId, ExampleKey, LabelSet, ModelAdapter, Prediction, ProjectType, QualityScore,
    RandomSource, TrainingError, TrainingExample,
};

pub type ClassificationAdapter = MemoryAdapter<NaiveBayes>;
pub type SequenceLabelingAdapter = MemoryAdapter<Gazetteer>;

// ---------------------------------------------------------------------------
// Learner: a model that can be refit from scratch on a set of examples
// ---------------------------------------------------------------------------

pub trait Learner: Clone + Send + Sync + 'static {
    const PROJECT_TYPE: ProjectType;

    /// Variant-specific shape checks run before anything is fitted.
    fn check(example: &TrainingExample) -> Result<(), TrainingError>;

    fn fit(examples: &[TrainingExample], labels: &LabelSet) -> Self;

    fn score(&self, examples: &[TrainingExample]) -> QualityScore;

    fn predict(&self, text: &str) -> Prediction;

    /// Output of a model that has never been trained.
    fn untrained() -> Prediction;
}

// ---------------------------------------------------------------------------
// ExampleMemory: memorised examples, upserted by key
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct ExampleMemory {
    examples: BTreeMap<ExampleKey, TrainingExample>,
}

impl ExampleMemory {
    fn upsert(&mut self, examples: &[TrainingExample]) {
        for example in examples {
            self.examples.insert(example.key.clone(), example.clone());
        }
    }

    /// Drops annotations whose label was deleted since they were memorised.
    fn prune(&mut self, labels: &LabelSet) {
        for example in self.examples.values_mut() {
            example.annotations.retain(|a| labels.contains(a.label));
        }
    }

    /// Returns how many examples were removed.
    fn remove_document(&mut self, document: DocumentId) -> usize {
        let before = self.examples.len();
        self.examples.retain(|key, _| key.document != document);
        before - self.examples.len()
    }

    fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }

    fn to_vec(&self) -> Vec<TrainingExample> {
        self.examples.values().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// MemoryAdapter: ModelAdapter over any Learner
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MemoryAdapter<L: Learner> {
    rng: Arc<dyn RandomSource>,
    memory: ExampleMemory,
    /// Label set of the last successful `train`, reused when refitting after
    /// a document is forgotten.
    labels: LabelSet,
    learner: Option<L>,
}

impl<L: Learner> MemoryAdapter<L> {
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self {
            rng,
            memory: ExampleMemory::default(),
            labels: LabelSet::default(),
            learner: None,
        }
    }

    pub fn learner(&self) -> Option<&L> {
        self.learner.as_ref()
    }
}

impl<L: Learner> ModelAdapter for MemoryAdapter<L> {
    fn project_type(&self) -> ProjectType {
        L::PROJECT_TYPE
    }

    fn train(
        &mut self,
        examples: &[TrainingExample],
        labels: &LabelSet,
    ) -> Result<QualityScore, TrainingError> {
        validate_batch(examples, labels)?;
        for example in examples {
            L::check(example)?;
        }

        let mut memory = self.memory.clone();
        memory.upsert(examples);
        memory.prune(labels);

        let all = memory.to_vec();
        let (learner, quality) = evaluation::fit_and_score::<L>(&all, labels, self.rng.as_ref());

        self.memory = memory;
        self.labels = labels.clone();
        self.learner = Some(learner);
        Ok(quality)
    }

    fn predict(&self, text: &str) -> Prediction {
        match &self.learner {
            Some(learner) => learner.predict(text),
            None => L::untrained(),
        }
    }

    fn is_trained(&self) -> bool {
        self.learner.is_some()
    }

    fn example_count(&self) -> usize {
        self.memory.len()
    }

    fn forget_document(&mut self, document: DocumentId) -> usize {
        let removed = self.memory.remove_document(document);
        if removed > 0 {
            self.learner = if self.memory.is_empty() {
                None
            } else {
                Some(L::fit(&self.memory.to_vec(), &self.labels))
            };
        }
        removed
    }

    fn boxed_clone(&self) -> Box<dyn ModelAdapter> {
        Box::new(self.clone())
    }
}

/// Preconditions shared by every adapter.
fn validate_batch(examples: &[TrainingExample], labels: &LabelSet) -> Result<(), TrainingError> {
    if examples.is_empty() {
        return Err(TrainingError::NoExamples);
    }
    if labels.is_empty() {
        return Err(TrainingError::EmptyLabelSet);
    }

    for example in examples {
        let len = example.text.chars().count();
        for ann in &example.annotations {
            if !labels.contains(ann.label) {
                return Err(TrainingError::UnknownLabel {
                    key: example.key.clone(),
                    label: ann.label,
                });
            }
            if let Some(span) = ann.span {
                if !span.fits(len) {
                    return Err(TrainingError::OutOfBounds {
                        key: example.key.clone(),
                        start: span.start(),
                        end: span.end(),
                        len,
                    });
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
