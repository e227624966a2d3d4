use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core::{
    LabelId, LabelSet, Prediction, ProjectType, QualityScore, TrainingError, TrainingExample,
};

use super::evaluation::accuracy;
use super::Learner;

// ---------------------------------------------------------------------------
// NaiveBayes: multinomial bag-of-words classifier with Laplace smoothing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct ClassStats {
    observations: usize,
    token_total: usize,
    tokens: HashMap<String, usize>,
}

/// Each annotation of an example counts as one observation of its class.
#[derive(Clone, Debug, Default)]
pub struct NaiveBayes {
    classes: BTreeMap<LabelId, ClassStats>,
    vocabulary: HashSet<String>,
    observations: usize,
}

impl NaiveBayes {
    /// Highest-scoring class, ties broken by the lowest label id. `None`
    /// until at least one labeled example has been fitted.
    pub fn classify(&self, text: &str) -> Option<LabelId> {
        if self.observations == 0 {
            return None;
        }

        let tokens: Vec<String> = tokenize(text)
            .filter(|t| self.vocabulary.contains(t))
            .collect();
        let vocab = self.vocabulary.len() as f64;

        let mut best: Option<(LabelId, f64)> = None;
        for (label, stats) in &self.classes {
            let prior = (stats.observations as f64 / self.observations as f64).ln();
            let denom = stats.token_total as f64 + vocab;
            let likelihood: f64 = tokens
                .iter()
                .map(|t| {
                    let count = stats.tokens.get(t).copied().unwrap_or(0) as f64;
                    ((count + 1.0) / denom).ln()
                })
                .sum();
            let score = prior + likelihood;
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((*label, score)),
            }
        }
        best.map(|(label, _)| label)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl Learner for NaiveBayes {
    const PROJECT_TYPE: ProjectType = ProjectType::DocumentClassification;

    fn check(example: &TrainingExample) -> Result<(), TrainingError> {
        if example.annotations.iter().any(|a| a.span.is_some()) {
            return Err(TrainingError::IncompatibleExample {
                key: example.key.clone(),
                reason: "document classification annotations carry no offsets".to_owned(),
            });
        }
        Ok(())
    }

    fn fit(examples: &[TrainingExample], labels: &LabelSet) -> Self {
        let mut model = Self::default();
        for example in examples {
            let tokens: Vec<String> = tokenize(&example.text).collect();
            for label in example.labels().filter(|l| labels.contains(*l)) {
                let stats = model.classes.entry(label).or_default();
                stats.observations += 1;
                stats.token_total += tokens.len();
                for token in &tokens {
                    *stats.tokens.entry(token.clone()).or_insert(0) += 1;
                }
                model.observations += 1;
            }
            if example.annotations.iter().any(|a| labels.contains(a.label)) {
                model.vocabulary.extend(tokens);
            }
        }
        model
    }

    fn score(&self, examples: &[TrainingExample]) -> QualityScore {
        let mut evaluable = 0;
        let mut correct = 0;
        for example in examples.iter().filter(|e| !e.annotations.is_empty()) {
            evaluable += 1;
            if let Some(predicted) = self.classify(&example.text) {
                if example.labels().any(|l| l == predicted) {
                    correct += 1;
                }
            }
        }
        accuracy(correct, evaluable)
    }

    fn predict(&self, text: &str) -> Prediction {
        match self.classify(text) {
            Some(label) => Prediction::Class(label),
            None => Prediction::Empty,
        }
    }

    fn untrained() -> Prediction {
        Prediction::Empty
    }
}

/// Lowercased alphanumeric runs.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
