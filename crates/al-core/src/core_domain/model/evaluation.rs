use std::collections::BTreeSet;

use crate::core::{shuffle, LabelId, LabelSet, QualityScore, RandomSource, TrainingExample};

use super::Learner;

/// Below this many memorised examples the score is measured on the training set.
pub const HOLDOUT_MIN_EXAMPLES: usize = 10;

pub const HOLDOUT_FRACTION: f64 = 0.2;

/// Fits the learner that will be committed and measures its quality.
///
/// With enough examples a shuffled holdout is scored against a learner fit
/// on the remainder; the returned learner is always fit on every example.
pub(crate) fn fit_and_score<L: Learner>(
    examples: &[TrainingExample],
    labels: &LabelSet,
    rng: &dyn RandomSource,
) -> (L, QualityScore) {
    let full = L::fit(examples, labels);

    if examples.len() < HOLDOUT_MIN_EXAMPLES {
        let quality = full.score(examples);
        return (full, quality);
    }

    let mut shuffled = examples.to_vec();
    shuffle(&mut shuffled, rng);
    let held = holdout_size(shuffled.len());
    let held_out = shuffled.split_off(shuffled.len() - held);

    let partial = L::fit(&shuffled, labels);
    let quality = partial.score(&held_out);
    (full, quality)
}

fn holdout_size(n: usize) -> usize {
    ((n as f64) * HOLDOUT_FRACTION).ceil() as usize
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Fraction of evaluable examples whose predicted label is among the gold ones.
pub(crate) fn accuracy(correct: usize, evaluable: usize) -> QualityScore {
    if evaluable == 0 {
        return QualityScore::new(0.0);
    }
    QualityScore::new(correct as f64 / evaluable as f64)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SpanCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl SpanCounts {
    pub fn add(
        &mut self,
        gold: &BTreeSet<(LabelId, usize, usize)>,
        predicted: &BTreeSet<(LabelId, usize, usize)>,
    ) {
        let hits = gold.intersection(predicted).count();
        self.true_positives += hits;
        self.false_positives += predicted.len() - hits;
        self.false_negatives += gold.len() - hits;
    }

    /// Micro F1; nothing expected and nothing predicted counts as perfect.
    pub fn f1(&self) -> QualityScore {
        let denom = 2 * self.true_positives + self.false_positives + self.false_negatives;
        if denom == 0 {
            return QualityScore::new(1.0);
        }
        QualityScore::new((2 * self.true_positives) as f64 / denom as f64)
    }
}
