use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::{
    normalize_spans, LabelId, LabelSet, PredictedSpan, Prediction, ProjectType, QualityScore,
    Span, TrainingError, TrainingExample,
};

use super::evaluation::SpanCounts;
use super::Learner;

// ---------------------------------------------------------------------------
// Gazetteer: memorised surface forms with label and context statistics
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct SurfaceStats {
    labels: BTreeMap<LabelId, usize>,
    unlabeled: usize,
    /// Every annotated occurrence started at a word boundary.
    bounded_start: bool,
    /// Every annotated occurrence ended at a word boundary.
    bounded_end: bool,
}

impl SurfaceStats {
    fn new() -> Self {
        Self {
            labels: BTreeMap::new(),
            unlabeled: 0,
            bounded_start: true,
            bounded_end: true,
        }
    }

    fn labeled(&self) -> usize {
        self.labels.values().sum()
    }

    /// Majority label, ties to the lowest id; `None` when the surface is
    /// more often seen unannotated.
    fn emitted_label(&self) -> Option<LabelId> {
        let labeled = self.labeled();
        if labeled == 0 || labeled < self.unlabeled {
            return None;
        }
        let mut best: Option<(LabelId, usize)> = None;
        for (label, count) in &self.labels {
            match best {
                Some((_, top)) if *count <= top => {}
                _ => best = Some((*label, *count)),
            }
        }
        best.map(|(label, _)| label)
    }

    fn accepts(&self, chars: &[char], start: usize, end: usize) -> bool {
        (!self.bounded_start || is_boundary(chars, start))
            && (!self.bounded_end || is_boundary(chars, end))
    }
}

/// Case-folded character sequences mapped to what was annotated on them.
#[derive(Clone, Debug, Default)]
pub struct Gazetteer {
    surfaces: HashMap<Vec<char>, SurfaceStats>,
    max_len: usize,
}

impl Gazetteer {
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Longest-match, left-to-right tagging of `text`.
    pub fn tag(&self, text: &str) -> Vec<PredictedSpan> {
        let chars = fold(text);
        let n = chars.len();
        let mut out = Vec::new();
        let mut i = 0;

        while i < n {
            let longest = self.max_len.min(n - i);
            let hit = (1..=longest).rev().find_map(|len| {
                let stats = self.surfaces.get(&chars[i..i + len])?;
                if !stats.accepts(&chars, i, i + len) {
                    return None;
                }
                stats.emitted_label().map(|label| (label, len))
            });

            match hit {
                Some((label, len)) => {
                    if let Ok(span) = Span::new(i, i + len, n) {
                        out.push(PredictedSpan { label, span });
                    }
                    i += len;
                }
                None => i += 1,
            }
        }

        normalize_spans(out, n)
    }

    fn record_annotations(&mut self, example: &TrainingExample, labels: &LabelSet) {
        let chars = fold(&example.text);
        for ann in &example.annotations {
            let Some(span) = ann.span else { continue };
            if !labels.contains(ann.label) || !span.fits(chars.len()) {
                continue;
            }
            let surface = chars[span.start()..span.end()].to_vec();
            self.max_len = self.max_len.max(surface.len());
            let stats = self.surfaces.entry(surface).or_insert_with(SurfaceStats::new);
            *stats.labels.entry(ann.label).or_insert(0) += 1;
            stats.bounded_start &= is_boundary(&chars, span.start());
            stats.bounded_end &= is_boundary(&chars, span.end());
        }
    }

    /// Counts occurrences of known surfaces that no annotation touches.
    fn record_unlabeled(&mut self, example: &TrainingExample) {
        let chars = fold(&example.text);
        let n = chars.len();
        let annotated: Vec<Span> = example.annotations.iter().filter_map(|a| a.span).collect();

        for start in 0..n {
            for len in 1..=self.max_len.min(n - start) {
                let end = start + len;
                let Some(stats) = self.surfaces.get_mut(&chars[start..end]) else {
                    continue;
                };
                let touched = annotated
                    .iter()
                    .any(|s| s.start() < end && start < s.end());
                if !touched && stats.accepts(&chars, start, end) {
                    stats.unlabeled += 1;
                }
            }
        }
    }
}

impl Learner for Gazetteer {
    const PROJECT_TYPE: ProjectType = ProjectType::SequenceLabeling;

    fn check(example: &TrainingExample) -> Result<(), TrainingError> {
        let mut spans = Vec::with_capacity(example.annotations.len());
        for ann in &example.annotations {
            let span = ann.span.ok_or_else(|| TrainingError::IncompatibleExample {
                key: example.key.clone(),
                reason: "sequence labeling annotations require offsets".to_owned(),
            })?;
            spans.push(span);
        }

        spans.sort();
        if spans.windows(2).any(|w| w[0].overlaps(&w[1])) {
            return Err(TrainingError::IncompatibleExample {
                key: example.key.clone(),
                reason: "annotated spans overlap".to_owned(),
            });
        }
        Ok(())
    }

    fn fit(examples: &[TrainingExample], labels: &LabelSet) -> Self {
        let mut model = Self::default();
        for example in examples {
            model.record_annotations(example, labels);
        }
        for example in examples {
            model.record_unlabeled(example);
        }
        model
    }

    fn score(&self, examples: &[TrainingExample]) -> QualityScore {
        let mut counts = SpanCounts::default();
        for example in examples {
            let gold: BTreeSet<(LabelId, usize, usize)> = example
                .annotations
                .iter()
                .filter_map(|a| a.span.map(|s| (a.label, s.start(), s.end())))
                .collect();
            let predicted: BTreeSet<(LabelId, usize, usize)> = self
                .tag(&example.text)
                .iter()
                .map(|p| (p.label, p.span.start(), p.span.end()))
                .collect();
            counts.add(&gold, &predicted);
        }
        counts.f1()
    }

    fn predict(&self, text: &str) -> Prediction {
        Prediction::Spans(self.tag(text))
    }

    fn untrained() -> Prediction {
        Prediction::Spans(Vec::new())
    }
}

/// One char per input char, so folded offsets equal original offsets.
fn fold(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_boundary(chars: &[char], i: usize) -> bool {
    i == 0 || i >= chars.len() || !is_word(chars[i - 1]) || !is_word(chars[i])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
