use crate::core::{
    Annotation, Document, DocumentId, LabelSet, NewAnnotation, Prediction, Project, ProjectId,
    ProjectType, QualityScore, StoreError, TrainingError, TrainingExample, UserId,
};

// ---------------------------------------------------------------------------
// ModelAdapter: uniform train/predict interface over per-task models
// ---------------------------------------------------------------------------

pub trait ModelAdapter: Send + Sync {
    fn project_type(&self) -> ProjectType;

    /// Upserts `examples` into the model's memory and refits.
    ///
    /// On `Err` the adapter is exactly as it was before the call.
    fn train(
        &mut self,
        examples: &[TrainingExample],
        labels: &LabelSet,
    ) -> Result<QualityScore, TrainingError>;

    /// Never fails; an untrained model returns its documented default.
    fn predict(&self, text: &str) -> Prediction;

    fn is_trained(&self) -> bool;

    /// Number of memorised `(document, user)` examples.
    fn example_count(&self) -> usize;

    /// Drops every memorised example of `document` and refits on the rest.
    /// Returns how many examples were dropped; zero leaves the model as is.
    fn forget_document(&mut self, document: DocumentId) -> usize;

    fn boxed_clone(&self) -> Box<dyn ModelAdapter>;
}

// ---------------------------------------------------------------------------
// AnnotationStore: persistence collaborator (projects, labels, documents, annotations)
// ---------------------------------------------------------------------------

pub trait AnnotationStore: Send + Sync {
    fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;

    /// Labels of `project` ordered by id.
    fn list_labels(&self, project: ProjectId) -> Result<LabelSet, StoreError>;

    /// `None` when the document does not exist or belongs to another project.
    fn get_document(
        &self,
        project: ProjectId,
        id: DocumentId,
    ) -> Result<Option<Document>, StoreError>;

    fn list_documents(&self, project: ProjectId) -> Result<Vec<Document>, StoreError>;

    /// Annotations on `document`, optionally restricted to one user, ordered by id.
    fn list_annotations(
        &self,
        document: DocumentId,
        user: Option<&UserId>,
    ) -> Result<Vec<Annotation>, StoreError>;

    fn is_member(&self, project: ProjectId, user: &UserId) -> Result<bool, StoreError>;

    /// Atomically replaces all of `user`'s annotations on `document`.
    fn replace_annotations(
        &self,
        document: DocumentId,
        user: &UserId,
        annotations: &[NewAnnotation],
    ) -> Result<Vec<Annotation>, StoreError>;
}

// ---------------------------------------------------------------------------
// RandomSource: injectable randomness for deterministic testing
// ---------------------------------------------------------------------------

pub trait RandomSource: Send + Sync {
    /// Uniform index in `0..bound`; `bound` is never zero.
    fn next_index(&self, bound: usize) -> usize;
}

/// Fisher-Yates shuffle driven by `rng`.
pub fn shuffle<T>(items: &mut [T], rng: &dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = rng.next_index(i + 1);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::ScriptedRandom;

    #[test]
    fn test_shuffle_follows_random_source() {
        let rng = ScriptedRandom::new(vec![0, 0, 0]);
        let mut items = vec![1, 2, 3, 4];
        shuffle(&mut items, &rng);
        // i=3 swaps with 0, i=2 swaps with 0, i=1 swaps with 0
        assert_eq!(items, vec![2, 3, 4, 1]);
    }

    #[test]
    fn test_shuffle_single_element_draws_nothing() {
        let rng = ScriptedRandom::new(vec![]);
        let mut items = vec![7];
        shuffle(&mut items, &rng);
        assert_eq!(items, vec![7]);
    }
}
