use std::collections::BTreeMap;

use crate::core::{
    AdapterRegistry, Annotation, AnnotationStore, AutoLabelError, DocumentId, LabelSet,
    ModelAdapter, Project, QualityScore, TrainingExample, UserId, ValidationError,
};

/// Result of training a fresh adapter on a project's whole corpus.
pub struct TrainedModel {
    pub adapter: Box<dyn ModelAdapter>,
    pub quality: QualityScore,
    pub examples: usize,
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("project_type", &self.adapter.project_type())
            .field("quality", &self.quality)
            .field("examples", &self.examples)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TrainingOrchestrator: turns stored annotations into adapter training calls
// ---------------------------------------------------------------------------

pub struct TrainingOrchestrator<'a> {
    store: &'a dyn AnnotationStore,
    registry: &'a AdapterRegistry,
}

impl<'a> TrainingOrchestrator<'a> {
    pub fn new(store: &'a dyn AnnotationStore, registry: &'a AdapterRegistry) -> Self {
        Self { store, registry }
    }

    /// Incrementally trains `adapter` on `user`'s annotations of one document.
    ///
    /// Exactly one example is built, even when the user has no annotations on
    /// the document. The adapter is unchanged when this returns `Err`.
    pub fn retrain(
        &self,
        adapter: &mut dyn ModelAdapter,
        project: &Project,
        document: DocumentId,
        user: &UserId,
    ) -> Result<QualityScore, AutoLabelError> {
        if !self.registry.supports(project.project_type)
            || adapter.project_type() != project.project_type
        {
            return Err(AutoLabelError::UnsupportedProjectType(project.project_type));
        }

        let labels = self.project_labels(project)?;
        let document = self
            .store
            .get_document(project.id, document)?
            .ok_or_else(|| AutoLabelError::NotFound(format!("document {document}")))?;
        let annotations = self.store.list_annotations(document.id, Some(user))?;

        let example = TrainingExample::from_annotations(
            project.project_type,
            &document,
            user,
            &annotations,
            &labels,
        )?;
        Ok(adapter.train(&[example], &labels)?)
    }

    /// Trains a fresh adapter on one example per annotating user per document.
    pub fn rebuild_from_corpus(&self, project: &Project) -> Result<TrainedModel, AutoLabelError> {
        let mut adapter = self
            .registry
            .create(project.project_type)
            .ok_or(AutoLabelError::UnsupportedProjectType(project.project_type))?;
        let labels = self.project_labels(project)?;

        let mut examples = Vec::new();
        for document in self.store.list_documents(project.id)? {
            let mut by_user: BTreeMap<UserId, Vec<Annotation>> = BTreeMap::new();
            for annotation in self.store.list_annotations(document.id, None)? {
                by_user
                    .entry(annotation.user.clone())
                    .or_default()
                    .push(annotation);
            }
            for (user, annotations) in &by_user {
                examples.push(TrainingExample::from_annotations(
                    project.project_type,
                    &document,
                    user,
                    annotations,
                    &labels,
                )?);
            }
        }

        if examples.is_empty() {
            return Err(ValidationError::EmptyCorpus {
                project: project.id,
            }
            .into());
        }

        let quality = adapter.train(&examples, &labels)?;
        Ok(TrainedModel {
            adapter,
            quality,
            examples: examples.len(),
        })
    }

    fn project_labels(&self, project: &Project) -> Result<LabelSet, AutoLabelError> {
        let labels = self.store.list_labels(project.id)?;
        if labels.is_empty() {
            return Err(ValidationError::EmptyLabelSet {
                project: project.id,
            }
            .into());
        }
        Ok(labels)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
