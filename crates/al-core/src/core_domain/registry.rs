use std::sync::Arc;

use crate::core::model::{ClassificationAdapter, SequenceLabelingAdapter};
use crate::core::{ModelAdapter, ProjectType, RandomSource};

pub type AdapterFactory = Box<dyn Fn(Arc<dyn RandomSource>) -> Box<dyn ModelAdapter> + Send + Sync>;

// ---------------------------------------------------------------------------
// AdapterRegistry: project type -> model adapter factory
// ---------------------------------------------------------------------------

/// Linear scan over a handful of entries; later registrations for the same
/// project type replace earlier ones.
pub struct AdapterRegistry {
    rng: Arc<dyn RandomSource>,
    factories: Vec<(ProjectType, AdapterFactory)>,
}

impl AdapterRegistry {
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self {
            rng,
            factories: Vec::new(),
        }
    }

    /// Registry with the classification and sequence-labeling adapters.
    pub fn with_defaults(rng: Arc<dyn RandomSource>) -> Self {
        let mut registry = Self::new(rng);
        registry.register(
            ProjectType::DocumentClassification,
            Box::new(|rng: Arc<dyn RandomSource>| -> Box<dyn ModelAdapter> {
                Box::new(ClassificationAdapter::new(rng))
            }),
        );
        registry.register(
            ProjectType::SequenceLabeling,
            Box::new(|rng: Arc<dyn RandomSource>| -> Box<dyn ModelAdapter> {
                Box::new(SequenceLabelingAdapter::new(rng))
            }),
        );
        registry
    }

    pub fn register(&mut self, project_type: ProjectType, factory: AdapterFactory) {
        self.factories.retain(|(ty, _)| *ty != project_type);
        self.factories.push((project_type, factory));
    }

    pub fn supports(&self, project_type: ProjectType) -> bool {
        self.factories.iter().any(|(ty, _)| *ty == project_type)
    }

    /// A fresh, untrained adapter for `project_type`.
    pub fn create(&self, project_type: ProjectType) -> Option<Box<dyn ModelAdapter>> {
        self.factories
            .iter()
            .find(|(ty, _)| *ty == project_type)
            .map(|(_, factory)| factory(Arc::clone(&self.rng)))
    }

    pub fn project_types(&self) -> impl Iterator<Item = ProjectType> + '_ {
        self.factories.iter().map(|(ty, _)| *ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{FixedAdapter, ScriptedRandom};
    use crate::core::{LabelId, Prediction};

    fn rng() -> Arc<dyn RandomSource> {
        Arc::new(ScriptedRandom::new(vec![]))
    }

    #[test]
    fn test_defaults_cover_two_types() {
        let registry = AdapterRegistry::with_defaults(rng());
        assert!(registry.supports(ProjectType::DocumentClassification));
        assert!(registry.supports(ProjectType::SequenceLabeling));
        assert!(!registry.supports(ProjectType::Seq2seq));
        assert!(registry.create(ProjectType::Seq2seq).is_none());
    }

    #[test]
    fn test_created_adapter_matches_type_and_is_untrained() {
        let registry = AdapterRegistry::with_defaults(rng());
        let adapter = registry.create(ProjectType::SequenceLabeling).unwrap();
        assert_eq!(adapter.project_type(), ProjectType::SequenceLabeling);
        assert!(!adapter.is_trained());
        assert_eq!(adapter.predict("anything"), Prediction::Spans(vec![]));
    }

    #[test]
    fn test_register_replaces_existing_factory() {
        let mut registry = AdapterRegistry::with_defaults(rng());
        registry.register(
            ProjectType::DocumentClassification,
            Box::new(|_: Arc<dyn RandomSource>| -> Box<dyn ModelAdapter> {
                Box::new(FixedAdapter::new(
                    ProjectType::DocumentClassification,
                    Prediction::Class(LabelId::new(7)),
                ))
            }),
        );

        assert_eq!(registry.project_types().count(), 2);
        let adapter = registry.create(ProjectType::DocumentClassification).unwrap();
        assert_eq!(adapter.predict("x"), Prediction::Class(LabelId::new(7)));
    }
}
