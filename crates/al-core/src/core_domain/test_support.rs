use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core::{
    Annotation, AnnotationId, AnnotationStore, Document, DocumentId, Label, LabelId, LabelSet,
    ModelAdapter, NewAnnotation, Prediction, Project, ProjectId, ProjectType, QualityScore,
    RandomSource, Span, StoreError, TrainingError, TrainingExample, UserId,
};

// ---------------------------------------------------------------------------
// MemoryStore: in-memory AnnotationStore double
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    next_id: i64,
    projects: Vec<Project>,
    labels: Vec<Label>,
    documents: Vec<Document>,
    annotations: Vec<Annotation>,
    members: Vec<(ProjectId, UserId)>,
}

impl Tables {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project(&self, project_type: ProjectType) -> Project {
        let mut t = self.tables.lock().unwrap();
        let project = Project {
            id: ProjectId::new(t.next()),
            name: format!("{project_type} project"),
            description: String::new(),
            project_type,
        };
        t.projects.push(project.clone());
        project
    }

    pub fn add_label(&self, project: ProjectId, text: &str) -> Label {
        let mut t = self.tables.lock().unwrap();
        let label = Label {
            id: LabelId::new(t.next()),
            project,
            text: text.to_owned(),
        };
        t.labels.push(label.clone());
        label
    }

    pub fn add_document(&self, project: ProjectId, text: &str) -> Document {
        let mut t = self.tables.lock().unwrap();
        let document = Document {
            id: DocumentId::new(t.next()),
            project,
            text: text.to_owned(),
        };
        t.documents.push(document.clone());
        document
    }

    pub fn add_member(&self, project: ProjectId, user: &UserId) {
        let mut t = self.tables.lock().unwrap();
        t.members.push((project, user.clone()));
    }

    pub fn add_annotation(
        &self,
        document: DocumentId,
        user: &UserId,
        label: LabelId,
        span: Option<(usize, usize)>,
    ) -> Annotation {
        let mut t = self.tables.lock().unwrap();
        let annotation = Annotation {
            id: AnnotationId::new(t.next()),
            document,
            user: user.clone(),
            label,
            span: span.map(|(s, e)| Span::ordered(s, e).expect("test span must be ordered")),
        };
        t.annotations.push(annotation.clone());
        annotation
    }
}

impl AnnotationStore for MemoryStore {
    fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(t.projects.iter().find(|p| p.id == id).cloned())
    }

    fn list_labels(&self, project: ProjectId) -> Result<LabelSet, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(LabelSet::new(
            t.labels.iter().filter(|l| l.project == project).cloned().collect(),
        ))
    }

    fn get_document(
        &self,
        project: ProjectId,
        id: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(t.documents
            .iter()
            .find(|d| d.id == id && d.project == project)
            .cloned())
    }

    fn list_documents(&self, project: ProjectId) -> Result<Vec<Document>, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(t.documents
            .iter()
            .filter(|d| d.project == project)
            .cloned()
            .collect())
    }

    fn list_annotations(
        &self,
        document: DocumentId,
        user: Option<&UserId>,
    ) -> Result<Vec<Annotation>, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(t.annotations
            .iter()
            .filter(|a| a.document == document && user.is_none_or(|u| &a.user == u))
            .cloned()
            .collect())
    }

    fn is_member(&self, project: ProjectId, user: &UserId) -> Result<bool, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(t.members.iter().any(|(p, u)| *p == project && u == user))
    }

    fn replace_annotations(
        &self,
        document: DocumentId,
        user: &UserId,
        annotations: &[NewAnnotation],
    ) -> Result<Vec<Annotation>, StoreError> {
        let mut t = self.tables.lock().unwrap();
        t.annotations
            .retain(|a| !(a.document == document && &a.user == user));
        let mut written = Vec::with_capacity(annotations.len());
        for new in annotations {
            let annotation = Annotation {
                id: AnnotationId::new(t.next()),
                document,
                user: user.clone(),
                label: new.label,
                span: new.span,
            };
            t.annotations.push(annotation.clone());
            written.push(annotation);
        }
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// ScriptedRandom: replays a fixed sequence of draws, then zeros
// ---------------------------------------------------------------------------

pub struct ScriptedRandom {
    draws: Mutex<VecDeque<usize>>,
}

impl ScriptedRandom {
    pub fn new(draws: Vec<usize>) -> Self {
        Self {
            draws: Mutex::new(draws.into()),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_index(&self, bound: usize) -> usize {
        let next = self.draws.lock().unwrap().pop_front().unwrap_or(0);
        next % bound
    }
}

// ---------------------------------------------------------------------------
// FixedAdapter: returns a canned prediction and records training calls
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FixedAdapter {
    project_type: ProjectType,
    prediction: Prediction,
    pub trained_with: Vec<TrainingExample>,
}

impl FixedAdapter {
    pub fn new(project_type: ProjectType, prediction: Prediction) -> Self {
        Self {
            project_type,
            prediction,
            trained_with: Vec::new(),
        }
    }
}

impl ModelAdapter for FixedAdapter {
    fn project_type(&self) -> ProjectType {
        self.project_type
    }

    fn train(
        &mut self,
        examples: &[TrainingExample],
        _labels: &LabelSet,
    ) -> Result<QualityScore, TrainingError> {
        self.trained_with.extend_from_slice(examples);
        Ok(QualityScore::new(0.5))
    }

    fn predict(&self, _text: &str) -> Prediction {
        self.prediction.clone()
    }

    fn is_trained(&self) -> bool {
        !self.trained_with.is_empty()
    }

    fn example_count(&self) -> usize {
        self.trained_with.len()
    }

    fn forget_document(&mut self, document: DocumentId) -> usize {
        let before = self.trained_with.len();
        self.trained_with.retain(|e| e.key.document != document);
        before - self.trained_with.len()
    }

    fn boxed_clone(&self) -> Box<dyn ModelAdapter> {
        Box::new(self.clone())
    }
}
