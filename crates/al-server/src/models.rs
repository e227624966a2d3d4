use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock};

use al_core::core::{AdapterRegistry, AutoLabelError, DocumentId, ModelAdapter, Project, ProjectId};

use crate::training::task_failure;

// ---------------------------------------------------------------------------
// ModelSlot: the published adapter of one project
// ---------------------------------------------------------------------------

/// Readers clone the published `Arc` and never wait on training. Trainers
/// hold `training` for the whole fit so updates to one project are applied
/// one after another, each starting from the previously published model.
pub struct ModelSlot {
    published: RwLock<Arc<dyn ModelAdapter>>,
    training: Mutex<()>,
}

impl ModelSlot {
    fn new(adapter: Box<dyn ModelAdapter>) -> Self {
        Self {
            published: RwLock::new(Arc::from(adapter)),
            training: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> Arc<dyn ModelAdapter> {
        Arc::clone(&*self.published.read().await)
    }

    pub async fn publish(&self, adapter: Box<dyn ModelAdapter>) {
        *self.published.write().await = Arc::from(adapter);
    }

    pub async fn lock_training(&self) -> MutexGuard<'_, ()> {
        self.training.lock().await
    }
}

// ---------------------------------------------------------------------------
// ModelPool: lazily created slots keyed by project
// ---------------------------------------------------------------------------

pub struct ModelPool {
    registry: Arc<AdapterRegistry>,
    slots: RwLock<HashMap<ProjectId, Arc<ModelSlot>>>,
}

impl ModelPool {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            registry,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// The project's slot, created with an untrained adapter on first use.
    /// `None` when no adapter is registered for the project type.
    pub async fn slot(&self, project: &Project) -> Option<Arc<ModelSlot>> {
        if let Some(slot) = self.slots.read().await.get(&project.id) {
            return Some(Arc::clone(slot));
        }

        let adapter = self.registry.create(project.project_type)?;
        let mut slots = self.slots.write().await;
        let slot = slots
            .entry(project.id)
            .or_insert_with(|| Arc::new(ModelSlot::new(adapter)));
        Some(Arc::clone(slot))
    }

    /// The currently published adapter, if the project type has one.
    pub async fn current(&self, project: &Project) -> Option<Arc<dyn ModelAdapter>> {
        let slot = self.slot(project).await?;
        Some(slot.snapshot().await)
    }

    /// Removes `document` from the project's published model, waiting for
    /// any running training first. Returns how many examples were dropped;
    /// projects without a loaded model have nothing to forget.
    pub async fn forget_document(
        &self,
        project: ProjectId,
        document: DocumentId,
    ) -> Result<usize, AutoLabelError> {
        let Some(slot) = self.slots.read().await.get(&project).cloned() else {
            return Ok(0);
        };
        let _training = slot.lock_training().await;
        let mut candidate = slot.snapshot().await.boxed_clone();

        let (candidate, removed) = tokio::task::spawn_blocking(move || {
            let removed = candidate.forget_document(document);
            (candidate, removed)
        })
        .await
        .map_err(task_failure)?;

        if removed > 0 {
            slot.publish(candidate).await;
        }
        Ok(removed)
    }

    /// Forgets the project's model, e.g. after the project is removed.
    pub async fn evict(&self, project: ProjectId) -> bool {
        self.slots.write().await.remove(&project).is_some()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn trained(&self) -> usize {
        let slots: Vec<Arc<ModelSlot>> = self.slots.read().await.values().cloned().collect();
        let mut trained = 0;
        for slot in slots {
            if slot.snapshot().await.is_trained() {
                trained += 1;
            }
        }
        trained
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
