use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::task::{AbortHandle, JoinError};
use uuid::Uuid;

use al_core::core::{
    AutoLabelError, DocumentId, Project, ProjectId, QualityScore, StoreError, TrainingError,
    TrainingOrchestrator, UserId,
};

use crate::handler::AppState;

#[derive(Clone, Copy, Debug, Serialize)]
pub struct TrainingOutcome {
    pub quality: QualityScore,
    pub examples: usize,
}

// ---------------------------------------------------------------------------
// TrainingJobs: running training tasks per project, abortable
// ---------------------------------------------------------------------------

struct Job {
    id: Uuid,
    abort: AbortHandle,
}

#[derive(Default)]
pub struct TrainingJobs {
    running: Mutex<HashMap<ProjectId, Vec<Job>>>,
}

impl TrainingJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` on its own tokio task so `cancel` can abort it.
    ///
    /// An aborted task resolves to `TrainingError::Cancelled`; whatever it had
    /// not yet published is discarded.
    pub async fn run<T, F>(&self, project: ProjectId, task: F) -> Result<T, AutoLabelError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, AutoLabelError>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        // spawned under the lock so a concurrent `cancel` always sees the job
        let handle = {
            let mut jobs = self.jobs();
            let handle = tokio::spawn(task);
            jobs.entry(project).or_default().push(Job {
                id,
                abort: handle.abort_handle(),
            });
            handle
        };
        let _registered = Registration {
            jobs: self,
            project,
            id,
        };
        tracing::info!(project = %project, job = %id, "training started");

        match handle.await {
            Ok(result) => {
                if let Err(err) = &result {
                    tracing::warn!(project = %project, job = %id, error = %err, "training failed");
                }
                result
            }
            Err(err) if err.is_cancelled() => {
                tracing::warn!(project = %project, job = %id, "training cancelled");
                Err(TrainingError::Cancelled.into())
            }
            Err(err) => {
                tracing::error!(project = %project, job = %id, error = %err, "training task panicked");
                Err(task_failure(err))
            }
        }
    }

    /// Aborts every running job of `project`, returning how many were hit.
    pub fn cancel(&self, project: ProjectId) -> usize {
        let jobs = self.jobs().remove(&project).unwrap_or_default();
        for job in &jobs {
            job.abort.abort();
        }
        jobs.len()
    }

    pub fn running(&self, project: ProjectId) -> usize {
        self.jobs().get(&project).map_or(0, Vec::len)
    }

    pub fn total_running(&self) -> usize {
        self.jobs().values().map(Vec::len).sum()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<ProjectId, Vec<Job>>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn forget(&self, project: ProjectId, id: Uuid) {
        let mut jobs = self.jobs();
        if let Some(list) = jobs.get_mut(&project) {
            list.retain(|job| job.id != id);
            if list.is_empty() {
                jobs.remove(&project);
            }
        }
    }
}

/// Unregisters a job however `run` exits, including when its caller is dropped.
struct Registration<'a> {
    jobs: &'a TrainingJobs,
    project: ProjectId,
    id: Uuid,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.jobs.forget(self.project, self.id);
    }
}

pub(crate) fn task_failure(err: JoinError) -> AutoLabelError {
    StoreError::Backend(format!("background task failed: {err}")).into()
}

// ---------------------------------------------------------------------------
// Training flows: copy the published model, fit off the runtime, publish
// ---------------------------------------------------------------------------

/// Trains the project's model on `user`'s annotations of `document`.
pub async fn retrain_document(
    state: &AppState,
    project: Project,
    document: DocumentId,
    user: UserId,
) -> Result<TrainingOutcome, AutoLabelError> {
    let slot = state
        .models
        .slot(&project)
        .await
        .ok_or(AutoLabelError::UnsupportedProjectType(project.project_type))?;
    let store = Arc::clone(&state.store);
    let registry = Arc::clone(&state.registry);
    let project_id = project.id;

    state
        .jobs
        .run(project_id, async move {
            let _training = slot.lock_training().await;
            let mut candidate = slot.snapshot().await.boxed_clone();

            let (candidate, quality) = tokio::task::spawn_blocking(move || {
                let quality = TrainingOrchestrator::new(&*store, &*registry).retrain(
                    candidate.as_mut(),
                    &project,
                    document,
                    &user,
                )?;
                Ok::<_, AutoLabelError>((candidate, quality))
            })
            .await
            .map_err(task_failure)??;

            let outcome = TrainingOutcome {
                quality,
                examples: candidate.example_count(),
            };
            slot.publish(candidate).await;
            tracing::info!(
                project = %project_id,
                document = %document,
                quality = outcome.quality.value(),
                examples = outcome.examples,
                "model retrained"
            );
            Ok(outcome)
        })
        .await
}

/// Replaces the project's model with one fit on every stored annotation.
pub async fn rebuild_project(
    state: &AppState,
    project: Project,
) -> Result<TrainingOutcome, AutoLabelError> {
    let slot = state
        .models
        .slot(&project)
        .await
        .ok_or(AutoLabelError::UnsupportedProjectType(project.project_type))?;
    let store = Arc::clone(&state.store);
    let registry = Arc::clone(&state.registry);
    let project_id = project.id;

    state
        .jobs
        .run(project_id, async move {
            let _training = slot.lock_training().await;

            let trained = tokio::task::spawn_blocking(move || {
                TrainingOrchestrator::new(&*store, &*registry).rebuild_from_corpus(&project)
            })
            .await
            .map_err(task_failure)??;

            let outcome = TrainingOutcome {
                quality: trained.quality,
                examples: trained.examples,
            };
            slot.publish(trained.adapter).await;
            tracing::info!(
                project = %project_id,
                quality = outcome.quality.value(),
                examples = outcome.examples,
                "model rebuilt from corpus"
            );
            Ok(outcome)
        })
        .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use al_core::core::{AdapterRegistry, ProjectType, RandomSource};
    use tokio::sync::Notify;

    use crate::models::ModelPool;
    use crate::rng::StdRandom;

    #[tokio::test]
    async fn test_completed_job_is_unregistered() {
        let jobs = TrainingJobs::new();
        let project = ProjectId::new(1);

        let value = jobs
            .run(project, async { Ok::<_, AutoLabelError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(jobs.running(project), 0);
    }

    #[tokio::test]
    async fn test_failed_job_returns_its_error() {
        let jobs = TrainingJobs::new();
        let err = jobs
            .run(ProjectId::new(1), async {
                Err::<(), _>(AutoLabelError::Training(TrainingError::NoExamples))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AutoLabelError::Training(TrainingError::NoExamples)
        ));
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_job() {
        let jobs = Arc::new(TrainingJobs::new());
        let project = ProjectId::new(1);
        let other = ProjectId::new(2);
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());

        let runner = {
            let jobs = Arc::clone(&jobs);
            let started = Arc::clone(&started);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                jobs.run(project, async move {
                    started.notify_one();
                    gate.notified().await;
                    Ok::<_, AutoLabelError>(())
                })
                .await
            })
        };

        started.notified().await;
        assert_eq!(jobs.running(project), 1);
        assert_eq!(jobs.cancel(other), 0);
        assert_eq!(jobs.cancel(project), 1);

        let result = runner.await.unwrap();
        assert!(matches!(
            result,
            Err(AutoLabelError::Training(TrainingError::Cancelled))
        ));
        assert_eq!(jobs.running(project), 0);
        assert_eq!(jobs.total_running(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_from_first_poll_reaches_job() {
        let jobs = Arc::new(TrainingJobs::new());
        let project = ProjectId::new(4);

        let task_jobs = Arc::clone(&jobs);
        let result = jobs
            .run(project, async move {
                assert_eq!(task_jobs.cancel(project), 1);
                std::future::pending::<()>().await;
                Ok::<_, AutoLabelError>(())
            })
            .await;

        assert!(matches!(
            result,
            Err(AutoLabelError::Training(TrainingError::Cancelled))
        ));
        assert_eq!(jobs.running(project), 0);
    }

    #[tokio::test]
    async fn test_cancelled_job_keeps_published_model() {
        let rng: Arc<dyn RandomSource> = Arc::new(StdRandom::new(Some(1)));
        let pool = ModelPool::new(Arc::new(AdapterRegistry::with_defaults(rng)));
        let project = Project {
            id: ProjectId::new(1),
            name: "ner".to_owned(),
            description: String::new(),
            project_type: ProjectType::SequenceLabeling,
        };
        let slot = pool.slot(&project).await.unwrap();
        let before = slot.snapshot().await;
        let project_id = project.id;

        let jobs = Arc::new(TrainingJobs::new());
        let started = Arc::new(Notify::new());
        let runner = {
            let jobs = Arc::clone(&jobs);
            let slot = Arc::clone(&slot);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                jobs.run(project_id, async move {
                    let _training = slot.lock_training().await;
                    let candidate = slot.snapshot().await.boxed_clone();
                    started.notify_one();
                    std::future::pending::<()>().await;
                    slot.publish(candidate).await;
                    Ok::<_, AutoLabelError>(())
                })
                .await
            })
        };

        started.notified().await;
        assert_eq!(jobs.cancel(project_id), 1);
        assert!(runner.await.unwrap().is_err());

        let after = slot.snapshot().await;
        assert!(Arc::ptr_eq(&before, &after));
        // the aborted task released the training gate
        drop(slot.lock_training().await);
    }
}
