use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::orchestrator::{JobPhase, ProgressReporter, RenderOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub phase: Option<JobPhase>,
    pub progress: f64,
    pub prompt: String,
    pub video_id: Option<Uuid>,
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct Entry {
    job: Job,
    cancel: CancellationToken,
}

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// In-memory registry of background render jobs. Finished jobs are kept for
/// the retention window, then dropped on the next `create_job`.
pub struct JobManager {
    jobs: Mutex<HashMap<Uuid, Entry>>,
    retention: Duration,
}

impl Default for JobManager {
    fn default() -> Self {
        JobManager::with_retention(DEFAULT_RETENTION)
    }
}

impl JobManager {
    pub fn new() -> Self {
        JobManager::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        JobManager {
            jobs: Mutex::new(HashMap::new()),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut Job)) {
        if let Some(entry) = self.lock().get_mut(&id) {
            apply(&mut entry.job);
            entry.job.updated_at = Utc::now();
        }
    }

    /// Registers a pending job and returns its id with the token that
    /// cancels it.
    pub fn create_job(&self, prompt: &str) -> (Uuid, CancellationToken) {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let cancel = CancellationToken::new();
        let job = Job {
            id,
            status: JobStatus::Pending,
            phase: None,
            progress: 0.0,
            prompt: prompt.to_string(),
            video_id: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        };
        self.sweep(now);
        self.lock().insert(
            id,
            Entry {
                job,
                cancel: cancel.clone(),
            },
        );
        (id, cancel)
    }

    /// Drops finished jobs older than the retention window. Returns how many
    /// were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let retention = self.retention;
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let expired = entry
                .job
                .finished_at
                .and_then(|at| (now - at).to_std().ok())
                .is_some_and(|age| age >= retention);
            !expired
        });
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = jobs.len(), "evicted finished jobs");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get_job(&self, id: Uuid) -> Option<Job> {
        self.lock().get(&id).map(|entry| entry.job.clone())
    }

    pub fn mark_running(&self, id: Uuid) {
        self.update(id, |job| {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
            }
        });
    }

    pub fn update_phase(&self, id: Uuid, phase: JobPhase, progress: f64) {
        self.update(id, |job| {
            if !job.status.is_terminal() {
                job.phase = Some(phase);
                job.progress = progress.clamp(0.0, 1.0);
            }
        });
    }

    pub fn complete(&self, id: Uuid, outcome: &RenderOutcome) {
        self.update(id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 1.0;
            job.video_id = Some(outcome.video_id);
            job.finished_at = Some(Utc::now());
        });
    }

    pub fn fail(&self, id: Uuid, error: &PipelineError) {
        self.update(id, |job| {
            job.status = match error {
                PipelineError::Cancelled => JobStatus::Cancelled,
                _ => JobStatus::Failed,
            };
            job.error = Some(JobFailure {
                kind: error.kind(),
                message: error.to_string(),
            });
            job.finished_at = Some(Utc::now());
        });
    }

    /// Signals cancellation. Returns false for unknown or finished jobs.
    pub fn cancel_job(&self, id: Uuid) -> bool {
        let jobs = self.lock();
        match jobs.get(&id) {
            Some(entry) if !entry.job.status.is_terminal() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn tracker(self: &Arc<Self>, id: Uuid) -> TrackedJob {
        TrackedJob {
            manager: Arc::clone(self),
            id,
        }
    }
}

/// Forwards orchestrator progress into the job registry.
pub struct TrackedJob {
    manager: Arc<JobManager>,
    id: Uuid,
}

impl ProgressReporter for TrackedJob {
    fn report(&self, phase: JobPhase, progress: f64) {
        self.manager.update_phase(self.id, phase, progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn lifecycle_records_phase_and_outcome() {
        let manager = Arc::new(JobManager::new());
        let (id, _cancel) = manager.create_job("a beach at dawn");
        assert_eq!(manager.get_job(id).unwrap().status, JobStatus::Pending);

        manager.mark_running(id);
        manager.tracker(id).report(JobPhase::Resolving, 0.2);
        let job = manager.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.phase, Some(JobPhase::Resolving));

        let video_id = Uuid::new_v4();
        manager.complete(
            id,
            &RenderOutcome {
                video_id,
                output_path: PathBuf::from("renders/out.mp4"),
                scene_count: 3,
                duration_secs: 30.0,
                has_music: false,
            },
        );
        let job = manager.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.video_id, Some(video_id));
        assert_eq!(job.progress, 1.0);
    }

    #[test]
    fn cancel_fires_the_token_once() {
        let manager = JobManager::new();
        let (id, token) = manager.create_job("storm");
        assert!(manager.cancel_job(id));
        assert!(token.is_cancelled());

        manager.fail(id, &PipelineError::Cancelled);
        let job = manager.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.error.unwrap().kind, "cancelled");
        assert!(!manager.cancel_job(id));
        assert!(!manager.cancel_job(Uuid::new_v4()));
    }

    #[test]
    fn failures_keep_their_kind() {
        let manager = JobManager::new();
        let (id, _) = manager.create_job("forest");
        manager.fail(id, &PipelineError::Render("encoder exited".into()));
        let job = manager.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().kind, "render_error");
    }

    #[test]
    fn finished_jobs_are_evicted_after_retention() {
        let manager = JobManager::with_retention(Duration::from_secs(60));
        let (done, _) = manager.create_job("harbor");
        let (failed, _) = manager.create_job("desert");
        let (running, _) = manager.create_job("city");
        manager.mark_running(running);
        manager.fail(failed, &PipelineError::Render("encoder exited".into()));
        manager.complete(
            done,
            &RenderOutcome {
                video_id: Uuid::new_v4(),
                output_path: PathBuf::from("renders/out.mp4"),
                scene_count: 1,
                duration_secs: 5.0,
                has_music: false,
            },
        );
        assert!(manager.get_job(done).unwrap().finished_at.is_some());
        assert!(manager.get_job(running).unwrap().finished_at.is_none());

        assert_eq!(manager.sweep(Utc::now()), 0);
        assert_eq!(manager.len(), 3);

        let later = Utc::now() + chrono::Duration::seconds(61);
        assert_eq!(manager.sweep(later), 2);
        assert!(manager.get_job(done).is_none());
        assert!(manager.get_job(failed).is_none());
        assert_eq!(manager.get_job(running).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn creating_a_job_sweeps_expired_ones() {
        let manager = JobManager::with_retention(Duration::ZERO);
        let (old, _) = manager.create_job("glacier");
        manager.fail(old, &PipelineError::Cancelled);
        let (fresh, _) = manager.create_job("meadow");
        assert!(manager.get_job(old).is_none());
        assert!(manager.get_job(fresh).is_some());
        assert_eq!(manager.len(), 1);
    }
}
