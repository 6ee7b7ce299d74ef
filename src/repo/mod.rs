/// Repository layer for accepted jobs and their progress
use crate::domain::{JobOutput, JobRecord, JobStatus, StatusUpdate};
use crate::errors::{ApiError, ApiResult};
use crate::progress::ProgressSink;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Finished jobs kept for status and download requests before the oldest are evicted
pub const DEFAULT_RETAINED_JOBS: usize = 1000;

/// In-memory job registry, cheap to clone and share between handlers and workers
#[derive(Clone)]
pub struct JobRepo {
    jobs: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
    retain_finished: usize,
}

impl Default for JobRepo {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_JOBS)
    }
}

impl JobRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            jobs: Arc::default(),
            retain_finished,
        }
    }

    /// Register a freshly accepted job
    pub fn create(&self, process: &'static str) -> Uuid {
        let id = Uuid::new_v4();
        let record = JobRecord {
            id,
            process,
            status: JobStatus::Accepted,
            message: "accepted".to_string(),
            percent: 0,
            updates: Vec::new(),
            output: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.write().insert(id, record);
        id
    }

    pub fn get(&self, id: Uuid) -> ApiResult<JobRecord> {
        self.read()
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("no job with id {id}")))
    }

    /// Record a status update; the percentage never moves backwards
    pub fn update(&self, id: Uuid, message: &str, percent: u8) {
        if let Some(job) = self.write().get_mut(&id) {
            push_update(job, message, percent);
        }
    }

    /// Store the output and emit the terminal `done` update together
    pub fn succeed(&self, id: Uuid, output: JobOutput) {
        {
            let mut jobs = self.write();
            if let Some(job) = jobs.get_mut(&id) {
                push_update(job, "done", 100);
                job.status = JobStatus::Succeeded;
                job.output = Some(output);
                job.finished_at = Some(Utc::now());
            }
            self.evict_finished(&mut jobs);
        }
        info!("job {id} succeeded");
    }

    pub fn fail(&self, id: Uuid, error: &ApiError) {
        let mut jobs = self.write();
        if let Some(job) = jobs.get_mut(&id) {
            job.status = JobStatus::Failed;
            job.message = "failed".to_string();
            job.error = Some(error.to_string());
            job.finished_at = Some(Utc::now());
        }
        self.evict_finished(&mut jobs);
    }

    /// Drop the oldest finished jobs beyond the retention limit; running jobs are never evicted
    fn evict_finished(&self, jobs: &mut HashMap<Uuid, JobRecord>) {
        let mut finished: Vec<_> = jobs
            .values()
            .filter_map(|job| job.finished_at.map(|at| (at, job.id)))
            .collect();
        if finished.len() <= self.retain_finished {
            return;
        }
        finished.sort();
        let excess = finished.len() - self.retain_finished;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
            debug!("evicted finished job {id}");
        }
    }

    pub fn handle(&self, id: Uuid) -> JobHandle {
        JobHandle {
            repo: self.clone(),
            id,
        }
    }

    // poisoned locks are recovered: no write leaves a record half-updated
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, JobRecord>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, JobRecord>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn push_update(job: &mut JobRecord, message: &str, percent: u8) {
    let percent = percent.min(100).max(job.percent);
    if job.status == JobStatus::Accepted {
        job.status = JobStatus::Running;
    }
    job.message = message.to_string();
    job.percent = percent;
    job.updates.push(StatusUpdate {
        message: message.to_string(),
        percent,
        at: Utc::now(),
    });
}

/// Progress sink bound to one job
#[derive(Clone)]
pub struct JobHandle {
    repo: JobRepo,
    id: Uuid,
}

impl ProgressSink for JobHandle {
    fn update(&self, message: &str, percent: u8) {
        self.repo.update(self.id, message, percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PlotArtifact, PLOT_PROCESS};

    #[test]
    fn test_create_and_get() {
        let repo = JobRepo::new();
        let id = repo.create(PLOT_PROCESS);
        let job = repo.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.percent, 0);
        assert_eq!(job.process, "plot_name");
    }

    #[test]
    fn test_unknown_job_not_found() {
        let repo = JobRepo::new();
        let err = repo.get(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_percent_never_decreases() {
        let repo = JobRepo::new();
        let id = repo.create(PLOT_PROCESS);
        let handle = repo.handle(id);
        handle.update("Processed plot parameters", 5);
        handle.update("Plotting", 40);
        handle.update("Plotting", 20);
        let job = repo.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.percent, 40);
        let percents: Vec<u8> = job.updates.iter().map(|u| u.percent).collect();
        assert_eq!(percents, vec![5, 40, 40]);
    }

    #[test]
    fn test_succeed_ends_with_done() {
        let repo = JobRepo::new();
        let id = repo.create(PLOT_PROCESS);
        repo.update(id, "Formatting output", 95);
        repo.succeed(
            id,
            JobOutput::PlotName(PlotArtifact::NoPlots {
                message: "No plots created, check input options".into(),
            }),
        );
        let job = repo.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        let last = job.updates.last().unwrap();
        assert_eq!((last.message.as_str(), last.percent), ("done", 100));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_fail_keeps_error() {
        let repo = JobRepo::new();
        let id = repo.create(PLOT_PROCESS);
        repo.fail(id, &ApiError::MalformedOutput("Cannot identify group number".into()));
        let job = repo.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("group number"));
    }

    #[test]
    fn test_done_never_visible_without_output() {
        let repo = JobRepo::new();
        let id = repo.create(PLOT_PROCESS);
        repo.update(id, "Plotting", 50);

        let reader = {
            let repo = repo.clone();
            std::thread::spawn(move || loop {
                let job = repo.get(id).unwrap();
                if job.percent == 100 {
                    assert_eq!(job.status, JobStatus::Succeeded);
                    assert!(job.output.is_some());
                    break;
                }
            })
        };
        repo.succeed(
            id,
            JobOutput::PlotName(PlotArtifact::NoPlots {
                message: "none".into(),
            }),
        );
        reader.join().unwrap();
    }

    #[test]
    fn test_oldest_finished_jobs_evicted() {
        let repo = JobRepo::with_retention(2);
        let running = repo.create(PLOT_PROCESS);
        let ids: Vec<Uuid> = (0..3).map(|_| repo.create(PLOT_PROCESS)).collect();
        for id in &ids {
            repo.fail(*id, &ApiError::ExternalProcess("nameplot exited".into()));
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        assert_eq!(repo.get(ids[0]).unwrap_err().code(), "NOT_FOUND");
        assert!(repo.get(ids[1]).is_ok());
        assert!(repo.get(ids[2]).is_ok());
        assert_eq!(repo.get(running).unwrap().status, JobStatus::Accepted);
    }
}
