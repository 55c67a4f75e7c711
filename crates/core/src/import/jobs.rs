use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::catalog::now_timestamp;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// Snapshot of an import job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportJob {
    pub match_id: String,
    pub status: JobStatus,
    pub total: usize,
    /// Entries attempted so far, failures included.
    pub processed: usize,
    pub failed: usize,
    pub error: Option<String>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

impl ImportJob {
    /// Status as exposed to pollers; a missing job reads as `not_found`.
    pub fn status_label(job: Option<&ImportJob>) -> &'static str {
        job.map_or("not_found", |j| j.status.as_str())
    }
}

/// Where import progress lives. The worker writes, pollers read.
///
/// Implementations must make `create_job` atomic: a match with a job still
/// `processing` cannot get a second one.
pub trait JobStore: Send + Sync {
    fn create_job(&self, match_id: &str, total: usize) -> Result<ImportJob>;

    /// Raise `processed`. Lower or equal values and updates to finished jobs are ignored.
    fn update_progress(&self, match_id: &str, processed: usize);

    /// Count one entry that could not be imported.
    fn record_failure(&self, match_id: &str);

    fn complete_job(&self, match_id: &str);

    fn fail_job(&self, match_id: &str, message: &str);

    fn get_job(&self, match_id: &str) -> Option<ImportJob>;

    /// Forget a job. Returns whether one was tracked.
    fn remove_job(&self, match_id: &str) -> bool;
}

/// Process-local job store. State is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, ImportJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ImportJob>> {
        // A panic while holding the lock cannot leave a job half-written
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_active(&self, match_id: &str, f: impl FnOnce(&mut ImportJob)) {
        if let Some(job) = self.lock().get_mut(match_id) {
            if !job.status.is_terminal() {
                f(job);
            }
        }
    }

    fn finish(&self, match_id: &str, status: JobStatus, error: Option<String>) {
        self.with_active(match_id, |job| {
            job.status = status;
            job.error = error;
            job.finished_at = Some(now_timestamp());
        });
    }
}

impl JobStore for InMemoryJobStore {
    fn create_job(&self, match_id: &str, total: usize) -> Result<ImportJob> {
        let mut jobs = self.lock();
        if jobs
            .get(match_id)
            .is_some_and(|job| job.status == JobStatus::Processing)
        {
            return Err(Error::ImportInProgress(match_id.to_string()));
        }
        let job = ImportJob {
            match_id: match_id.to_string(),
            status: JobStatus::Processing,
            total,
            processed: 0,
            failed: 0,
            error: None,
            started_at: now_timestamp(),
            finished_at: None,
        };
        jobs.insert(match_id.to_string(), job.clone());
        Ok(job)
    }

    fn update_progress(&self, match_id: &str, processed: usize) {
        self.with_active(match_id, |job| {
            if processed > job.processed {
                job.processed = processed;
            }
        });
    }

    fn record_failure(&self, match_id: &str) {
        self.with_active(match_id, |job| job.failed += 1);
    }

    fn complete_job(&self, match_id: &str) {
        self.finish(match_id, JobStatus::Completed, None);
    }

    fn fail_job(&self, match_id: &str, message: &str) {
        self.finish(match_id, JobStatus::Error, Some(message.to_string()));
    }

    fn get_job(&self, match_id: &str) -> Option<ImportJob> {
        self.lock().get(match_id).cloned()
    }

    fn remove_job(&self, match_id: &str) -> bool {
        self.lock().remove(match_id).is_some()
    }
}
