//! Single-flight training job coordinator
//!
//! `Idle → Training → {Completed, Failed}`. A finished job is replaced by the
//! next `start()`; a running one rejects it.

use crate::error::{ForecastError, Result};
use crate::metrics::EvaluationMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// Lifecycle state of the current training job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    Training,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Training => "training",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Snapshot of the training job, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub is_training: bool,
    pub state: JobState,
    /// Latest progress text
    pub status: String,
    pub job_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub result: Option<EvaluationMetrics>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct TrainingJob {
    state: JobState,
    status: String,
    job_id: Option<String>,
    start_time: Option<DateTime<Utc>>,
    result: Option<EvaluationMetrics>,
    error: Option<String>,
    /// Millisecond stamp of the last issued id, kept across jobs
    last_stamp: i64,
}

impl Default for TrainingJob {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            status: "Idle".to_string(),
            job_id: None,
            start_time: None,
            result: None,
            error: None,
            last_stamp: 0,
        }
    }
}

/// Serializes training runs and records the outcome of the latest one
#[derive(Debug, Default)]
pub struct TrainingCoordinator {
    job: Mutex<TrainingJob>,
}

impl TrainingCoordinator {
    /// Create an idle coordinator
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrainingJob> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Begin a new job and return its id
    ///
    /// Fails with `ConcurrentTrainingConflict` while a job is running,
    /// leaving that job untouched.
    pub fn start(&self) -> Result<String> {
        let mut job = self.lock();
        if job.state == JobState::Training {
            let running = job.job_id.clone().unwrap_or_default();
            warn!(job_id = %running, "Rejected training start, job already running");
            return Err(ForecastError::ConcurrentTrainingConflict { job_id: running });
        }

        let now = Utc::now();
        // Ids derive from the start time but must stay unique
        let stamp = now.timestamp_millis().max(job.last_stamp + 1);
        let job_id = format!("job_{}", stamp);

        job.state = JobState::Training;
        job.status = "Starting training".to_string();
        job.job_id = Some(job_id.clone());
        job.start_time = Some(now);
        job.result = None;
        job.error = None;
        job.last_stamp = stamp;

        info!(job_id = %job_id, "Training job started");
        Ok(job_id)
    }

    /// Record progress text without changing state
    pub fn update_status(&self, text: &str) {
        let mut job = self.lock();
        info!(job_id = ?job.job_id, status = text, "Training progress");
        job.status = text.to_string();
    }

    /// Finish the running job successfully
    pub fn complete(&self, metrics: Option<EvaluationMetrics>) {
        let mut job = self.lock();
        if job.state != JobState::Training {
            warn!(state = %job.state, "Ignoring completion, no job is running");
            return;
        }
        job.state = JobState::Completed;
        job.status = "Training completed".to_string();
        job.result = metrics;
        info!(job_id = ?job.job_id, "Training job completed");
    }

    /// Finish the running job with an error
    pub fn fail(&self, error: &str) {
        let mut job = self.lock();
        if job.state != JobState::Training {
            warn!(state = %job.state, error, "Ignoring failure, no job is running");
            return;
        }
        job.state = JobState::Failed;
        job.status = "Training failed".to_string();
        job.error = Some(error.to_string());
        warn!(job_id = ?job.job_id, error, "Training job failed");
    }

    /// Current job snapshot
    pub fn status(&self) -> TrainingStatus {
        let job = self.lock();
        TrainingStatus {
            is_training: job.state == JobState::Training,
            state: job.state,
            status: job.status.clone(),
            job_id: job.job_id.clone(),
            start_time: job.start_time,
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}
