use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::multi::SyncMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

/// Outcome of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunInfo {
    pub run_type: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub items: Option<usize>,
}

impl RunInfo {
    pub fn succeeded(run_type: &str, started_at: DateTime<Utc>, items: usize) -> Self {
        Self {
            run_type: run_type.to_string(),
            started_at,
            ended_at: Utc::now(),
            success: true,
            error: None,
            items: Some(items),
        }
    }

    pub fn failed(run_type: &str, started_at: DateTime<Utc>, error: String) -> Self {
        Self {
            run_type: run_type.to_string(),
            started_at,
            ended_at: Utc::now(),
            success: false,
            error: Some(error),
            items: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub label: String,
    pub schedule: String,
    pub last_run: Option<RunInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub last_full: Option<RunInfo>,
    pub last_incremental: Option<RunInfo>,
    pub running: bool,
    pub current: Option<String>,
    pub queue_len: usize,
    pub jobs: Vec<JobSnapshot>,
}

/// Mutable run state shared behind the scheduler's `RwLock`.
#[derive(Debug, Default)]
pub(crate) struct StatusBoard {
    last_full: Option<RunInfo>,
    last_incremental: Option<RunInfo>,
    current: Option<String>,
    jobs: Vec<JobSnapshot>,
}

impl StatusBoard {
    pub(crate) fn begin(&mut self, run_type: &str) {
        self.current = Some(run_type.to_string());
    }

    pub(crate) fn finish(&mut self, info: RunInfo) {
        self.current = None;
        if info.run_type == SyncMode::Full.label() {
            self.last_full = Some(info);
        } else if info.run_type == SyncMode::Incremental.label() {
            self.last_incremental = Some(info);
        }
    }

    pub(crate) fn register_job(&mut self, id: JobId, label: &str, schedule: &str) {
        self.jobs.push(JobSnapshot {
            id,
            label: label.to_string(),
            schedule: schedule.to_string(),
            last_run: None,
        });
    }

    pub(crate) fn record_job_run(&mut self, id: JobId, info: RunInfo) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) {
            job.last_run = Some(info);
        }
    }

    pub(crate) fn snapshot(&self, queue_len: usize) -> StatusSnapshot {
        StatusSnapshot {
            last_full: self.last_full.clone(),
            last_incremental: self.last_incremental.clone(),
            running: self.current.is_some(),
            current: self.current.clone(),
            queue_len,
            jobs: self.jobs.clone(),
        }
    }
}
