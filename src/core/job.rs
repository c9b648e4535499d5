use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running => "Running",
            JobStatus::Finished => "Finished",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub status: JobStatus,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
}

impl Job {
    pub fn new() -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            status: JobStatus::Pending,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Instant::now());
    }

    pub fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.ended_at = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(self.ended_at.unwrap_or_else(Instant::now).duration_since(started))
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}
