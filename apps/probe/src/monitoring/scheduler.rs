use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::types::{Job, JobId};
use super::validation::retain_valid_jobs;
use crate::directory::DirectoryService;

/// Fixed-period timer polled from the agent loop (job fetch, heartbeat).
///
/// A cadence that never fired is due immediately.
#[derive(Debug, Clone)]
pub struct Cadence {
    every: Duration,
    last: Option<Instant>,
}

impl Cadence {
    pub fn new(every: Duration) -> Self {
        Self { every, last: None }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.last.is_none_or(|last| now.saturating_duration_since(last) >= self.every)
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Cached job list plus the last execution time of every cached job.
///
/// Owned by the agent loop; nothing else mutates it.
#[derive(Debug, Default)]
pub struct JobCache {
    jobs: Vec<Job>,
    last_execution: HashMap<JobId, Instant>,
}

impl JobCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn last_execution(&self, job_id: JobId) -> Option<Instant> {
        self.last_execution.get(&job_id).copied()
    }

    /// Replace the cached jobs wholesale.
    ///
    /// Timestamps of jobs that are still present are kept; the rest are dropped
    /// with their job.
    pub fn replace(&mut self, jobs: Vec<Job>) {
        let before = self.jobs.len();
        self.last_execution.retain(|id, _| jobs.iter().any(|job| job.id == *id));
        self.jobs = jobs;
        debug!(before, after = self.jobs.len(), "Job cache replaced");
    }

    /// Fetch the job list and replace the cache with it.
    ///
    /// On any failure the previous list stays in place and is returned.
    pub async fn refresh(&mut self, directory: &dyn DirectoryService) -> &[Job] {
        match directory.fetch_jobs().await {
            Ok(listing) => {
                let received = listing.jobs.len();
                if let Some(expected) = listing.jobs_count.filter(|count| *count != received) {
                    warn!(expected, received, "Directory job count does not match job list");
                }

                let jobs = retain_valid_jobs(listing.jobs);
                info!(
                    probe_id = ?listing.probe_id,
                    probe_name = listing.probe_name.as_deref().unwrap_or("-"),
                    jobs = jobs.len(),
                    "Retrieved jobs from server"
                );
                for job in &jobs {
                    debug!(job_id = job.id, name = job.label(), host = %job.target_host, "Job");
                    if job.monitoring_sink_url.is_none() {
                        warn!(job_id = job.id, "Job has no monitoring sink URL");
                    }
                }
                self.replace(jobs);
            }
            Err(e) => {
                warn!(error = %e, cached = self.jobs.len(), "Error getting jobs, keeping cached list");
            }
        }
        &self.jobs
    }

    pub fn is_due(&self, job: &Job) -> bool {
        self.is_due_at(job, Instant::now())
    }

    /// Due when never run, or when a full interval has passed since the last run.
    pub fn is_due_at(&self, job: &Job, now: Instant) -> bool {
        match self.last_execution.get(&job.id) {
            None => true,
            Some(last) => now.saturating_duration_since(*last) >= job.interval(),
        }
    }

    /// Jobs due at `now`, in cache order
    pub fn due_jobs(&self, now: Instant) -> Vec<Job> {
        self.jobs.iter().filter(|job| self.is_due_at(job, now)).cloned().collect()
    }

    /// Record a run, whatever its outcome.
    pub fn mark_executed(&mut self, job_id: JobId, at: Instant) {
        self.last_execution.insert(job_id, at);
    }
}
