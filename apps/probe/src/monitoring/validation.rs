//! Sanity checks on jobs received from the directory service.
//!
//! The target host ends up on the ping command line, so anything that is not
//! a plain hostname or IP literal is refused before it reaches the cache.

use anyhow::{Result, anyhow};
use std::collections::HashSet;
use tracing::warn;
use url::Url;

use super::types::Job;

const MAX_HOST_LEN: usize = 253;
const MAX_TIMEOUT: u64 = 300; // 5 minutes
const MAX_RETRIES: u32 = 100;

/// Validate a single job
pub fn validate_job(job: &Job) -> Result<()> {
    validate_target_host(&job.target_host)?;
    validate_check_interval(job.interval_seconds)?;
    validate_timeout(job.timeout_seconds)?;
    validate_retries(job.retries)?;
    if let Some(url) = job.monitoring_sink_url.as_deref() {
        validate_sink_url(url)?;
    }
    Ok(())
}

/// Drop invalid and duplicate jobs, logging each rejection.
///
/// For duplicate ids the first occurrence is kept.
pub fn retain_valid_jobs(jobs: Vec<Job>) -> Vec<Job> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| match validate_job(job) {
            Ok(()) => true,
            Err(e) => {
                warn!(job_id = job.id, host = %job.target_host, error = %e, "Skipping invalid job");
                false
            }
        })
        .filter(|job| {
            let fresh = seen.insert(job.id);
            if !fresh {
                warn!(job_id = job.id, "Skipping duplicate job id");
            }
            fresh
        })
        .collect()
}

/// Hostname or IP literal, never something the ping tool could read as a flag
fn validate_target_host(host: &str) -> Result<()> {
    if host.trim().is_empty() {
        return Err(anyhow!("Target host cannot be empty"));
    }

    if host.len() > MAX_HOST_LEN {
        return Err(anyhow!("Target host too long: {} characters", host.len()));
    }

    if host.starts_with('-') {
        return Err(anyhow!("Target host cannot start with '-'"));
    }

    if let Some(bad) = host
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_' | '%')))
    {
        return Err(anyhow!("Target host contains invalid character '{}'", bad));
    }

    Ok(())
}

fn validate_check_interval(interval_seconds: u64) -> Result<()> {
    if interval_seconds < 1 {
        return Err(anyhow!("Check interval must be at least 1 second"));
    }
    Ok(())
}

fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    const MIN_TIMEOUT: u64 = 1;

    if timeout_seconds < MIN_TIMEOUT {
        return Err(anyhow!(
            "Timeout too short: {} seconds (minimum: {})",
            timeout_seconds,
            MIN_TIMEOUT
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(anyhow!(
            "Timeout too long: {} seconds (maximum: {})",
            timeout_seconds,
            MAX_TIMEOUT
        ));
    }

    Ok(())
}

fn validate_retries(retries: u32) -> Result<()> {
    if retries > MAX_RETRIES {
        return Err(anyhow!("Too many retries: {} (maximum: {})", retries, MAX_RETRIES));
    }
    Ok(())
}

/// Blank sink URLs are treated as "not configured" later, so they pass here.
fn validate_sink_url(raw: &str) -> Result<()> {
    if raw.trim().is_empty() {
        return Ok(());
    }

    let url = Url::parse(raw.trim()).map_err(|e| anyhow!("Invalid sink URL: {}", e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("Invalid scheme for sink URL: {}", other)),
    }
}
