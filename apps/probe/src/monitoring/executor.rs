use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::checker::{PingOutput, Pinger};
use super::parser::{self, StatsSource};
use super::types::{ExecutionRecord, Job, packet_loss_pct, round2};
use crate::error::ProbeError;

const PERMISSION_MARKERS: [&str; 3] =
    ["Operation not permitted", "Permission denied", "Lacking privilege"];

/// Probe executor - runs one ping job and turns the output into a record
pub struct ProbeExecutor {
    pinger: Arc<dyn Pinger>,
}

impl ProbeExecutor {
    pub fn new(pinger: Arc<dyn Pinger>) -> Self {
        Self { pinger }
    }

    /// Execute a job. Every failure ends up in the returned record.
    pub async fn execute(&self, job: &Job) -> ExecutionRecord {
        let count = job.probe_count();
        let budget = job.execution_budget();

        info!(job_id = job.id, host = %job.target_host, count, "Running ping");

        let started = Instant::now();
        let outcome =
            timeout(budget, self.pinger.ping(&job.target_host, count, job.timeout_seconds)).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let record = match outcome {
            Ok(Ok(output)) => build_record(job, count, output, duration_ms),
            Ok(Err(e)) => {
                error!(job_id = job.id, host = %job.target_host, error = %e, "Error executing ping");
                ExecutionRecord::failed(job, e.to_string())
            }
            Err(_) => {
                let e = ProbeError::TimedOut(budget);
                warn!(job_id = job.id, host = %job.target_host, error = %e, "Ping killed after timeout");
                ExecutionRecord::failed(job, e.to_string())
            }
        };

        info!(
            job_id = job.id,
            success = record.success,
            response_time_ms = record.response_time_ms,
            received = record.packets_received,
            sent = record.packets_sent,
            "Ping result"
        );

        record
    }
}

/// Interpret captured ping output for `job`.
pub fn build_record(job: &Job, count: u32, output: PingOutput, duration_ms: f64) -> ExecutionRecord {
    if !output.exited_cleanly() && is_permission_denied(&output) {
        warn!(
            job_id = job.id,
            "Ping failed due to missing privileges; grant CAP_NET_RAW (e.g. --cap-add=NET_RAW)"
        );
    }

    let stats = parser::parse_statistics(&output.stdout, count);
    debug!(job_id = job.id, source = ?stats.source, "Parsed ping statistics");

    let success = output.exited_cleanly()
        || parser::has_reply(&output.stdout)
        || stats.source == StatsSource::Replies;

    let (min_rtt_ms, avg_rtt_ms, max_rtt_ms) =
        stats.rtt.map(|rtt| (rtt.min_ms, rtt.avg_ms, rtt.max_ms)).unwrap_or_default();

    let response_time_ms = if success && avg_rtt_ms > 0.0 {
        avg_rtt_ms
    } else if success {
        round2(duration_ms)
    } else {
        0.0
    };

    let error_message = (!success).then(|| failure_message(job, &output));

    ExecutionRecord {
        job_id: job.id,
        target_host: job.target_host.clone(),
        timestamp: Utc::now(),
        success,
        duration_ms: round2(duration_ms),
        packets_sent: stats.packets_sent,
        packets_received: stats.packets_received,
        packet_loss_pct: packet_loss_pct(stats.packets_sent, stats.packets_received),
        min_rtt_ms,
        avg_rtt_ms,
        max_rtt_ms,
        response_time_ms,
        error_message,
        raw_output: output.stdout,
        sink_delivered: false,
        sink_error: None,
    }
}

fn is_permission_denied(output: &PingOutput) -> bool {
    PERMISSION_MARKERS
        .iter()
        .any(|marker| output.stderr.contains(marker) || output.stdout.contains(marker))
}

fn failure_message(job: &Job, output: &PingOutput) -> String {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match output.exit_code {
        Some(code) => format!("No reply from {} (exit status {code})", job.target_host),
        None => format!("No reply from {} (ping terminated by signal)", job.target_host),
    }
}
