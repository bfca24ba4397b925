use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier the directory service assigns to a job.
pub type JobId = i64;

/// Fixed allowance added on top of the per-packet timeouts when bounding a run.
pub const EXECUTION_OVERHEAD: Duration = Duration::from_secs(5);

fn default_interval_seconds() -> u64 {
    300
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

/// A ping job as handed out by the directory service.
///
/// Jobs are snapshots: the cache replaces them wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    #[serde(default)]
    pub name: Option<String>,

    pub target_host: String,

    /// Minimum time between two executions
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Per-reply wait handed to the ping tool
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Number of echo requests per execution (at least one is always sent)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Push URL of the external monitor, if any
    #[serde(default, alias = "kuma_url")]
    pub monitoring_sink_url: Option<String>,
}

impl Job {
    /// Number of packets a single execution sends.
    pub fn probe_count(&self) -> u32 {
        self.retries.max(1)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Hard upper bound on the wall time of one execution.
    pub fn execution_budget(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
            .saturating_mul(self.probe_count())
            .saturating_add(EXECUTION_OVERHEAD)
    }

    /// Short human label for logs.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.target_host)
    }
}

/// Up/down verdict reported to the monitoring sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
}

impl ProbeStatus {
    pub fn from_success(success: bool) -> Self {
        if success { ProbeStatus::Up } else { ProbeStatus::Down }
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Up => write!(f, "up"),
            ProbeStatus::Down => write!(f, "down"),
        }
    }
}

/// Outcome of pushing one record to the monitoring sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Delivered,
    NotConfigured,
    Failed(String),
}

impl SinkOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SinkOutcome::Delivered)
    }

    pub fn error(&self) -> Option<String> {
        match self {
            SinkOutcome::Delivered => None,
            SinkOutcome::NotConfigured => Some("sink not configured".to_string()),
            SinkOutcome::Failed(error) => Some(error.clone()),
        }
    }
}

/// Result of one job execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub job_id: JobId,

    pub target_host: String,

    /// When the execution finished
    pub timestamp: DateTime<Utc>,

    pub success: bool,

    /// Wall time of the ping invocation
    pub duration_ms: f64,

    pub packets_sent: u32,

    pub packets_received: u32,

    pub packet_loss_pct: f64,

    pub min_rtt_ms: f64,

    pub avg_rtt_ms: f64,

    pub max_rtt_ms: f64,

    /// The single latency figure reported to the sink
    pub response_time_ms: f64,

    pub error_message: Option<String>,

    /// Captured standard output of the ping tool
    pub raw_output: String,

    pub sink_delivered: bool,

    pub sink_error: Option<String>,
}

impl ExecutionRecord {
    /// Record for a run that never produced usable output.
    pub fn failed(job: &Job, error: impl Into<String>) -> Self {
        Self {
            job_id: job.id,
            target_host: job.target_host.clone(),
            timestamp: Utc::now(),
            success: false,
            duration_ms: 0.0,
            packets_sent: 0,
            packets_received: 0,
            packet_loss_pct: packet_loss_pct(0, 0),
            min_rtt_ms: 0.0,
            avg_rtt_ms: 0.0,
            max_rtt_ms: 0.0,
            response_time_ms: 0.0,
            error_message: Some(error.into()),
            raw_output: String::new(),
            sink_delivered: false,
            sink_error: None,
        }
    }

    /// Attach the monitoring sink outcome.
    pub fn with_sink_outcome(mut self, outcome: SinkOutcome) -> Self {
        self.sink_delivered = outcome.is_delivered();
        self.sink_error = outcome.error();
        self
    }

    pub fn status(&self) -> ProbeStatus {
        ProbeStatus::from_success(self.success)
    }
}

/// Round to two decimals, the precision every reported figure uses.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Loss percentage; a run that sent nothing counts as total loss.
pub fn packet_loss_pct(sent: u32, received: u32) -> f64 {
    if sent == 0 {
        return 100.0;
    }
    let ratio = f64::from(received.min(sent)) / f64::from(sent);
    round2(100.0 * (1.0 - ratio))
}
