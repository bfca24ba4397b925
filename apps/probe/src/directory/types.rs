use serde::{Deserialize, Serialize};

use crate::monitoring::types::{ExecutionRecord, Job, JobId};

/// Decoded `GET /api/probe/{key}/jobs` response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobListing {
    pub probe_id: Option<i64>,
    pub probe_name: Option<String>,
    pub jobs: Vec<Job>,
    /// Count announced by the server, for cross-checking `jobs`
    pub jobs_count: Option<usize>,
}

/// Wire shape of the job listing; jobs are decoded one by one afterwards
#[derive(Debug, Deserialize)]
pub(crate) struct RawJobListing {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub probe_id: Option<i64>,
    #[serde(default)]
    pub probe_name: Option<String>,
    pub jobs: Vec<serde_json::Value>,
    #[serde(default)]
    pub jobs_count: Option<usize>,
}

/// Heartbeat acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HeartbeatAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Body of `POST /api/results`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub job_id: JobId,
    pub success: bool,
    pub response_time_ms: f64,
    pub packets_sent: u32,
    pub packets_received: u32,
    pub error_message: Option<String>,
    pub sink_delivered: bool,
    pub sink_error: Option<String>,
}

impl ResultSubmission {
    pub fn new(job_id: JobId, record: &ExecutionRecord) -> Self {
        Self {
            job_id,
            success: record.success,
            response_time_ms: record.response_time_ms,
            packets_sent: record.packets_sent,
            packets_received: record.packets_received,
            error_message: record.error_message.clone(),
            sink_delivered: record.sink_delivered,
            sink_error: record.sink_error.clone(),
        }
    }
}

impl From<&ExecutionRecord> for ResultSubmission {
    fn from(record: &ExecutionRecord) -> Self {
        Self::new(record.job_id, record)
    }
}
