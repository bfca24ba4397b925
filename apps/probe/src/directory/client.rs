use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::DirectoryService;
use super::types::{HeartbeatAck, JobListing, RawJobListing, ResultSubmission};
use crate::error::{DirectoryError, truncate_body};
use crate::monitoring::types::Job;

const JOBS: &str = "jobs";
const HEARTBEAT: &str = "heartbeat";
const RESULTS: &str = "results";

/// HTTP client for the job directory.
///
/// Jobs and heartbeats authenticate with the API key in the path, result
/// submission with a bearer token. The key never appears in logs or errors.
pub struct HttpDirectory {
    client: Client,
    base: Url,
    api_key: String,
}

impl HttpDirectory {
    pub fn new(base: Url, api_key: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base, api_key))
    }

    pub fn with_client(client: Client, base: Url, api_key: impl Into<String>) -> Self {
        Self { client, base, api_key: api_key.into() }
    }

    /// `{base}/api/probe/{key}/{action}`
    fn probe_endpoint(&self, action: &str) -> Url {
        self.endpoint(&["api", "probe", self.api_key.as_str(), action])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn check_status(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, DirectoryError> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DirectoryError::Status { endpoint, status: status.as_u16(), body: truncate_body(&body) })
    }

    async fn read_body(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<String, DirectoryError> {
        response
            .text()
            .await
            .map_err(|source| DirectoryError::Transport { endpoint, source: source.without_url() })
    }
}

/// Decode the job list, skipping entries that do not match the job shape.
pub(crate) fn decode_listing(body: &str) -> Result<JobListing, serde_json::Error> {
    let raw: RawJobListing = serde_json::from_str(body)?;

    if let Some(status) = raw.status.as_deref().filter(|status| *status != "success") {
        warn!(status, "Directory answered the job list with an unexpected status");
    }

    let jobs = raw
        .jobs
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Job>(value) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(error = %e, "Skipping malformed job entry");
                None
            }
        })
        .collect();

    Ok(JobListing {
        probe_id: raw.probe_id,
        probe_name: raw.probe_name,
        jobs,
        jobs_count: raw.jobs_count,
    })
}

#[async_trait::async_trait]
impl DirectoryService for HttpDirectory {
    async fn fetch_jobs(&self) -> Result<JobListing, DirectoryError> {
        let response = self
            .client
            .get(self.probe_endpoint(JOBS))
            .send()
            .await
            .map_err(|source| DirectoryError::Transport { endpoint: JOBS, source: source.without_url() })?;
        let response = Self::check_status(JOBS, response).await?;
        let body = Self::read_body(JOBS, response).await?;

        decode_listing(&body).map_err(|source| DirectoryError::Decode { endpoint: JOBS, source })
    }

    async fn heartbeat(&self) -> Result<HeartbeatAck, DirectoryError> {
        let response = self
            .client
            .post(self.probe_endpoint(HEARTBEAT))
            .send()
            .await
            .map_err(|source| DirectoryError::Transport {
                endpoint: HEARTBEAT,
                source: source.without_url(),
            })?;
        let response = Self::check_status(HEARTBEAT, response).await?;
        let body = Self::read_body(HEARTBEAT, response).await?;

        // A 200 is an accepted heartbeat whatever the body says
        Ok(serde_json::from_str(&body).unwrap_or_else(|e| {
            debug!(error = %e, "Heartbeat acknowledged without a readable body");
            HeartbeatAck::default()
        }))
    }

    async fn submit_result(&self, submission: &ResultSubmission) -> Result<(), DirectoryError> {
        let response = self
            .client
            .post(self.endpoint(&["api", RESULTS]))
            .bearer_auth(&self.api_key)
            .json(submission)
            .send()
            .await
            .map_err(|source| DirectoryError::Transport {
                endpoint: RESULTS,
                source: source.without_url(),
            })?;
        Self::check_status(RESULTS, response).await?;
        debug!(job_id = submission.job_id, "Result accepted by server");
        Ok(())
    }
}
