use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{SinkError, truncate_body};
use crate::monitoring::types::{ExecutionRecord, ProbeStatus};

/// Parameters of one push, rebuilt from the record every time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushStatus {
    pub status: ProbeStatus,
    pub msg: String,
    /// Only present for successful runs
    pub ping: Option<String>,
}

impl PushStatus {
    pub fn from_record(record: &ExecutionRecord) -> Self {
        let default_msg = if record.success { "OK" } else { "Failed" };
        let msg = record
            .error_message
            .as_deref()
            .map(str::trim)
            .filter(|msg| !msg.is_empty())
            .unwrap_or(default_msg)
            .to_string();

        Self {
            status: record.status(),
            msg,
            ping: record.success.then(|| format_ping(record.response_time_ms)),
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("status", self.status.to_string()), ("msg", self.msg.clone())];
        if let Some(ping) = &self.ping {
            pairs.push(("ping", ping.clone()));
        }
        pairs
    }
}

/// Milliseconds as sent in `ping`; whole values keep one decimal (`14.0`).
fn format_ping(ms: f64) -> String {
    if ms.fract() == 0.0 { format!("{ms:.1}") } else { ms.to_string() }
}

/// Parse the configured sink URL and drop any query string or fragment it carries.
pub fn sanitize_sink_url(raw: &str) -> Result<Url, SinkError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|source| SinkError::InvalidUrl { url: raw.to_string(), source })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(SinkError::UnsupportedScheme(other.to_string())),
    }

    if url.query().is_some() {
        debug!("Removed query parameters from sink URL");
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Destination for up/down pushes (e.g. an Uptime Kuma push monitor)
#[async_trait::async_trait]
pub trait MonitoringSink: Send + Sync {
    async fn push(&self, url: &str, push: &PushStatus) -> Result<(), SinkError>;
}

/// Push-monitor client issuing `GET <url>?status=..&msg=..[&ping=..]`
pub struct HttpSink {
    client: Client,
}

impl HttpSink {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl MonitoringSink for HttpSink {
    async fn push(&self, url: &str, push: &PushStatus) -> Result<(), SinkError> {
        let url = sanitize_sink_url(url)?;

        let response = self
            .client
            .get(url)
            .query(&push.query_pairs())
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.without_url()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %truncate_body(&body), "Sink response");

        if status != StatusCode::OK {
            return Err(SinkError::Status { status: status.as_u16(), body: truncate_body(&body) });
        }
        Ok(())
    }
}
