/// Orchestrator module - the probe agent loop
///
/// The agent is the only owner of the job cache and scheduler state. Each
/// tick it:
/// - refreshes the job list when the fetch interval has elapsed
/// - sends a heartbeat when the heartbeat interval has elapsed
/// - runs every due job in turn (execute, push to sink, submit to store)
///
/// Jobs run one after another on a single task. Shutdown is cooperative: the
/// cancellation token is checked at the top of each tick and between jobs.
pub mod dispatcher;
pub mod shutdown;

#[cfg(test)]
mod tests;

pub use dispatcher::ResultDispatcher;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::directory::{DirectoryService, HttpDirectory};
use crate::monitoring::checker::{Pinger, SystemPinger};
use crate::monitoring::scheduler::{Cadence, JobCache};
use crate::monitoring::types::{Job, JobId};
use crate::monitoring::ProbeExecutor;
use crate::reporting::{HttpSink, MonitoringSink};

/// Lifecycle of the agent loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Running,
    ShuttingDown,
}

/// Timing knobs of the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub fetch_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Pause between ticks
    pub tick: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(60),
            tick: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for AgentSettings {
    fn from(config: &Config) -> Self {
        Self {
            fetch_interval: Duration::from_secs(config.schedule.fetch_interval_seconds),
            heartbeat_interval: Duration::from_secs(config.schedule.heartbeat_interval_seconds),
            tick: Duration::from_millis(config.schedule.tick_millis),
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub refreshed: bool,
    pub heartbeat_sent: bool,
    pub executed: Vec<JobId>,
}

/// Main agent for the probe
pub struct Agent {
    settings: AgentSettings,
    directory: Arc<dyn DirectoryService>,
    executor: ProbeExecutor,
    dispatcher: ResultDispatcher,
    cache: JobCache,
    fetch: Cadence,
    heartbeat: Cadence,
    state: AgentState,
    shutdown: CancellationToken,
}

impl Agent {
    pub fn new(
        settings: AgentSettings,
        directory: Arc<dyn DirectoryService>,
        sink: Arc<dyn MonitoringSink>,
        pinger: Arc<dyn Pinger>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            fetch: Cadence::new(settings.fetch_interval),
            heartbeat: Cadence::new(settings.heartbeat_interval),
            settings,
            dispatcher: ResultDispatcher::new(sink, directory.clone()),
            directory,
            executor: ProbeExecutor::new(pinger),
            cache: JobCache::new(),
            state: AgentState::Running,
            shutdown,
        }
    }

    /// Build an agent talking HTTP to the configured server.
    ///
    /// Fails when the API key is missing.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let api_key = config.api_key()?;
        let base = config.server_url()?;

        let directory = HttpDirectory::new(
            base,
            api_key,
            Duration::from_secs(config.directory.request_timeout_seconds),
        )
        .context("Failed to build directory HTTP client")?;
        let sink = HttpSink::new(Duration::from_secs(config.probe.sink_timeout_seconds))
            .context("Failed to build sink HTTP client")?;
        let pinger = SystemPinger::new(config.probe.ping_program.clone());

        Ok(Self::new(
            AgentSettings::from(config),
            Arc::new(directory),
            Arc::new(sink),
            Arc::new(pinger),
            shutdown,
        ))
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn cache(&self) -> &JobCache {
        &self.cache
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(&mut self) {
        info!(
            fetch_interval_secs = self.settings.fetch_interval.as_secs(),
            heartbeat_interval_secs = self.settings.heartbeat_interval.as_secs(),
            "===== Starting probe agent ====="
        );

        while self.observe_shutdown() == AgentState::Running {
            let report = self.tick().await;
            if !report.executed.is_empty() {
                debug!(executed = ?report.executed, "Tick finished");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.tick) => {}
                _ = self.shutdown.cancelled() => {}
            }
        }

        info!("===== Shutting down probe agent =====");
    }

    fn observe_shutdown(&mut self) -> AgentState {
        if self.state == AgentState::Running && self.shutdown.is_cancelled() {
            info!("Termination requested, stopping after current work");
            self.state = AgentState::ShuttingDown;
        }
        self.state
    }

    /// One loop iteration: refresh, heartbeat, then every due job.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let now = Instant::now();

        if self.fetch.is_due(now) {
            self.cache.refresh(self.directory.as_ref()).await;
            self.fetch.mark(now);
            report.refreshed = true;
        }

        if self.heartbeat.is_due(now) {
            self.send_heartbeat().await;
            self.heartbeat.mark(now);
            report.heartbeat_sent = true;
        }

        for job in self.cache.due_jobs(now) {
            if self.observe_shutdown() == AgentState::ShuttingDown {
                break;
            }
            self.run_job(&job).await;
            self.cache.mark_executed(job.id, Instant::now());
            report.executed.push(job.id);
        }

        report
    }

    async fn send_heartbeat(&self) {
        match self.directory.heartbeat().await {
            Ok(ack) => debug!(message = ack.message.as_deref().unwrap_or("-"), "Heartbeat sent"),
            Err(e) => warn!(error = %e, "Error sending heartbeat"),
        }
    }

    async fn run_job(&self, job: &Job) {
        let record = self.executor.execute(job).await;
        let record = self.dispatcher.dispatch(job, record).await;
        self.dispatcher.submit(job.id, &record).await;
    }
}
