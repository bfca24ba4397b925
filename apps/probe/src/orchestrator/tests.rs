//! Agent loop tests against in-memory directory, sink and pinger fakes.
//!
//! Time is paused so interval arithmetic is driven with `tokio::time::advance`.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Agent, AgentSettings, AgentState};
use crate::config::Config;
use crate::directory::{DirectoryService, HeartbeatAck, JobListing, ResultSubmission};
use crate::error::{ConfigError, DirectoryError, ProbeError, SinkError};
use crate::monitoring::checker::{PingOutput, Pinger};
use crate::monitoring::types::{Job, JobId};
use crate::reporting::{MonitoringSink, PushStatus};

const HEALTHY_OUTPUT: &str = "\
PING target (10.0.0.1) 56(84) bytes of data.
64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=12.3 ms

--- target ping statistics ---
1 packets transmitted, 1 received, 0% packet loss, time 0ms
rtt min/avg/max/mdev = 12.300/12.300/12.300/0.000 ms
";

/// Directory whose next fetch responses are queued; an empty queue repeats the last listing
#[derive(Default)]
struct FakeDirectory {
    listings: Mutex<VecDeque<Option<Vec<Job>>>>,
    last: Mutex<Vec<Job>>,
    fetches: Mutex<usize>,
    heartbeats: Mutex<usize>,
    heartbeat_fails: bool,
    store_fails: bool,
    submissions: Mutex<Vec<ResultSubmission>>,
}

impl FakeDirectory {
    fn serving(jobs: Vec<Job>) -> Self {
        let directory = Self::default();
        directory.push_listing(Some(jobs));
        directory
    }

    /// `None` makes that fetch fail
    fn push_listing(&self, listing: Option<Vec<Job>>) {
        self.listings.lock().unwrap().push_back(listing);
    }

    fn submitted_ids(&self) -> Vec<JobId> {
        self.submissions.lock().unwrap().iter().map(|s| s.job_id).collect()
    }
}

#[async_trait]
impl DirectoryService for FakeDirectory {
    async fn fetch_jobs(&self) -> Result<JobListing, DirectoryError> {
        *self.fetches.lock().unwrap() += 1;
        let next = self.listings.lock().unwrap().pop_front();
        match next {
            Some(None) => Err(DirectoryError::Status {
                endpoint: "jobs",
                status: 503,
                body: "unavailable".into(),
            }),
            Some(Some(jobs)) => {
                *self.last.lock().unwrap() = jobs.clone();
                Ok(JobListing { jobs, ..Default::default() })
            }
            None => Ok(JobListing { jobs: self.last.lock().unwrap().clone(), ..Default::default() }),
        }
    }

    async fn heartbeat(&self) -> Result<HeartbeatAck, DirectoryError> {
        *self.heartbeats.lock().unwrap() += 1;
        if self.heartbeat_fails {
            return Err(DirectoryError::Status { endpoint: "heartbeat", status: 500, body: String::new() });
        }
        Ok(HeartbeatAck { status: Some("success".into()), ..Default::default() })
    }

    async fn submit_result(&self, submission: &ResultSubmission) -> Result<(), DirectoryError> {
        self.submissions.lock().unwrap().push(submission.clone());
        if self.store_fails {
            return Err(DirectoryError::Status { endpoint: "results", status: 500, body: "boom".into() });
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeSink {
    pushes: Mutex<Vec<(String, PushStatus)>>,
}

#[async_trait]
impl MonitoringSink for FakeSink {
    async fn push(&self, url: &str, push: &PushStatus) -> Result<(), SinkError> {
        self.pushes.lock().unwrap().push((url.to_string(), push.clone()));
        Ok(())
    }
}

/// Answers every ping with healthy output; optionally cancels a token on its first call
#[derive(Default)]
struct FakePinger {
    targets: Mutex<Vec<String>>,
    cancel_on_first: Option<CancellationToken>,
}

#[async_trait]
impl Pinger for FakePinger {
    async fn ping(&self, target: &str, _count: u32, _timeout: u64) -> Result<PingOutput, ProbeError> {
        self.targets.lock().unwrap().push(target.to_string());
        if let Some(token) = &self.cancel_on_first {
            token.cancel();
        }
        Ok(PingOutput { exit_code: Some(0), stdout: HEALTHY_OUTPUT.into(), stderr: String::new() })
    }
}

/// Takes `delay` of (paused) time per ping
struct SlowPinger {
    delay: Duration,
}

#[async_trait]
impl Pinger for SlowPinger {
    async fn ping(&self, _target: &str, _count: u32, _timeout: u64) -> Result<PingOutput, ProbeError> {
        tokio::time::sleep(self.delay).await;
        Ok(PingOutput { exit_code: Some(0), stdout: HEALTHY_OUTPUT.into(), stderr: String::new() })
    }
}

fn job(id: JobId, interval_seconds: u64) -> Job {
    Job {
        id,
        name: Some(format!("job {id}")),
        target_host: format!("host{id}.example"),
        interval_seconds,
        timeout_seconds: 5,
        retries: 1,
        monitoring_sink_url: Some(format!("http://sink.example/api/push/{id}")),
    }
}

fn settings() -> AgentSettings {
    AgentSettings {
        fetch_interval: Duration::from_secs(300),
        heartbeat_interval: Duration::from_secs(60),
        tick: Duration::from_secs(1),
    }
}

struct Harness {
    agent: Agent,
    directory: Arc<FakeDirectory>,
    sink: Arc<FakeSink>,
    pinger: Arc<FakePinger>,
    shutdown: CancellationToken,
}

fn harness_with(directory: FakeDirectory, pinger: FakePinger, shutdown: CancellationToken) -> Harness {
    let directory = Arc::new(directory);
    let sink = Arc::new(FakeSink::default());
    let pinger = Arc::new(pinger);
    let agent = Agent::new(settings(), directory.clone(), sink.clone(), pinger.clone(), shutdown.clone());
    Harness { agent, directory, sink, pinger, shutdown }
}

fn harness(directory: FakeDirectory) -> Harness {
    harness_with(directory, FakePinger::default(), CancellationToken::new())
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_fetches_heartbeats_and_runs_fresh_jobs() {
    let mut h = harness(FakeDirectory::serving(vec![job(1, 30), job(2, 30)]));

    let report = h.agent.tick().await;

    assert!(report.refreshed);
    assert!(report.heartbeat_sent);
    assert_eq!(report.executed, vec![1, 2]);
    assert_eq!(*h.pinger.targets.lock().unwrap(), vec!["host1.example", "host2.example"]);
    assert_eq!(h.directory.submitted_ids(), vec![1, 2]);

    let submissions = h.directory.submissions.lock().unwrap();
    assert!(submissions.iter().all(|s| s.success && s.sink_delivered));
    assert_eq!(submissions[0].response_time_ms, 12.3);

    let pushes = h.sink.pushes.lock().unwrap();
    assert_eq!(pushes[0].0, "http://sink.example/api/push/1");
    assert_eq!(pushes[0].1.status.to_string(), "up");
}

#[tokio::test(start_paused = true)]
async fn test_job_not_repeated_within_interval() {
    let mut h = harness(FakeDirectory::serving(vec![job(1, 30)]));

    h.agent.tick().await;
    tokio::time::advance(Duration::from_secs(29)).await;
    let report = h.agent.tick().await;
    assert!(report.executed.is_empty());
    assert!(!report.refreshed);

    tokio::time::advance(Duration::from_secs(1)).await;
    let report = h.agent.tick().await;
    assert_eq!(report.executed, vec![1]);
    assert_eq!(h.directory.submitted_ids(), vec![1, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_keeps_cached_jobs() {
    let mut h = harness(FakeDirectory::serving(vec![job(1, 30)]));
    h.directory.push_listing(None);

    h.agent.tick().await;
    tokio::time::advance(Duration::from_secs(300)).await;

    let report = h.agent.tick().await;
    assert!(report.refreshed);
    assert_eq!(*h.directory.fetches.lock().unwrap(), 2);
    assert_eq!(h.agent.cache().len(), 1);
    assert_eq!(report.executed, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_refresh_keeps_last_execution() {
    let mut h = harness(FakeDirectory::serving(vec![job(1, 600)]));

    h.agent.tick().await;
    let first_run = h.agent.cache().last_execution(1).unwrap();

    tokio::time::advance(Duration::from_secs(300)).await;
    let report = h.agent.tick().await;

    assert!(report.refreshed);
    assert!(report.executed.is_empty());
    assert_eq!(h.agent.cache().last_execution(1), Some(first_run));
}

#[tokio::test(start_paused = true)]
async fn test_removed_job_is_dropped_on_refresh() {
    let mut h = harness(FakeDirectory::serving(vec![job(1, 30), job(2, 30)]));
    h.directory.push_listing(Some(vec![job(2, 30)]));

    h.agent.tick().await;
    tokio::time::advance(Duration::from_secs(300)).await;
    let report = h.agent.tick().await;

    assert_eq!(report.executed, vec![2]);
    assert_eq!(h.agent.cache().last_execution(1), None);
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_does_not_block_next_job() {
    let directory = FakeDirectory { store_fails: true, ..Default::default() };
    directory.push_listing(Some(vec![job(1, 30), job(2, 30)]));
    let mut h = harness(directory);

    let report = h.agent.tick().await;

    assert_eq!(report.executed, vec![1, 2]);
    assert_eq!(h.directory.submitted_ids(), vec![1, 2]);
    assert!(h.agent.cache().last_execution(1).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_failure_is_tolerated() {
    let directory = FakeDirectory { heartbeat_fails: true, ..Default::default() };
    directory.push_listing(Some(vec![job(1, 30)]));
    let mut h = harness(directory);

    let report = h.agent.tick().await;
    assert!(report.heartbeat_sent);
    assert_eq!(report.executed, vec![1]);

    tokio::time::advance(Duration::from_secs(60)).await;
    let report = h.agent.tick().await;
    assert!(report.heartbeat_sent);
    assert_eq!(*h.directory.heartbeats.lock().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_between_jobs() {
    let shutdown = CancellationToken::new();
    let pinger = FakePinger { cancel_on_first: Some(shutdown.clone()), ..Default::default() };
    let mut h = harness_with(
        FakeDirectory::serving(vec![job(1, 30), job(2, 30), job(3, 30)]),
        pinger,
        shutdown,
    );

    let report = h.agent.tick().await;

    assert_eq!(report.executed, vec![1]);
    assert_eq!(h.directory.submitted_ids(), vec![1]);
    assert_eq!(h.agent.state(), AgentState::ShuttingDown);
}

#[tokio::test(start_paused = true)]
async fn test_run_returns_after_cancel() {
    let mut h = harness(FakeDirectory::serving(vec![job(1, 30)]));
    let shutdown = h.shutdown.clone();

    let handle = tokio::spawn(async move {
        h.agent.run().await;
        h.agent
    });
    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown.cancel();

    let agent = handle.await.unwrap();
    assert_eq!(agent.state(), AgentState::ShuttingDown);
    assert_eq!(agent.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_longer_than_interval_is_not_due_on_return() {
    let mut slow = job(1, 5);
    slow.timeout_seconds = 10;
    slow.retries = 3;

    let directory = Arc::new(FakeDirectory::serving(vec![slow.clone()]));
    let mut agent = Agent::new(
        settings(),
        directory.clone(),
        Arc::new(FakeSink::default()),
        Arc::new(SlowPinger { delay: Duration::from_secs(10) }),
        CancellationToken::new(),
    );

    let report = agent.tick().await;
    assert_eq!(report.executed, vec![1]);
    assert!(!agent.cache().is_due(&slow));

    let report = agent.tick().await;
    assert!(report.executed.is_empty());

    tokio::time::advance(Duration::from_secs(5)).await;
    let report = agent.tick().await;
    assert_eq!(report.executed, vec![1]);
}

#[tokio::test]
async fn test_from_config_requires_api_key() {
    let config = Config::default();

    let Some(err) = Agent::from_config(&config, CancellationToken::new()).err() else {
        panic!("agent built without an API key");
    };
    assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::MissingApiKey)));
}

#[tokio::test]
async fn test_from_config_with_api_key() {
    let mut config = Config::default();
    config.directory.api_key = Some("probe-key".into());

    let agent = Agent::from_config(&config, CancellationToken::new()).unwrap();
    assert_eq!(agent.state(), AgentState::Running);
    assert!(agent.cache().is_empty());
}
