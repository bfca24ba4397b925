use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::directory::{DirectoryService, ResultSubmission};
use crate::monitoring::types::{ExecutionRecord, Job, JobId, SinkOutcome};
use crate::reporting::{MonitoringSink, PushStatus};

/// Sends each execution record to the monitoring sink and the result store.
///
/// The two deliveries are independent: a sink failure only annotates the
/// record, a store failure is logged. Neither is retried; the next scheduled
/// run of the job is the retry.
pub struct ResultDispatcher {
    sink: Arc<dyn MonitoringSink>,
    store: Arc<dyn DirectoryService>,
}

impl ResultDispatcher {
    pub fn new(sink: Arc<dyn MonitoringSink>, store: Arc<dyn DirectoryService>) -> Self {
        Self { sink, store }
    }

    /// Push the record to the job's sink and attach the outcome.
    pub async fn dispatch(&self, job: &Job, record: ExecutionRecord) -> ExecutionRecord {
        let outcome = self.push_to_sink(job, &record).await;
        record.with_sink_outcome(outcome)
    }

    async fn push_to_sink(&self, job: &Job, record: &ExecutionRecord) -> SinkOutcome {
        let Some(url) = job.monitoring_sink_url.as_deref().filter(|url| !url.trim().is_empty())
        else {
            warn!(job_id = job.id, "Could not push result: sink URL not configured for job");
            return SinkOutcome::NotConfigured;
        };

        let push = PushStatus::from_record(record);
        info!(job_id = job.id, status = %push.status, ping = ?push.ping, "Pushing result to monitoring sink");

        match self.sink.push(url, &push).await {
            Ok(()) => {
                info!(job_id = job.id, "Result pushed to monitoring sink");
                SinkOutcome::Delivered
            }
            Err(e) => {
                error!(job_id = job.id, error = %e, "Error pushing result to monitoring sink");
                SinkOutcome::Failed(e.to_string())
            }
        }
    }

    /// Report the record to the result store. Returns whether it was accepted.
    pub async fn submit(&self, job_id: JobId, record: &ExecutionRecord) -> bool {
        let submission = ResultSubmission::new(job_id, record);
        match self.store.submit_result(&submission).await {
            Ok(()) => {
                debug!(job_id, "Result sent to server");
                true
            }
            Err(e) => {
                error!(job_id, error = %e, "Error sending result to server");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{HeartbeatAck, JobListing};
    use crate::error::{DirectoryError, SinkError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        pushes: Mutex<Vec<(String, PushStatus)>>,
        fail_with: Option<u16>,
    }

    #[async_trait::async_trait]
    impl MonitoringSink for RecordingSink {
        async fn push(&self, url: &str, push: &PushStatus) -> Result<(), SinkError> {
            self.pushes.lock().unwrap().push((url.to_string(), push.clone()));
            match self.fail_with {
                Some(status) => Err(SinkError::Status { status, body: "nope".into() }),
                None => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        submissions: Mutex<Vec<ResultSubmission>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl DirectoryService for RecordingStore {
        async fn fetch_jobs(&self) -> Result<JobListing, DirectoryError> {
            Ok(JobListing::default())
        }

        async fn heartbeat(&self) -> Result<HeartbeatAck, DirectoryError> {
            Ok(HeartbeatAck::default())
        }

        async fn submit_result(&self, submission: &ResultSubmission) -> Result<(), DirectoryError> {
            self.submissions.lock().unwrap().push(submission.clone());
            if self.fail {
                return Err(DirectoryError::Status {
                    endpoint: "results",
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(())
        }
    }

    fn job(sink: Option<&str>) -> Job {
        Job {
            id: 9,
            name: None,
            target_host: "example.com".into(),
            interval_seconds: 60,
            timeout_seconds: 10,
            retries: 3,
            monitoring_sink_url: sink.map(String::from),
        }
    }

    fn up_record(job: &Job) -> ExecutionRecord {
        let mut record = ExecutionRecord::failed(job, "unused");
        record.success = true;
        record.error_message = None;
        record.response_time_ms = 12.5;
        record
    }

    #[tokio::test]
    async fn test_dispatch_without_sink_url() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = ResultDispatcher::new(sink.clone(), Arc::new(RecordingStore::default()));

        let job = job(None);
        let record = dispatcher.dispatch(&job, up_record(&job)).await;

        assert!(!record.sink_delivered);
        assert_eq!(record.sink_error.as_deref(), Some("sink not configured"));
        assert!(sink.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_delivered() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = ResultDispatcher::new(sink.clone(), Arc::new(RecordingStore::default()));

        let job = job(Some("http://sink/push?token=x"));
        let record = dispatcher.dispatch(&job, up_record(&job)).await;

        assert!(record.sink_delivered);
        assert_eq!(record.sink_error, None);
        let pushes = sink.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].1.ping.as_deref(), Some("12.5"));
    }

    #[tokio::test]
    async fn test_sink_failure_only_annotates() {
        let sink = Arc::new(RecordingSink { fail_with: Some(404), ..Default::default() });
        let store = Arc::new(RecordingStore::default());
        let dispatcher = ResultDispatcher::new(sink, store.clone());

        let job = job(Some("http://sink/push"));
        let record = dispatcher.dispatch(&job, up_record(&job)).await;
        assert!(record.success);
        assert!(!record.sink_delivered);
        assert_eq!(record.sink_error.as_deref(), Some("HTTP Error 404: nope"));

        assert!(dispatcher.submit(job.id, &record).await);
        let submissions = store.submissions.lock().unwrap();
        assert_eq!(submissions[0].sink_error.as_deref(), Some("HTTP Error 404: nope"));
        assert!(!submissions[0].sink_delivered);
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let store = Arc::new(RecordingStore { fail: true, ..Default::default() });
        let dispatcher = ResultDispatcher::new(Arc::new(RecordingSink::default()), store.clone());

        let job = job(None);
        let record = up_record(&job);
        assert!(!dispatcher.submit(job.id, &record).await);
        assert_eq!(store.submissions.lock().unwrap().len(), 1);
    }
}
