/// Job directory module - the server side this probe talks to
///
/// The same service hands out the job list, receives heartbeats and stores
/// execution results.
pub mod client;
pub mod types;

pub use client::HttpDirectory;
pub use types::{HeartbeatAck, JobListing, ResultSubmission};

use crate::error::DirectoryError;

/// Directory service operations used by the agent loop
#[async_trait::async_trait]
pub trait DirectoryService: Send + Sync {
    /// Fetch the complete job list for this probe
    async fn fetch_jobs(&self) -> Result<JobListing, DirectoryError>;

    /// Tell the server this probe is alive
    async fn heartbeat(&self) -> Result<HeartbeatAck, DirectoryError>;

    /// Store one execution result
    async fn submit_result(&self, submission: &ResultSubmission) -> Result<(), DirectoryError>;
}
