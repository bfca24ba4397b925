pub mod checker;
/// Monitoring engine module - runs ping jobs
///
/// This module is responsible for:
/// - Invoking the platform ping tool with a hard time bound
/// - Parsing its output into statistics
/// - Caching the job list and deciding which jobs are due
/// - Validating jobs received from the directory
pub mod executor;
pub mod parser;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use executor::ProbeExecutor;
pub use scheduler::{Cadence, JobCache};
pub use types::{ExecutionRecord, Job, JobId};
