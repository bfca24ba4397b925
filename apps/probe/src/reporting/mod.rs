/// Reporting module - pushes execution outcomes to external monitors
pub mod sink;

pub use sink::{HttpSink, MonitoringSink, PushStatus, sanitize_sink_url};
