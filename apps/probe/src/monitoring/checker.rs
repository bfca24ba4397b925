use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::ProbeError;

/// Captured result of one ping tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl PingOutput {
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a reachability check against a host.
///
/// Implementations only report what the tool printed; interpretation happens
/// in the executor.
#[async_trait::async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(
        &self,
        target: &str,
        count: u32,
        timeout_seconds: u64,
    ) -> Result<PingOutput, ProbeError>;
}

/// Pinger backed by the platform `ping` binary
pub struct SystemPinger {
    program: String,
}

impl SystemPinger {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn command(&self, target: &str, count: u32, timeout_seconds: u64) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-c")
            .arg(count.to_string())
            .arg("-W")
            .arg(timeout_seconds.to_string())
            .arg(target)
            // Output is parsed, keep it in the C locale
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait::async_trait]
impl Pinger for SystemPinger {
    async fn ping(
        &self,
        target: &str,
        count: u32,
        timeout_seconds: u64,
    ) -> Result<PingOutput, ProbeError> {
        debug!(program = %self.program, host = target, count, timeout_seconds, "Spawning ping");

        let output = self
            .command(target, count, timeout_seconds)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn { program: self.program.clone(), source })?;

        let result = PingOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(host = target, exit_code = ?result.exit_code, "Ping finished");
        if !result.stderr.is_empty() {
            debug!(host = target, stderr = %result.stderr.trim(), "Ping wrote to stderr");
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        let pinger = SystemPinger::new("ping");
        let command = pinger.command("example.com", 3, 10);
        let args: Vec<_> =
            command.as_std().get_args().map(|arg| arg.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-c", "3", "-W", "10", "example.com"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let pinger = SystemPinger::new("/nonexistent/definitely-not-ping");
        let err = pinger.ping("example.com", 1, 1).await.unwrap_err();
        assert!(matches!(err, ProbeError::Spawn { .. }));
        assert!(err.to_string().contains("definitely-not-ping"));
    }
}
