// ABOUTME: Remote command execution contract used by the orchestrator and engine.
// ABOUTME: One blocking command per call against a host:port target.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from executing a command on a remote target.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command exited with status {exit_code}: {stderr}")]
    CommandFailed { exit_code: u32, stderr: String },
}

/// Executes shell commands on remote targets.
///
/// Implementations return stdout on exit status 0 and
/// [`RemoteError::CommandFailed`] otherwise. Callers are responsible for
/// validating everything they interpolate into `command`.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command with the implementation's default timeout.
    async fn execute(&self, host: &str, command: &str) -> Result<String, RemoteError>;

    /// Run a command bounded by `timeout`.
    async fn execute_with_timeout(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, RemoteError>;
}
