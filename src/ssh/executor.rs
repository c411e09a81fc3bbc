// ABOUTME: RemoteExecutor implementation that runs each command over a fresh SSH session.
// ABOUTME: Maps host:port addresses onto session settings shared by every target.

use async_trait::async_trait;
use std::time::Duration;

use super::client::{Session, SessionConfig};
use super::error::Error;
use crate::remote::{RemoteError, RemoteExecutor};

/// Executes commands on targets over SSH.
///
/// `template` supplies user, key, and host-key policy; host and port come
/// from the address passed to each call.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    template: SessionConfig,
}

impl SshExecutor {
    pub fn new(template: SessionConfig) -> Self {
        Self { template }
    }

    fn session_config(&self, address: &str) -> Result<SessionConfig, Error> {
        let (host, port) = split_address(address)?;
        let mut config = self.template.clone();
        config.host = host;
        config.port = port;
        Ok(config)
    }

    async fn run(
        &self,
        address: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, RemoteError> {
        let config = self
            .session_config(address)
            .map_err(|e| connection_error(address, e))?;

        let session = Session::connect(config)
            .await
            .map_err(|e| connection_error(address, e))?;

        tracing::debug!(host = %address, command = %first_line(command), "executing remote command");
        let result = session.exec_with_timeout(command, timeout).await;

        if let Err(e) = session.disconnect().await {
            tracing::debug!(host = %address, "ssh disconnect failed: {}", e);
        }

        match result {
            Ok(output) if output.succeeded() => Ok(output.stdout),
            Ok(output) => Err(RemoteError::CommandFailed {
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }),
            Err(Error::Timeout(t)) => Err(RemoteError::Timeout(t)),
            Err(e) => Err(connection_error(address, e)),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, host: &str, command: &str) -> Result<String, RemoteError> {
        self.run(host, command, self.template.command_timeout).await
    }

    async fn execute_with_timeout(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, RemoteError> {
        self.run(host, command, timeout).await
    }
}

fn connection_error(address: &str, e: Error) -> RemoteError {
    RemoteError::Connection {
        host: address.to_string(),
        reason: e.to_string(),
    }
}

/// Split `host:port` (or `[v6]:port`) into its parts.
fn split_address(address: &str) -> Result<(String, u16), Error> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| Error::Address(address.to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::Address(address.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(Error::Address(address.to_string()));
    }
    Ok((host.to_string(), port))
}

/// Heredoc payloads make full commands noisy in logs.
fn first_line(command: &str) -> &str {
    command.lines().next().unwrap_or_default()
}
