// ABOUTME: Error types for remote stack lifecycle operations.
// ABOUTME: Separates rejected input from remote failures, timeouts, and cancellation.

use std::time::Duration;

use crate::cancel::Interrupted;
use crate::remote::RemoteError;
use crate::validate::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Input rejected before any remote command was issued.
    #[error("unsafe input: {0}")]
    Invalid(#[from] ValidationError),

    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        source: RemoteError,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("stack {stack} not healthy after {waited:?}")]
    HealthTimeout { stack: String, waited: Duration },

    #[error("operation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    pub fn remote(operation: &'static str, source: RemoteError) -> Self {
        match source {
            RemoteError::Timeout(timeout) => OrchestratorError::Timeout { operation, timeout },
            source => OrchestratorError::Remote { operation, source },
        }
    }

    pub fn interrupted(
        operation: &'static str,
        reason: Interrupted,
        timeout: Duration,
    ) -> Self {
        match reason {
            Interrupted::Cancelled => OrchestratorError::Cancelled,
            Interrupted::DeadlineExceeded => OrchestratorError::Timeout { operation, timeout },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestratorError::Cancelled)
    }
}

/// A cleanup phase that did not complete.
#[derive(Debug, Clone)]
pub struct CleanupFailure {
    pub phase: &'static str,
    pub error: String,
}

/// Outcome of a best-effort removal. Failures here are reported, never raised.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub failed: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn record(&mut self, phase: &'static str, error: impl ToString) {
        let error = error.to_string();
        tracing::warn!(phase, %error, "cleanup phase failed");
        self.failed.push(CleanupFailure { phase, error });
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}
