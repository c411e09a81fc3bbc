// ABOUTME: Error types for deployment creation, cancellation, deletion, and execution.
// ABOUTME: Each error maps to a kind that callers use to choose a response.

use std::time::Duration;

use crate::deps::DependencyError;
use crate::orchestrator::OrchestratorError;
use crate::remote::RemoteError;
use crate::template::RenderError;
use crate::types::{DeploymentId, TargetId};
use crate::validate::ValidationError;

use super::state::DeploymentStatus;
use super::store::StoreError;

/// Coarse category of a [`DeployError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    /// Malformed request, missing required option, or a template that does not render.
    Validation,
    /// Input that would be unsafe to interpolate into a remote command.
    Security,
    Connection,
    Timeout,
    Provisioning,
    Cancelled,
    NotFound,
    /// The operation conflicts with the deployment's current state.
    Conflict,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("recipe not found: {0}")]
    RecipeNotFound(String),

    #[error("target not found: {0}")]
    TargetNotFound(TargetId),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    #[error("target {0} is offline")]
    TargetOffline(TargetId),

    #[error("deployment {0} is still in progress; cancel it first")]
    InFlight(DeploymentId),

    #[error("deployment {0} has already finished")]
    AlreadyFinished(DeploymentId),

    #[error("missing required options: {}", .0.join(", "))]
    MissingOptions(Vec<String>),

    #[error("invalid template: {0}")]
    Template(RenderError),

    #[error(transparent)]
    Unsafe(#[from] ValidationError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("dependency provisioning failed: {0}")]
    Dependencies(#[from] DependencyError),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("deployment cancelled")]
    Cancelled,

    #[error("deployment {id} is {status}; {action} not allowed")]
    InvalidState {
        id: DeploymentId,
        status: DeploymentStatus,
        action: &'static str,
    },

    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    #[error("no stack is running for {0}")]
    NotRunning(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::RecipeNotFound(_)
            | DeployError::TargetNotFound(_)
            | DeployError::DeploymentNotFound(_) => DeployErrorKind::NotFound,
            DeployError::TargetOffline(_) => DeployErrorKind::Connection,
            DeployError::InFlight(_) | DeployError::AlreadyFinished(_) => {
                DeployErrorKind::Conflict
            }
            DeployError::MissingOptions(_) => DeployErrorKind::Validation,
            DeployError::Template(e) if e.is_timeout() => DeployErrorKind::Timeout,
            DeployError::Template(_) => DeployErrorKind::Validation,
            DeployError::Unsafe(_) => DeployErrorKind::Security,
            DeployError::Orchestrator(e) => match e {
                OrchestratorError::Invalid(_) => DeployErrorKind::Security,
                OrchestratorError::Remote { source, .. } => match source {
                    RemoteError::Timeout(_) => DeployErrorKind::Timeout,
                    _ => DeployErrorKind::Connection,
                },
                OrchestratorError::Timeout { .. } | OrchestratorError::HealthTimeout { .. } => {
                    DeployErrorKind::Timeout
                }
                OrchestratorError::Cancelled => DeployErrorKind::Cancelled,
            },
            DeployError::Dependencies(e) if e.is_cancelled() => DeployErrorKind::Cancelled,
            DeployError::Dependencies(_) => DeployErrorKind::Provisioning,
            DeployError::Timeout { .. } => DeployErrorKind::Timeout,
            DeployError::Cancelled => DeployErrorKind::Cancelled,
            DeployError::InvalidState { .. } | DeployError::IllegalTransition { .. } => {
                DeployErrorKind::Conflict
            }
            DeployError::NotRunning(_) => DeployErrorKind::Connection,
            DeployError::Store(StoreError::NotFound(_)) => DeployErrorKind::NotFound,
            DeployError::Store(StoreError::Duplicate(_)) => DeployErrorKind::Conflict,
            DeployError::Store(StoreError::Backend(_)) => DeployErrorKind::Connection,
        }
    }

    /// Text stored in `error_details` and the deployment log.
    pub fn details(&self) -> String {
        match self.kind() {
            DeployErrorKind::Cancelled => "deployment cancelled".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<RenderError> for DeployError {
    fn from(err: RenderError) -> Self {
        DeployError::Template(err)
    }
}
