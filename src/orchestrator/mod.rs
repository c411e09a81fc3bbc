// ABOUTME: Remote stack lifecycle: deploy, health, wait, remove, and list.
// ABOUTME: Defines the orchestrator contract and its compose-backed implementation.

mod compose;
mod envfile;
mod error;
mod probe;
mod spec;

pub use compose::{ComposeOrchestrator, ComposeSettings};
pub use envfile::{HEREDOC_TERMINATOR, escape_env_value, render_env_file};
pub use error::{CleanupFailure, CleanupReport, OrchestratorError};
pub use probe::{ProbeError, probe_http};
pub use spec::{DeploymentSpec, ENV_FILE, MANIFEST_FILE, RemovalSpec, stack_dir};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cancel::CancelToken;

/// Point-in-time liveness of one stack. Consumed immediately, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub running: bool,
    pub healthy: bool,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

/// A running compose project on a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackSummary {
    pub project: String,
    pub status: String,
}

/// Executes stack lifecycle operations on remote targets.
///
/// Every method validates its inputs before issuing any remote command and
/// observes `cancel` between commands.
#[async_trait]
pub trait ContainerOrchestrator: Send + Sync {
    /// Create or update a named stack. Re-deploying an unchanged manifest is a no-op remotely.
    async fn deploy(
        &self,
        cancel: &CancelToken,
        spec: &DeploymentSpec,
    ) -> Result<(), OrchestratorError>;

    async fn health_check(
        &self,
        cancel: &CancelToken,
        stack: &str,
        host: &str,
    ) -> Result<HealthStatus, OrchestratorError>;

    /// Stop and remove a stack. Only invalid input is an error; remote
    /// failures are logged.
    async fn remove(
        &self,
        cancel: &CancelToken,
        stack: &str,
        host: &str,
        include_volumes: bool,
    ) -> Result<(), OrchestratorError>;

    /// Poll until healthy, the timeout elapses, or `cancel` fires.
    async fn wait_for_healthy(
        &self,
        cancel: &CancelToken,
        stack: &str,
        host: &str,
        timeout: Option<Duration>,
    ) -> Result<(), OrchestratorError>;

    /// Removal, forced container removal, then working directory deletion.
    ///
    /// Phase failures land in the report. Errors mean the removal could not start.
    async fn remove_with_cleanup(
        &self,
        cancel: &CancelToken,
        spec: &RemovalSpec,
    ) -> Result<CleanupReport, OrchestratorError>;

    async fn list_running_stacks(
        &self,
        cancel: &CancelToken,
        host: &str,
    ) -> Result<Vec<StackSummary>, OrchestratorError>;

    fn mode(&self) -> &'static str;
}
