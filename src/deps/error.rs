// ABOUTME: Errors from dependency checks and provisioning.
// ABOUTME: Any provisioning failure aborts the remaining plans.

use std::time::Duration;

use crate::orchestrator::OrchestratorError;
use crate::template::RenderError;
use crate::validate::ValidationError;

use super::pool::PoolError;

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("checking {dependency} failed: {source}")]
    Check {
        dependency: String,
        source: PoolError,
    },

    #[error("{dependency} cannot be auto-provisioned: {reason}")]
    NotProvisionable { dependency: String, reason: String },

    #[error("recipe not found: {0}")]
    RecipeNotFound(String),

    #[error("rendering {slug} failed: {source}")]
    Render { slug: String, source: RenderError },

    #[error("invalid stack for {slug}: {source}")]
    Invalid {
        slug: String,
        source: ValidationError,
    },

    #[error("deploying {slug} failed: {source}")]
    Deploy {
        slug: String,
        source: OrchestratorError,
    },

    #[error("provisioning {dependency} failed: {source}")]
    Pool {
        dependency: String,
        source: PoolError,
    },

    #[error("no running stack with prefix {prefix} after {waited:?}")]
    NotRunning { prefix: String, waited: Duration },

    #[error("recording {slug} failed: {reason}")]
    Record { slug: String, reason: String },

    #[error("dependency provisioning cancelled")]
    Cancelled,
}

impl DependencyError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            DependencyError::Cancelled => true,
            DependencyError::Deploy { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
