// ABOUTME: Application-wide error type for the stackwright binary.
// ABOUTME: Wraps configuration, IO, recipe, and deployment failures via thiserror.

use crate::deploy::DeployError;
use crate::orchestrator::OrchestratorError;
use crate::recipe::RecipeError;
use crate::template::RenderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid --set argument {0:?}: expected key=value")]
    InvalidSet(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error("template error: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("deployment {id} failed: {reason}")]
    Failed { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
