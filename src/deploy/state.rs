// ABOUTME: Deployment status enum and its legal transition table.
// ABOUTME: Forward-only progression with Running and Failed as the terminal states.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Validating,
    Preparing,
    Deploying,
    /// Reserved for post-start configuration steps; the engine does not enter it today.
    Configuring,
    HealthCheck,
    Running,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Validating => "validating",
            DeploymentStatus::Preparing => "preparing",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Configuring => "configuring",
            DeploymentStatus::HealthCheck => "health_check",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Running | DeploymentStatus::Failed)
    }

    /// States from which a cancel request is accepted.
    pub fn is_cancellable(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> next` appears in the transition table.
    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Validating, Preparing)
                | (Preparing, Deploying)
                | (Deploying, Configuring)
                | (Deploying, HealthCheck)
                | (Configuring, HealthCheck)
                | (HealthCheck, Running)
                | (Validating | Preparing | Deploying | Configuring | HealthCheck, Failed)
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
