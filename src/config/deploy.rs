// ABOUTME: Deployment execution settings.
// ABOUTME: Timeouts, the remote stacks root, and the compose invocation.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_health_grace", with = "humantime_serde")]
    pub health_grace: Duration,

    #[serde(default = "default_stacks_dir")]
    pub stacks_dir: String,

    #[serde(default = "default_compose_command")]
    pub compose_command: String,
}

fn default_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_health_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_stacks_dir() -> String {
    "/opt/stackwright/stacks".to_string()
}

fn default_compose_command() -> String {
    "docker compose".to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            health_grace: default_health_grace(),
            stacks_dir: default_stacks_dir(),
            compose_command: default_compose_command(),
        }
    }
}
