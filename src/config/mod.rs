// ABOUTME: Configuration types and parsing for stackwright.yml.
// ABOUTME: Every section is optional; converters hand settings to the library layers.

mod dependencies;
mod deploy;
mod health;
mod render;
mod server;
mod ssh;

pub use dependencies::DependenciesConfig;
pub use deploy::DeployConfig;
pub use health::HealthConfig;
pub use render::RenderConfig;
pub use server::ServerAddress;
pub use ssh::SshConfig;

use crate::deploy::EngineSettings;
use crate::deps::DependencySettings;
use crate::error::{Error, Result};
use crate::orchestrator::ComposeSettings;
use crate::ssh::SessionConfig;
use crate::template::TemplateRenderer;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "stackwright.yml";
pub const CONFIG_FILENAME_ALT: &str = "stackwright.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".stackwright/config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub dependencies: DependenciesConfig,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the first config file found in `dir`, or defaults when there is none.
    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        crate::validate::validate_path("deploy.stacks_dir", &self.deploy.stacks_dir)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if self.deploy.compose_command.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "deploy.compose_command cannot be empty".to_string(),
            ));
        }
        if self.render.max_output_bytes == 0 {
            return Err(Error::InvalidConfig(
                "render.max_output_bytes must be positive".to_string(),
            ));
        }
        if self.health.poll_interval.is_zero() || self.dependencies.poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "poll_interval must be positive".to_string(),
            ));
        }
        if self.dependencies.min_wait > self.dependencies.max_wait {
            return Err(Error::InvalidConfig(
                "dependencies.min_wait exceeds dependencies.max_wait".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            stacks_dir: self.deploy.stacks_dir.clone(),
            deploy_timeout: self.deploy.timeout,
            health_grace: self.deploy.health_grace,
        }
    }

    pub fn compose_settings(&self) -> ComposeSettings {
        ComposeSettings {
            compose_command: self.deploy.compose_command.clone(),
            container_cli: container_cli(&self.deploy.compose_command),
            deploy_timeout: self.deploy.timeout,
            wait_timeout: self.health.wait_timeout,
            poll_interval: self.health.poll_interval,
            ..ComposeSettings::default()
        }
    }

    pub fn dependency_settings(&self) -> DependencySettings {
        DependencySettings {
            default_proxy: self.dependencies.default_proxy.clone(),
            default_database: self.dependencies.default_database.clone(),
            default_cache: self.dependencies.default_cache.clone(),
            poll_interval: self.dependencies.poll_interval,
            min_wait: self.dependencies.min_wait,
            max_wait: self.dependencies.max_wait,
            stacks_dir: self.deploy.stacks_dir.clone(),
            deploy_timeout: self.deploy.timeout,
        }
    }

    pub fn renderer(&self) -> TemplateRenderer {
        TemplateRenderer::new(self.render.timeout, self.render.max_output_bytes)
    }

    /// SSH session parameters for one target address.
    pub fn session(&self, address: &ServerAddress) -> SessionConfig {
        let user = address
            .user
            .clone()
            .or_else(|| self.ssh.user.clone())
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()));

        let mut session = SessionConfig::new(&address.host, user)
            .port(address.port)
            .trust_on_first_use(self.ssh.trust_first_connection)
            .command_timeout(self.ssh.command_timeout);
        if let Some(ref key) = self.ssh.key_path {
            session = session.key_path(key);
        }
        if let Some(ref known_hosts) = self.ssh.known_hosts_path {
            session = session.known_hosts_path(known_hosts);
        }
        session
    }
}

/// The container CLI that goes with a compose invocation:
/// `docker compose` and `docker-compose` map to `docker`, `podman-compose` to `podman`.
fn container_cli(compose_command: &str) -> String {
    let first = compose_command.split_whitespace().next().unwrap_or("docker");
    first
        .strip_suffix("-compose")
        .unwrap_or(first)
        .to_string()
}
