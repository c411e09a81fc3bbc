// ABOUTME: ContainerOrchestrator backed by a compose-compatible CLI on the target.
// ABOUTME: Builds validated shell commands and runs them through a RemoteExecutor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::envfile::{contains_terminator, heredoc_write, render_env_file};
use super::error::{CleanupReport, OrchestratorError};
use super::spec::{DeploymentSpec, RemovalSpec};
use super::{ContainerOrchestrator, HealthStatus, StackSummary};
use crate::cancel::CancelToken;
use crate::remote::RemoteExecutor;
use crate::validate::{ValidationError, validate_host, validate_name};

/// Compose project label set on every container compose creates.
const PROJECT_LABEL: &str = "com.docker.compose.project";

/// Tunables for [`ComposeOrchestrator`].
#[derive(Debug, Clone)]
pub struct ComposeSettings {
    /// Invocation prefix, e.g. `docker compose` or `podman-compose`.
    pub compose_command: String,
    /// CLI used for `ps` and forced removal.
    pub container_cli: String,
    /// Applied when a [`DeploymentSpec`] carries no timeout.
    pub deploy_timeout: Duration,
    /// Applied when `wait_for_healthy` is called without a timeout.
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    /// Bound for short commands (mkdir, writes, ps, down).
    pub command_timeout: Duration,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            compose_command: "docker compose".to_string(),
            container_cli: "docker".to_string(),
            deploy_timeout: Duration::from_secs(600),
            wait_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            command_timeout: Duration::from_secs(120),
        }
    }
}

pub struct ComposeOrchestrator {
    executor: Arc<dyn RemoteExecutor>,
    settings: ComposeSettings,
}

impl std::fmt::Debug for ComposeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeOrchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ComposeOrchestrator {
    pub fn new(executor: Arc<dyn RemoteExecutor>, settings: ComposeSettings) -> Self {
        Self { executor, settings }
    }

    pub fn settings(&self) -> &ComposeSettings {
        &self.settings
    }

    /// Run one command, bounded by `timeout` and the token's deadline.
    ///
    /// Cancellation stops waiting on the command; the remote process keeps running.
    async fn run(
        &self,
        cancel: &CancelToken,
        operation: &'static str,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, OrchestratorError> {
        cancel
            .check()
            .map_err(|r| OrchestratorError::interrupted(operation, r, timeout))?;
        let bound = cancel.remaining().map_or(timeout, |left| left.min(timeout));

        tokio::select! {
            result = self.executor.execute_with_timeout(host, command, bound) => {
                result.map_err(|e| OrchestratorError::remote(operation, e))
            }
            reason = cancel.interrupted() => {
                tracing::debug!(host, operation, "stopped waiting on remote command");
                Err(OrchestratorError::interrupted(operation, reason, timeout))
            }
        }
    }

    fn checkpoint(cancel: &CancelToken, operation: &'static str) -> Result<(), OrchestratorError> {
        cancel
            .check()
            .map_err(|r| OrchestratorError::interrupted(operation, r, Duration::ZERO))
    }

    fn down_command(&self, stack: &str, working_dir: Option<&str>, volumes: bool) -> String {
        let mut cmd = String::new();
        if let Some(dir) = working_dir {
            cmd.push_str(&format!("cd '{}' && ", dir));
        }
        cmd.push_str(&format!(
            "{} -p {} down --remove-orphans",
            self.settings.compose_command, stack
        ));
        if volumes {
            cmd.push_str(" --volumes");
        }
        cmd
    }

    fn ps_command(&self, stack: &str) -> String {
        format!(
            "{} ps --filter label={}={} --format '{{{{.Status}}}}'",
            self.settings.container_cli, PROJECT_LABEL, stack
        )
    }
}

#[async_trait]
impl ContainerOrchestrator for ComposeOrchestrator {
    async fn deploy(
        &self,
        cancel: &CancelToken,
        spec: &DeploymentSpec,
    ) -> Result<(), OrchestratorError> {
        spec.validate()?;
        let manifest_path = spec.manifest_path()?;
        let env_path = spec.env_path()?;
        let timeout = spec.timeout.unwrap_or(self.settings.deploy_timeout);
        let short = self.settings.command_timeout;
        let host = spec.host.as_str();

        Self::checkpoint(cancel, "deploy")?;

        tracing::info!(stack = %spec.stack_name, host, "deploying stack");
        self.run(
            cancel,
            "create working directory",
            host,
            &format!("mkdir -p '{}'", spec.working_dir),
            short,
        )
        .await?;

        self.run(
            cancel,
            "write manifest",
            host,
            &heredoc_write(&manifest_path, &spec.manifest),
            short,
        )
        .await?;

        if !spec.env.is_empty() {
            let env_file = render_env_file(&spec.env);
            if contains_terminator(&env_file) {
                return Err(ValidationError::HeredocTerminator.into());
            }
            self.run(
                cancel,
                "write env file",
                host,
                &heredoc_write(&env_path, &env_file),
                short,
            )
            .await?;
        }

        Self::checkpoint(cancel, "deploy")?;

        let up = format!(
            "cd '{}' && {} -p {} up -d --remove-orphans",
            spec.working_dir, self.settings.compose_command, spec.stack_name
        );
        self.run(cancel, "start stack", host, &up, timeout).await?;

        tracing::info!(stack = %spec.stack_name, host, "stack started");
        Ok(())
    }

    async fn health_check(
        &self,
        cancel: &CancelToken,
        stack: &str,
        host: &str,
    ) -> Result<HealthStatus, OrchestratorError> {
        validate_host(host)?;
        validate_name("stack name", stack)?;

        let output = self
            .run(
                cancel,
                "health check",
                host,
                &self.ps_command(stack),
                self.settings.command_timeout,
            )
            .await?;
        Ok(parse_health(&output))
    }

    async fn remove(
        &self,
        cancel: &CancelToken,
        stack: &str,
        host: &str,
        include_volumes: bool,
    ) -> Result<(), OrchestratorError> {
        validate_host(host)?;
        validate_name("stack name", stack)?;

        let command = self.down_command(stack, None, include_volumes);
        if let Err(e) = self
            .run(cancel, "remove stack", host, &command, self.settings.command_timeout)
            .await
        {
            tracing::warn!(stack, host, error = %e, "stack removal reported an error");
        }
        Ok(())
    }

    async fn wait_for_healthy(
        &self,
        cancel: &CancelToken,
        stack: &str,
        host: &str,
        timeout: Option<Duration>,
    ) -> Result<(), OrchestratorError> {
        let timeout = timeout.unwrap_or(self.settings.wait_timeout);
        let poll = self.settings.poll_interval.max(Duration::from_millis(1));
        let bounded = cancel.with_timeout(timeout);

        let max_attempts = (timeout.as_millis() / poll.as_millis()).saturating_add(2);
        let mut attempts: u128 = 0;
        let mut last = String::from("no status yet");

        while attempts < max_attempts {
            attempts += 1;

            match self.health_check(&bounded, stack, host).await {
                Ok(status) if status.healthy => {
                    tracing::debug!(stack, host, attempts, "stack healthy");
                    return Ok(());
                }
                Ok(status) => last = status.message,
                Err(OrchestratorError::Invalid(e)) => return Err(e.into()),
                Err(OrchestratorError::Cancelled) => return Err(OrchestratorError::Cancelled),
                Err(e) => {
                    tracing::debug!(stack, host, error = %e, "health poll failed");
                    last = e.to_string();
                }
            }

            if let Err(reason) = bounded.sleep(poll).await {
                if cancel.is_cancelled() {
                    return Err(OrchestratorError::Cancelled);
                }
                tracing::debug!(stack, %reason, last = %last, "health wait ended");
                break;
            }
        }

        Err(OrchestratorError::HealthTimeout {
            stack: stack.to_string(),
            waited: timeout,
        })
    }

    async fn remove_with_cleanup(
        &self,
        cancel: &CancelToken,
        spec: &RemovalSpec,
    ) -> Result<CleanupReport, OrchestratorError> {
        spec.validate()?;
        Self::checkpoint(cancel, "remove")?;

        let host = spec.host.as_str();
        let stack = spec.stack_name.as_str();
        let short = spec.timeout.unwrap_or(self.settings.command_timeout);
        let cli = &self.settings.container_cli;
        let mut report = CleanupReport::default();

        tracing::info!(stack, host, "removing stack");

        let down = self.down_command(stack, spec.working_dir.as_deref(), spec.include_volumes);
        if let Err(e) = self.run(cancel, "compose down", host, &down, short).await {
            report.record("compose down", e);
        }

        let mut force = format!(
            "{cli} ps -aq --filter label={label}={stack} | xargs -r {cli} rm -f",
            cli = cli,
            label = PROJECT_LABEL,
            stack = stack
        );
        if let Some(container) = &spec.container_name {
            force.push_str(&format!("; {} rm -f {} 2>/dev/null || true", cli, container));
        }
        if let Err(e) = self.run(cancel, "force remove", host, &force, short).await {
            report.record("force remove", e);
        }

        if let Some(dir) = &spec.working_dir {
            if dir.trim_end_matches('/').is_empty() {
                report.record("remove working directory", "refusing to remove /");
            } else if let Err(e) = self
                .run(cancel, "remove working directory", host, &format!("rm -rf '{}'", dir), short)
                .await
            {
                report.record("remove working directory", e);
            }
        }

        Ok(report)
    }

    async fn list_running_stacks(
        &self,
        cancel: &CancelToken,
        host: &str,
    ) -> Result<Vec<StackSummary>, OrchestratorError> {
        validate_host(host)?;
        let command = format!("{} ls --format json", self.settings.compose_command);
        let output = self
            .run(cancel, "list stacks", host, &command, self.settings.command_timeout)
            .await?;
        Ok(parse_stack_list(&output))
    }

    fn mode(&self) -> &'static str {
        "compose"
    }
}

/// Interpret one `Status` line per container.
pub(crate) fn parse_health(output: &str) -> HealthStatus {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let up: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with("Up")).collect();

    let running = !up.is_empty();
    let pending = up
        .iter()
        .filter(|l| l.contains("(unhealthy)") || l.contains("health: starting"))
        .count();
    let healthy = running && pending == 0;

    let message = if lines.is_empty() {
        "no containers found".to_string()
    } else if !running {
        format!("0/{} containers up", lines.len())
    } else if pending > 0 {
        format!("{}/{} containers up, {} not healthy", up.len(), lines.len(), pending)
    } else {
        format!("{}/{} containers up", up.len(), lines.len())
    };

    HealthStatus {
        running,
        healthy,
        message,
        checked_at: Utc::now(),
    }
}

#[derive(Deserialize)]
struct ComposeProject {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Status", default)]
    status: String,
}

/// Parse `compose ls --format json`, keeping only running projects.
pub(crate) fn parse_stack_list(output: &str) -> Vec<StackSummary> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<ComposeProject>>(trimmed) {
        Ok(projects) => projects
            .into_iter()
            .filter(|p| p.status.starts_with("running"))
            .map(|p| StackSummary {
                project: p.name,
                status: p.status,
            })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "unparseable compose ls output");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_without_declared_check_is_healthy_once_up() {
        let status = parse_health("Up 3 seconds\nUp 2 seconds\n");
        assert!(status.running);
        assert!(status.healthy);
        assert_eq!(status.message, "2/2 containers up");
    }

    #[test]
    fn starting_or_unhealthy_is_running_but_not_healthy() {
        let status = parse_health("Up 3 seconds (health: starting)\nUp 1 minute (healthy)");
        assert!(status.running);
        assert!(!status.healthy);

        let status = parse_health("Up 3 minutes (unhealthy)");
        assert!(!status.healthy);
    }

    #[test]
    fn exited_or_empty_is_not_running() {
        assert!(!parse_health("Exited (1) 2 seconds ago").running);
        let empty = parse_health("");
        assert!(!empty.running);
        assert_eq!(empty.message, "no containers found");
    }

    #[test]
    fn stack_list_keeps_running_projects() {
        let json = r#"[
            {"Name":"traefik-0a1b2c3d","Status":"running(1)","ConfigFiles":"/x"},
            {"Name":"old-99","Status":"exited(2)","ConfigFiles":"/y"}
        ]"#;
        let stacks = parse_stack_list(json);
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].project, "traefik-0a1b2c3d");
    }

    #[test]
    fn ps_command_escapes_go_template() {
        let orchestrator = ComposeOrchestrator {
            executor: Arc::new(NeverExecutor),
            settings: ComposeSettings::default(),
        };
        assert_eq!(
            orchestrator.ps_command("wiki-1"),
            "docker ps --filter label=com.docker.compose.project=wiki-1 --format '{{.Status}}'"
        );
        assert_eq!(
            orchestrator.down_command("wiki-1", Some("/srv/wiki-1"), true),
            "cd '/srv/wiki-1' && docker compose -p wiki-1 down --remove-orphans --volumes"
        );
    }

    struct NeverExecutor;

    #[async_trait]
    impl RemoteExecutor for NeverExecutor {
        async fn execute(
            &self,
            _host: &str,
            _command: &str,
        ) -> Result<String, crate::remote::RemoteError> {
            unreachable!()
        }

        async fn execute_with_timeout(
            &self,
            _host: &str,
            _command: &str,
            _timeout: Duration,
        ) -> Result<String, crate::remote::RemoteError> {
            unreachable!()
        }
    }
}
