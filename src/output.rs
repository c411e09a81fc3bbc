// ABOUTME: Terminal rendering of a deployment's progress and outcome.
// ABOUTME: Normal mode prints readable lines, quiet prints only the outcome, JSON prints one object per line.

use crate::deploy::{Deployment, DeploymentEvent, DeploymentStatus};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Normal,
    /// Outcome only, for CI logs.
    Quiet,
    /// JSON lines for scripting.
    Json,
}

/// Prints what the CLI has to say about one deployment.
pub struct Output {
    mode: OutputMode,
    started: Instant,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            started: Instant::now(),
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Free-form progress line, shown in normal mode only.
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// A status change or log line relayed from the broadcaster.
    pub fn event(&self, event: &DeploymentEvent) {
        match self.mode {
            OutputMode::Normal => match event {
                DeploymentEvent::Status { status, error, .. } if error.is_empty() => {
                    println!("  → {}", status.as_str());
                }
                DeploymentEvent::Status { status, error, .. } => {
                    println!("  ✗ {}: {}", status.as_str(), error);
                }
                DeploymentEvent::Log { level, message, .. } => {
                    println!("    [{}] {}", level.as_str(), message);
                }
            },
            OutputMode::Quiet => {}
            OutputMode::Json => print_json(event),
        }
    }

    /// Report a deployment that reached a terminal state.
    ///
    /// Failures go to stderr in every mode.
    pub fn finished(&self, deployment: &Deployment) {
        let succeeded = deployment.status == DeploymentStatus::Running;
        match self.mode {
            OutputMode::Normal if succeeded => println!(
                "Deployed {} ({:.1}s)",
                deployment.stack_name,
                self.elapsed_secs()
            ),
            OutputMode::Quiet if succeeded => println!("{}", deployment.stack_name),
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!(
                    "Error: deployment {} failed: {}",
                    deployment.id, deployment.error_details
                );
            }
            OutputMode::Json => {
                let summary = Summary {
                    event: if succeeded { "success" } else { "failure" },
                    deployment_id: deployment.id.as_str(),
                    stack: deployment.stack_name.as_str(),
                    status: deployment.status.as_str(),
                    error: Some(deployment.error_details.as_str()).filter(|e| !e.is_empty()),
                    duration_secs: self.elapsed_secs(),
                };
                if succeeded {
                    print_json(&summary);
                } else if let Ok(json) = serde_json::to_string(&summary) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!("could not encode output line: {}", e),
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    event: &'static str,
    deployment_id: &'a str,
    stack: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    duration_secs: f64,
}
