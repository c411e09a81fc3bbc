// ABOUTME: Persisted deployment record and its append-only structured log.
// ABOUTME: Rows never hold sensitive config values once rendering is done.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sanitize::sanitize_config;
use super::state::DeploymentStatus;
use crate::recipe::ConfigValues;
use crate::types::{DeploymentId, StackName, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// One attempted or active installation of a recipe on a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub recipe_slug: String,
    pub target_id: TargetId,
    pub stack_name: StackName,
    pub status: DeploymentStatus,
    /// Empty unless `status` is Failed.
    pub error_details: String,
    pub logs: Vec<LogEntry>,
    /// Sanitized copy of the user's configuration.
    pub config: ConfigValues,
    /// Last rendered manifest with sensitive values redacted.
    pub manifest: String,
    pub created_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// A new row in Validating. `config` is sanitized on the way in.
    pub fn new(
        recipe_slug: impl Into<String>,
        target_id: TargetId,
        stack_name: StackName,
        config: &ConfigValues,
    ) -> Self {
        Self {
            id: DeploymentId::generate(),
            recipe_slug: recipe_slug.into(),
            target_id,
            stack_name,
            status: DeploymentStatus::Validating,
            error_details: String::new(),
            logs: Vec::new(),
            config: sanitize_config(config),
            manifest: String::new(),
            created_at: Utc::now(),
            deployed_at: None,
        }
    }

    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>) -> &LogEntry {
        self.logs.push(LogEntry::new(level, message));
        &self.logs[self.logs.len() - 1]
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
