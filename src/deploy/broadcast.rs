// ABOUTME: Fire-and-forget progress events for deployments.
// ABOUTME: A missing or lagging subscriber never affects the deployment itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::model::{LogEntry, LogLevel};
use super::state::DeploymentStatus;
use crate::types::DeploymentId;

pub const DEPLOYMENTS_CHANNEL: &str = "deployments";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum DeploymentEvent {
    #[serde(rename = "deployment.status")]
    Status {
        id: DeploymentId,
        status: DeploymentStatus,
        error: String,
    },

    #[serde(rename = "deployment.log")]
    Log {
        id: DeploymentId,
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: String,
    },
}

impl DeploymentEvent {
    pub fn log(id: &DeploymentId, entry: &LogEntry) -> Self {
        DeploymentEvent::Log {
            id: id.clone(),
            timestamp: entry.timestamp,
            level: entry.level,
            message: entry.message.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeploymentEvent::Status { .. } => "deployment.status",
            DeploymentEvent::Log { .. } => "deployment.log",
        }
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        match self {
            DeploymentEvent::Status { id, .. } | DeploymentEvent::Log { id, .. } => id,
        }
    }
}

pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, channel: &str, event: DeploymentEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn broadcast(&self, _channel: &str, _event: DeploymentEvent) {}
}

#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub channel: String,
    pub event: DeploymentEvent,
}

/// Fans events out to any number of tokio broadcast receivers.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<BroadcastMessage>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.tx.subscribe()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast(&self, channel: &str, event: DeploymentEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(BroadcastMessage {
            channel: channel.to_string(),
            event,
        });
    }
}
