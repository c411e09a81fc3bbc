// ABOUTME: Deployment lifecycle: records, status machine, registries, and the engine.
// ABOUTME: Exposes the engine plus the store and broadcast contracts it depends on.

mod broadcast;
mod engine;
mod error;
mod model;
mod registry;
mod sanitize;
mod state;
mod store;

pub use broadcast::{
    BroadcastMessage, Broadcaster, ChannelBroadcaster, DEPLOYMENTS_CHANNEL, DeploymentEvent,
    NoopBroadcaster,
};
pub use engine::{CreateRequest, DeploymentEngine, EngineBuilder, EngineSettings};
pub use error::{DeployError, DeployErrorKind};
pub use model::{Deployment, LogEntry, LogLevel};
pub use registry::{CancelRegistration, CancelRegistry, Registry, TargetLockGuard, TargetLocks};
pub use sanitize::{REDACTED, is_sensitive_key, redact_manifest, sanitize_config};
pub use state::DeploymentStatus;
pub use store::{DeploymentStore, InMemoryStore, StoreError};
