// ABOUTME: Deployment targets: remote machines reachable through the executor.
// ABOUTME: Provides the lookup contract and an in-memory directory.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::TargetId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Last known reachability, maintained elsewhere and only read here.
    pub online: bool,
}

impl Target {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            id: TargetId::new(id),
            name: host.clone(),
            host,
            port,
            online: true,
        }
    }

    /// `host:port` address handed to the executor.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Looks up targets by id.
pub trait TargetDirectory: Send + Sync {
    fn get(&self, id: &TargetId) -> Option<Target>;
}

#[derive(Debug, Default)]
pub struct InMemoryTargets {
    targets: RwLock<HashMap<TargetId, Target>>,
}

impl InMemoryTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, target: Target) {
        self.targets.write().insert(target.id.clone(), target);
    }
}

impl TargetDirectory for InMemoryTargets {
    fn get(&self, id: &TargetId) -> Option<Target> {
        self.targets.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_formats_host_and_port() {
        assert_eq!(Target::new("a", "10.0.0.5", 22).address(), "10.0.0.5:22");
        assert_eq!(Target::new("b", "::1", 2222).address(), "[::1]:2222");
    }

    #[test]
    fn directory_lookup() {
        let targets = InMemoryTargets::new();
        targets.insert(Target::new("node-1", "10.0.0.5", 22));
        assert!(targets.get(&TargetId::new("node-1")).is_some());
        assert!(targets.get(&TargetId::new("node-2")).is_none());
    }
}
