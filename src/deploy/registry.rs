// ABOUTME: Id-keyed registries for per-target locks and cancellation handles.
// ABOUTME: Entries are removed by guards when the owning task finishes.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::cancel::{self, CancelHandle, CancelToken};
use crate::types::{DeploymentId, TargetId};

/// A mutex-guarded map from id to handle.
#[derive(Debug)]
pub struct Registry<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V: Clone> Registry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless `key` is already present. Returns whether it was inserted.
    pub fn insert(&self, key: K, value: V) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, value);
        true
    }

    /// Existing value for `key`, or the one `make` produces.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        self.entries.lock().entry(key).or_insert_with(make).clone()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// One async mutex per target. Deployments on different targets never contend.
#[derive(Debug, Default)]
pub struct TargetLocks {
    locks: Registry<TargetId, Arc<tokio::sync::Mutex<()>>>,
}

/// Held for the remote-affecting phases of one deployment; released on drop.
#[derive(Debug)]
pub struct TargetLockGuard {
    target: TargetId,
    _guard: OwnedMutexGuard<()>,
}

impl TargetLockGuard {
    pub fn target(&self) -> &TargetId {
        &self.target
    }
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the target's lock.
    pub async fn acquire(&self, target: &TargetId) -> TargetLockGuard {
        let lock = self
            .locks
            .get_or_insert_with(target.clone(), || Arc::new(tokio::sync::Mutex::new(())));
        let guard = lock.lock_owned().await;
        tracing::debug!(target_id = %target, "target lock acquired");
        TargetLockGuard {
            target: target.clone(),
            _guard: guard,
        }
    }

    pub fn is_locked(&self, target: &TargetId) -> bool {
        self.locks
            .get(target)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

/// Cancellation handles for in-flight deployments.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    handles: Registry<DeploymentId, CancelHandle>,
}

/// Removes its deployment's handle when dropped.
#[derive(Debug)]
pub struct CancelRegistration {
    registry: Arc<CancelRegistry>,
    id: DeploymentId,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        self.registry.handles.remove(&self.id);
    }
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh handle for `id`, returning its token and a guard that
    /// unregisters it. `None` if `id` is already registered.
    pub fn register(
        self: &Arc<Self>,
        id: &DeploymentId,
    ) -> Option<(CancelToken, CancelRegistration)> {
        let (handle, token) = cancel::pair();
        if !self.handles.insert(id.clone(), handle) {
            return None;
        }
        let registration = CancelRegistration {
            registry: Arc::clone(self),
            id: id.clone(),
        };
        Some((token, registration))
    }

    /// Fire the handle for `id`. Returns false when none is registered.
    pub fn cancel(&self, id: &DeploymentId) -> bool {
        match self.handles.get(id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &DeploymentId) -> bool {
        self.handles.contains(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
