// ABOUTME: Persistence contract for deployment rows and an in-memory implementation.
// ABOUTME: Dependency checks read running deployments per target through it.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::model::Deployment;
use super::state::DeploymentStatus;
use crate::types::{DeploymentId, TargetId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("deployment not found: {0}")]
    NotFound(DeploymentId),

    #[error("deployment already exists: {0}")]
    Duplicate(DeploymentId),

    #[error("store unavailable: {0}")]
    Backend(String),
}

pub trait DeploymentStore: Send + Sync {
    fn insert(&self, deployment: Deployment) -> Result<(), StoreError>;

    fn get(&self, id: &DeploymentId) -> Option<Deployment>;

    /// Replace the stored row with the same id.
    fn update(&self, deployment: &Deployment) -> Result<(), StoreError>;

    fn delete(&self, id: &DeploymentId) -> Result<(), StoreError>;

    fn list_by_target(&self, target: &TargetId) -> Vec<Deployment>;

    fn running_on_target(&self, target: &TargetId) -> Vec<Deployment> {
        self.list_by_target(target)
            .into_iter()
            .filter(|d| d.status == DeploymentStatus::Running)
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: RwLock<HashMap<DeploymentId, Deployment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl DeploymentStore for InMemoryStore {
    fn insert(&self, deployment: Deployment) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&deployment.id) {
            return Err(StoreError::Duplicate(deployment.id));
        }
        rows.insert(deployment.id.clone(), deployment);
        Ok(())
    }

    fn get(&self, id: &DeploymentId) -> Option<Deployment> {
        self.rows.read().get(id).cloned()
    }

    fn update(&self, deployment: &Deployment) -> Result<(), StoreError> {
        match self.rows.write().get_mut(&deployment.id) {
            Some(row) => {
                *row = deployment.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(deployment.id.clone())),
        }
    }

    fn delete(&self, id: &DeploymentId) -> Result<(), StoreError> {
        self.rows
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn list_by_target(&self, target: &TargetId) -> Vec<Deployment> {
        let mut rows: Vec<Deployment> = self
            .rows
            .read()
            .values()
            .filter(|d| &d.target_id == target)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.created_at);
        rows
    }
}
