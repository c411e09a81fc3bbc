// ABOUTME: Contracts for the per-target shared database and cache instances.
// ABOUTME: Managed elsewhere; the resolver only asks and provisions through them.

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::remote::RemoteError;
use crate::target::Target;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no shared {0} pool is configured")]
    Unavailable(&'static str),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait SharedDatabasePool: Send + Sync {
    async fn shared_instance_exists(
        &self,
        cancel: &CancelToken,
        target: &Target,
        engine: &str,
    ) -> Result<bool, PoolError>;

    /// Create `database` inside the shared `engine` instance, starting the instance if needed.
    async fn provision_database_in_shared_instance(
        &self,
        cancel: &CancelToken,
        target: &Target,
        engine: &str,
        database: &str,
    ) -> Result<(), PoolError>;
}

#[async_trait]
pub trait SharedCachePool: Send + Sync {
    async fn shared_instance_exists(
        &self,
        cancel: &CancelToken,
        target: &Target,
        engine: &str,
    ) -> Result<bool, PoolError>;

    async fn configure_cache_in_shared_instance(
        &self,
        cancel: &CancelToken,
        target: &Target,
        engine: &str,
        namespace: &str,
    ) -> Result<(), PoolError>;
}

/// Stand-in when no pool manager is wired up: nothing exists and nothing can be provisioned.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSharedPools;

#[async_trait]
impl SharedDatabasePool for NoSharedPools {
    async fn shared_instance_exists(
        &self,
        _cancel: &CancelToken,
        _target: &Target,
        _engine: &str,
    ) -> Result<bool, PoolError> {
        Ok(false)
    }

    async fn provision_database_in_shared_instance(
        &self,
        _cancel: &CancelToken,
        _target: &Target,
        _engine: &str,
        _database: &str,
    ) -> Result<(), PoolError> {
        Err(PoolError::Unavailable("database"))
    }
}

#[async_trait]
impl SharedCachePool for NoSharedPools {
    async fn shared_instance_exists(
        &self,
        _cancel: &CancelToken,
        _target: &Target,
        _engine: &str,
    ) -> Result<bool, PoolError> {
        Ok(false)
    }

    async fn configure_cache_in_shared_instance(
        &self,
        _cancel: &CancelToken,
        _target: &Target,
        _engine: &str,
        _namespace: &str,
    ) -> Result<(), PoolError> {
        Err(PoolError::Unavailable("cache"))
    }
}
