// ABOUTME: Dependency resolution and auto-provisioning for recipes.
// ABOUTME: Checks what a recipe needs on a target and executes plans to provide it.

mod error;
mod kinds;
mod pool;
mod resolver;
mod types;

pub use error::DependencyError;
pub use kinds::{
    ApplicationKind, BackupKind, CacheKind, CheckContext, CheckOutcome, DatabaseKind,
    DependencyKind, InfrastructureKind, KindRegistry, ReverseProxyKind,
};
pub use pool::{NoSharedPools, PoolError, SharedCachePool, SharedDatabasePool};
pub use resolver::{DependencyResolver, DependencySettings};
pub use types::{
    DependencyCheckResult, MissingDependency, ProvisionAction, ProvisionPlan, ResourceImpact,
};
