// ABOUTME: Per-type dependency checkers and plan builders.
// ABOUTME: Registered in a lookup table keyed by dependency type.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::deploy::DeploymentStore;
use crate::recipe::{Dependency, DependencyType, Recipe, RecipeCatalog};
use crate::target::Target;

use super::error::DependencyError;
use super::pool::{SharedCachePool, SharedDatabasePool};
use super::resolver::DependencySettings;
use super::types::{ProvisionAction, ProvisionPlan};

const SHARED_DATABASE_TIME: Duration = Duration::from_secs(30);
const DEDICATED_DATABASE_TIME: Duration = Duration::from_secs(60);
const DEDICATED_DATABASE_RAM_MB: u64 = 512;
const DEDICATED_DATABASE_STORAGE_GB: u64 = 5;
const SHARED_CACHE_TIME: Duration = Duration::from_secs(10);
const PROXY_TIME: Duration = Duration::from_secs(60);

/// Everything a checker may consult for one recipe on one target.
pub struct CheckContext<'a> {
    pub cancel: &'a CancelToken,
    pub target: &'a Target,
    /// The recipe whose dependencies are being resolved.
    pub recipe: &'a Recipe,
    pub store: &'a dyn DeploymentStore,
    pub catalog: &'a dyn RecipeCatalog,
    pub databases: &'a dyn SharedDatabasePool,
    pub caches: &'a dyn SharedCachePool,
    pub settings: &'a DependencySettings,
}

impl CheckContext<'_> {
    /// First of `slugs` with a Running deployment on the target.
    fn running_recipe(&self, slugs: &[String]) -> Option<String> {
        let running = self.store.running_on_target(&self.target.id);
        slugs
            .iter()
            .find(|slug| running.iter().any(|d| &d.recipe_slug == *slug))
            .cloned()
    }

    fn recipe(&self, slug: &str) -> Result<Recipe, DependencyError> {
        self.catalog
            .get(slug)
            .ok_or_else(|| DependencyError::RecipeNotFound(slug.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub satisfied: bool,
    pub reason: String,
}

impl CheckOutcome {
    fn satisfied(reason: impl Into<String>) -> Self {
        Self {
            satisfied: true,
            reason: reason.into(),
        }
    }

    fn missing(reason: impl Into<String>) -> Self {
        Self {
            satisfied: false,
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait DependencyKind: Send + Sync {
    async fn check(
        &self,
        ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<CheckOutcome, DependencyError>;

    fn plan(&self, ctx: &CheckContext<'_>, dep: &Dependency)
    -> Result<ProvisionPlan, DependencyError>;
}

/// Dependency kinds by type.
pub struct KindRegistry {
    kinds: HashMap<DependencyType, Box<dyn DependencyKind>>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        let mut registry = Self {
            kinds: HashMap::new(),
        };
        registry.register(DependencyType::ReverseProxy, ReverseProxyKind);
        registry.register(DependencyType::Database, DatabaseKind);
        registry.register(DependencyType::Cache, CacheKind);
        registry.register(DependencyType::Application, ApplicationKind);
        registry.register(DependencyType::Infrastructure, InfrastructureKind);
        registry.register(DependencyType::Backup, BackupKind);
        registry
    }
}

impl KindRegistry {
    pub fn register(&mut self, dep_type: DependencyType, kind: impl DependencyKind + 'static) {
        self.kinds.insert(dep_type, Box::new(kind));
    }

    pub fn get(&self, dep_type: DependencyType) -> Option<&dyn DependencyKind> {
        self.kinds.get(&dep_type).map(|k| k.as_ref())
    }
}

fn base_plan(dep: &Dependency, action: ProvisionAction) -> ProvisionPlan {
    ProvisionPlan {
        dep_type: dep.dep_type,
        action,
        name: dep.label(),
        recipe_slug: None,
        shared: false,
        estimated_time: Duration::ZERO,
        ram_mb: 0,
        storage_gb: 0,
        config: BTreeMap::new(),
    }
}

fn deploy_plan(dep: &Dependency, recipe: &Recipe, estimated_time: Duration) -> ProvisionPlan {
    let mut plan = base_plan(dep, ProvisionAction::Deploy);
    plan.recipe_slug = Some(recipe.slug.clone());
    plan.estimated_time = estimated_time;
    plan.ram_mb = recipe.resources.ram_mb;
    plan.storage_gb = recipe.resources.storage_gb;
    plan
}

/// Identifier-safe name derived from a recipe slug.
fn resource_name(slug: &str, suffix: &str) -> String {
    let base: String = slug
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", base, suffix)
}

pub struct ReverseProxyKind;

impl ReverseProxyKind {
    /// Preference, then alternatives, then the global default.
    fn candidates(dep: &Dependency, settings: &DependencySettings) -> Vec<String> {
        let mut slugs: Vec<String> = Vec::new();
        let ordered = dep
            .preference
            .iter()
            .chain(dep.alternatives.iter())
            .chain(std::iter::once(&settings.default_proxy));
        for slug in ordered {
            if !slugs.contains(slug) {
                slugs.push(slug.clone());
            }
        }
        slugs
    }
}

#[async_trait]
impl DependencyKind for ReverseProxyKind {
    async fn check(
        &self,
        ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<CheckOutcome, DependencyError> {
        let candidates = Self::candidates(dep, ctx.settings);
        Ok(match ctx.running_recipe(&candidates) {
            Some(slug) => CheckOutcome::satisfied(format!("{} is running", slug)),
            None => CheckOutcome::missing(format!(
                "no reverse proxy running (looked for {})",
                candidates.join(", ")
            )),
        })
    }

    fn plan(
        &self,
        ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<ProvisionPlan, DependencyError> {
        let candidates = Self::candidates(dep, ctx.settings);
        let recipe = candidates
            .iter()
            .find_map(|slug| ctx.catalog.get(slug))
            .ok_or_else(|| DependencyError::RecipeNotFound(candidates.join("|")))?;
        Ok(deploy_plan(dep, &recipe, PROXY_TIME))
    }
}

pub struct DatabaseKind;

impl DatabaseKind {
    fn engine<'a>(dep: &'a Dependency, settings: &'a DependencySettings) -> &'a str {
        dep.engine.as_deref().unwrap_or(&settings.default_database)
    }
}

#[async_trait]
impl DependencyKind for DatabaseKind {
    async fn check(
        &self,
        ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<CheckOutcome, DependencyError> {
        let engine = Self::engine(dep, ctx.settings);
        if dep.shared {
            let exists = ctx
                .databases
                .shared_instance_exists(ctx.cancel, ctx.target, engine)
                .await
                .map_err(|source| DependencyError::Check {
                    dependency: dep.label(),
                    source,
                })?;
            return Ok(if exists {
                CheckOutcome::satisfied(format!("shared {} instance exists", engine))
            } else {
                CheckOutcome::missing(format!("no shared {} instance on target", engine))
            });
        }

        let name = dep.name.clone().unwrap_or_else(|| engine.to_string());
        Ok(match ctx.running_recipe(std::slice::from_ref(&name)) {
            Some(_) => CheckOutcome::satisfied(format!("{} is running", name)),
            None => CheckOutcome::missing(format!("no running {} deployment", name)),
        })
    }

    fn plan(
        &self,
        ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<ProvisionPlan, DependencyError> {
        let engine = Self::engine(dep, ctx.settings);
        if dep.shared {
            let mut plan = base_plan(dep, ProvisionAction::CreateInShared);
            plan.shared = true;
            plan.estimated_time = SHARED_DATABASE_TIME;
            plan.config.insert("engine".into(), engine.to_string());
            plan.config
                .insert("database".into(), resource_name(&ctx.recipe.slug, "db"));
            return Ok(plan);
        }

        let slug = dep.name.as_deref().unwrap_or(engine);
        let recipe = ctx.recipe(slug)?;
        let mut plan = deploy_plan(dep, &recipe, DEDICATED_DATABASE_TIME);
        plan.ram_mb = DEDICATED_DATABASE_RAM_MB;
        plan.storage_gb = DEDICATED_DATABASE_STORAGE_GB;
        plan.config.insert("engine".into(), engine.to_string());
        Ok(plan)
    }
}

pub struct CacheKind;

impl CacheKind {
    fn engine<'a>(dep: &'a Dependency, settings: &'a DependencySettings) -> &'a str {
        dep.engine.as_deref().unwrap_or(&settings.default_cache)
    }
}

#[async_trait]
impl DependencyKind for CacheKind {
    async fn check(
        &self,
        ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<CheckOutcome, DependencyError> {
        let engine = Self::engine(dep, ctx.settings);
        if dep.shared {
            let exists = ctx
                .caches
                .shared_instance_exists(ctx.cancel, ctx.target, engine)
                .await
                .map_err(|source| DependencyError::Check {
                    dependency: dep.label(),
                    source,
                })?;
            return Ok(if exists {
                CheckOutcome::satisfied(format!("shared {} instance exists", engine))
            } else {
                CheckOutcome::missing(format!("no shared {} instance on target", engine))
            });
        }

        let name = dep.name.clone().unwrap_or_else(|| engine.to_string());
        Ok(match ctx.running_recipe(std::slice::from_ref(&name)) {
            Some(_) => CheckOutcome::satisfied(format!("{} is running", name)),
            None => CheckOutcome::missing(format!("no running {} deployment", name)),
        })
    }

    fn plan(
        &self,
        ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<ProvisionPlan, DependencyError> {
        let engine = Self::engine(dep, ctx.settings);
        if dep.shared {
            let mut plan = base_plan(dep, ProvisionAction::ConfigureInShared);
            plan.shared = true;
            plan.estimated_time = SHARED_CACHE_TIME;
            plan.config.insert("engine".into(), engine.to_string());
            plan.config
                .insert("namespace".into(), resource_name(&ctx.recipe.slug, "cache"));
            return Ok(plan);
        }

        let slug = dep.name.as_deref().unwrap_or(engine);
        let recipe = ctx.recipe(slug)?;
        let mut plan = deploy_plan(dep, &recipe, recipe.resources.setup_time);
        plan.config.insert("engine".into(), engine.to_string());
        Ok(plan)
    }
}

pub struct ApplicationKind;

impl ApplicationKind {
    fn slug(dep: &Dependency) -> Result<&str, DependencyError> {
        dep.name
            .as_deref()
            .ok_or_else(|| DependencyError::NotProvisionable {
                dependency: dep.label(),
                reason: "application dependency names no recipe".to_string(),
            })
    }
}

#[async_trait]
impl DependencyKind for ApplicationKind {
    async fn check(
        &self,
        ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<CheckOutcome, DependencyError> {
        let Some(slug) = dep.name.clone() else {
            return Ok(CheckOutcome::missing("application dependency names no recipe"));
        };
        Ok(match ctx.running_recipe(std::slice::from_ref(&slug)) {
            Some(_) => CheckOutcome::satisfied(format!("{} is running", slug)),
            None => CheckOutcome::missing(format!("{} is not running on target", slug)),
        })
    }

    fn plan(
        &self,
        ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<ProvisionPlan, DependencyError> {
        let recipe = ctx.recipe(Self::slug(dep)?)?;
        Ok(deploy_plan(dep, &recipe, recipe.resources.setup_time))
    }
}

pub struct InfrastructureKind;

#[async_trait]
impl DependencyKind for InfrastructureKind {
    async fn check(
        &self,
        _ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<CheckOutcome, DependencyError> {
        Ok(match dep.name.as_deref() {
            Some("docker") => CheckOutcome::satisfied("docker is assumed present"),
            Some(other) => CheckOutcome::missing(format!("unknown infrastructure '{}'", other)),
            None => CheckOutcome::missing("infrastructure dependency names no component"),
        })
    }

    fn plan(
        &self,
        _ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<ProvisionPlan, DependencyError> {
        Err(DependencyError::NotProvisionable {
            dependency: dep.label(),
            reason: "infrastructure is installed out of band".to_string(),
        })
    }
}

/// Advisory only.
pub struct BackupKind;

#[async_trait]
impl DependencyKind for BackupKind {
    async fn check(
        &self,
        _ctx: &CheckContext<'_>,
        _dep: &Dependency,
    ) -> Result<CheckOutcome, DependencyError> {
        Ok(CheckOutcome::missing("backups are not managed here"))
    }

    fn plan(
        &self,
        _ctx: &CheckContext<'_>,
        dep: &Dependency,
    ) -> Result<ProvisionPlan, DependencyError> {
        Err(DependencyError::NotProvisionable {
            dependency: dep.label(),
            reason: "backups are advisory".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names_are_identifier_safe() {
        assert_eq!(resource_name("my-wiki", "db"), "my_wiki_db");
        assert_eq!(resource_name("Nextcloud", "cache"), "nextcloud_cache");
    }

    #[test]
    fn proxy_candidates_are_ordered_and_unique() {
        let mut dep = Dependency::new(DependencyType::ReverseProxy);
        dep.preference = Some("caddy".into());
        dep.alternatives = vec!["traefik".into(), "nginx-proxy".into()];
        let settings = DependencySettings::default();
        assert_eq!(
            ReverseProxyKind::candidates(&dep, &settings),
            vec!["caddy", "traefik", "nginx-proxy"]
        );
    }

    #[test]
    fn registry_covers_every_type() {
        let registry = KindRegistry::default();
        for t in [
            DependencyType::ReverseProxy,
            DependencyType::Database,
            DependencyType::Cache,
            DependencyType::Application,
            DependencyType::Infrastructure,
            DependencyType::Backup,
        ] {
            assert!(registry.get(t).is_some(), "{t}");
        }
    }
}
