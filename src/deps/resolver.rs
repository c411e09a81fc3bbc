// ABOUTME: Checks a recipe's dependencies on a target and provisions the missing ones.
// ABOUTME: Plans run strictly in order and the first failure aborts the rest.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cancel::CancelToken;
use crate::deploy::{Deployment, DeploymentStatus, DeploymentStore, LogLevel, redact_manifest};
use crate::diagnostics::{Diagnostics, Warning};
use crate::orchestrator::{ContainerOrchestrator, DeploymentSpec, stack_dir};
use crate::recipe::{DependencyType, Recipe, RecipeCatalog};
use crate::target::Target;
use crate::template::TemplateRenderer;
use crate::types::StackName;

use super::error::DependencyError;
use super::kinds::{CheckContext, DependencyKind, KindRegistry};
use super::pool::{NoSharedPools, SharedCachePool, SharedDatabasePool};
use super::types::{DependencyCheckResult, MissingDependency, ProvisionAction, ProvisionPlan};

#[derive(Debug, Clone)]
pub struct DependencySettings {
    pub default_proxy: String,
    pub default_database: String,
    pub default_cache: String,
    /// Interval between running-stack polls after a deploy plan.
    pub poll_interval: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
    /// Root under which dependency stacks get their working directories.
    pub stacks_dir: String,
    pub deploy_timeout: Duration,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            default_proxy: "traefik".to_string(),
            default_database: "postgres".to_string(),
            default_cache: "redis".to_string(),
            poll_interval: Duration::from_secs(5),
            min_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(300),
            stacks_dir: "/opt/stackwright/stacks".to_string(),
            deploy_timeout: Duration::from_secs(600),
        }
    }
}

impl DependencySettings {
    /// Twice the plan's estimate, kept within the configured bounds.
    pub fn poll_window(&self, estimated: Duration) -> Duration {
        estimated
            .saturating_mul(2)
            .max(self.min_wait)
            .min(self.max_wait)
    }
}

pub struct DependencyResolver {
    kinds: KindRegistry,
    catalog: Arc<dyn RecipeCatalog>,
    store: Arc<dyn DeploymentStore>,
    orchestrator: Arc<dyn ContainerOrchestrator>,
    databases: Arc<dyn SharedDatabasePool>,
    caches: Arc<dyn SharedCachePool>,
    renderer: TemplateRenderer,
    settings: DependencySettings,
}

impl DependencyResolver {
    pub fn new(
        catalog: Arc<dyn RecipeCatalog>,
        store: Arc<dyn DeploymentStore>,
        orchestrator: Arc<dyn ContainerOrchestrator>,
    ) -> Self {
        Self {
            kinds: KindRegistry::default(),
            catalog,
            store,
            orchestrator,
            databases: Arc::new(NoSharedPools),
            caches: Arc::new(NoSharedPools),
            renderer: TemplateRenderer::default(),
            settings: DependencySettings::default(),
        }
    }

    pub fn with_database_pool(mut self, pool: Arc<dyn SharedDatabasePool>) -> Self {
        self.databases = pool;
        self
    }

    pub fn with_cache_pool(mut self, pool: Arc<dyn SharedCachePool>) -> Self {
        self.caches = pool;
        self
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_settings(mut self, settings: DependencySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace or add the checker for one dependency type.
    pub fn with_kind(
        mut self,
        dep_type: DependencyType,
        kind: impl DependencyKind + 'static,
    ) -> Self {
        self.kinds.register(dep_type, kind);
        self
    }

    pub fn settings(&self) -> &DependencySettings {
        &self.settings
    }

    fn context<'a>(
        &'a self,
        cancel: &'a CancelToken,
        target: &'a Target,
        recipe: &'a Recipe,
    ) -> CheckContext<'a> {
        CheckContext {
            cancel,
            target,
            recipe,
            store: self.store.as_ref(),
            catalog: self.catalog.as_ref(),
            databases: self.databases.as_ref(),
            caches: self.caches.as_ref(),
            settings: &self.settings,
        }
    }

    /// Evaluate every declared dependency of `recipe` against `target`.
    ///
    /// Only required dependencies affect `satisfied`. Plans are built for
    /// missing required dependencies that allow auto-provisioning.
    pub async fn check_dependencies(
        &self,
        cancel: &CancelToken,
        recipe: &Recipe,
        target: &Target,
    ) -> Result<DependencyCheckResult, DependencyError> {
        let ctx = self.context(cancel, target, recipe);
        let mut result = DependencyCheckResult::default();
        let mut diagnostics = Diagnostics::default();

        for dep in &recipe.dependencies {
            cancel.check().map_err(|_| DependencyError::Cancelled)?;

            let Some(kind) = self.kinds.get(dep.dep_type) else {
                diagnostics.warn(Warning::unsatisfied_dependency(format!(
                    "no checker registered for {}",
                    dep.dep_type
                )));
                continue;
            };

            let outcome = kind.check(&ctx, dep).await?;
            if outcome.satisfied {
                tracing::debug!(dependency = %dep.label(), reason = %outcome.reason, "dependency satisfied");
                continue;
            }

            if !dep.required {
                diagnostics.warn(Warning::unsatisfied_dependency(format!(
                    "recommended {} missing: {}",
                    dep.label(),
                    outcome.reason
                )));
                continue;
            }

            result.satisfied = false;
            let mut can_auto_provision = false;
            if dep.auto_provision {
                match kind.plan(&ctx, dep) {
                    Ok(plan) => {
                        result.add_plan(plan);
                        can_auto_provision = true;
                    }
                    Err(e) => diagnostics.warn(Warning::not_provisionable(format!(
                        "cannot auto-provision {}: {}",
                        dep.label(),
                        e
                    ))),
                }
            }

            result.missing.push(MissingDependency {
                dependency: dep.clone(),
                critical: true,
                can_auto_provision,
                reason: outcome.reason,
            });
        }

        result.warnings = diagnostics.take();
        tracing::debug!(
            recipe = %recipe.slug,
            target_id = %target.id,
            satisfied = result.satisfied,
            missing = result.missing.len(),
            plans = result.plans.len(),
            "dependency check complete"
        );
        Ok(result)
    }

    /// Execute `plans` in order. `progress` receives the 1-based step, the
    /// total, and a description before each step.
    ///
    /// Returns the deployment rows recorded for stacks started by deploy plans.
    pub async fn provision_dependencies(
        &self,
        cancel: &CancelToken,
        target: &Target,
        plans: &[ProvisionPlan],
        progress: &mut (dyn FnMut(usize, usize, &str) + Send),
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<Deployment>, DependencyError> {
        let total = plans.len();
        let mut provisioned = Vec::new();

        for (index, plan) in plans.iter().enumerate() {
            cancel.check().map_err(|_| DependencyError::Cancelled)?;

            let description = plan.describe();
            progress(index + 1, total, &description);
            tracing::info!(target_id = %target.id, step = index + 1, total, "{}", description);

            match plan.action {
                ProvisionAction::CreateInShared => {
                    let (engine, database) = (config(plan, "engine")?, config(plan, "database")?);
                    self.databases
                        .provision_database_in_shared_instance(cancel, target, engine, database)
                        .await
                        .map_err(|source| DependencyError::Pool {
                            dependency: plan.name.clone(),
                            source,
                        })?;
                }
                ProvisionAction::ConfigureInShared => {
                    let (engine, namespace) =
                        (config(plan, "engine")?, config(plan, "namespace")?);
                    self.caches
                        .configure_cache_in_shared_instance(cancel, target, engine, namespace)
                        .await
                        .map_err(|source| DependencyError::Pool {
                            dependency: plan.name.clone(),
                            source,
                        })?;
                }
                ProvisionAction::Deploy => {
                    let row = self.deploy_stack(cancel, target, plan, diagnostics).await?;
                    provisioned.push(row);
                }
            }
        }

        Ok(provisioned)
    }

    async fn deploy_stack(
        &self,
        cancel: &CancelToken,
        target: &Target,
        plan: &ProvisionPlan,
        diagnostics: &mut Diagnostics,
    ) -> Result<Deployment, DependencyError> {
        let slug = plan
            .recipe_slug
            .as_deref()
            .ok_or_else(|| DependencyError::NotProvisionable {
                dependency: plan.name.clone(),
                reason: "deploy plan names no recipe".to_string(),
            })?;
        let recipe = self
            .catalog
            .get(slug)
            .ok_or_else(|| DependencyError::RecipeNotFound(slug.to_string()))?;

        // One level only: the dependency's own requirements are reported, not resolved.
        for nested in recipe.required_dependencies() {
            diagnostics.warn(Warning::nested_dependency(format!(
                "{} requires {}; nested dependencies are not auto-provisioned",
                slug,
                nested.label()
            )));
        }

        let values = recipe.default_values();
        let manifest = self
            .renderer
            .render(&recipe.template, &values)
            .await
            .map_err(|source| DependencyError::Render {
                slug: slug.to_string(),
                source,
            })?;

        let stack = StackName::generate(&recipe.slug);
        let working_dir = stack_dir(&self.settings.stacks_dir, stack.as_str()).map_err(|source| {
            DependencyError::Invalid {
                slug: slug.to_string(),
                source,
            }
        })?;
        let spec = DeploymentSpec {
            host: target.address(),
            stack_name: stack.to_string(),
            working_dir,
            manifest: manifest.clone(),
            env: recipe.env_exports(&values),
            timeout: Some(self.settings.deploy_timeout),
        };

        self.orchestrator
            .deploy(cancel, &spec)
            .await
            .map_err(|source| DependencyError::Deploy {
                slug: slug.to_string(),
                source,
            })?;

        let prefix = StackName::prefix_for(&recipe.slug);
        let window = self.settings.poll_window(plan.estimated_time);
        self.await_running(cancel, &spec.host, &prefix, window).await?;

        let mut row = Deployment::new(slug, target.id.clone(), stack, &values);
        row.status = DeploymentStatus::Running;
        row.deployed_at = Some(Utc::now());
        row.manifest = redact_manifest(&manifest, &values);
        row.push_log(
            LogLevel::Info,
            format!("provisioned automatically to satisfy {}", plan.name),
        );
        self.store
            .insert(row.clone())
            .map_err(|e| DependencyError::Record {
                slug: slug.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(stack = %row.stack_name, target_id = %target.id, "dependency stack running");
        Ok(row)
    }

    /// Poll until a running stack named `prefix` plus a generated suffix shows up.
    async fn await_running(
        &self,
        cancel: &CancelToken,
        host: &str,
        prefix: &str,
        window: Duration,
    ) -> Result<(), DependencyError> {
        let bounded = cancel.with_timeout(window);
        loop {
            if cancel.is_cancelled() {
                return Err(DependencyError::Cancelled);
            }

            match self.orchestrator.list_running_stacks(&bounded, host).await {
                Ok(stacks)
                    if stacks
                        .iter()
                        .any(|s| StackName::is_generated_with(&s.project, prefix)) =>
                {
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if e.is_cancelled() => return Err(DependencyError::Cancelled),
                Err(e) => tracing::debug!(host, prefix, error = %e, "running stack poll failed"),
            }

            if bounded.sleep(self.settings.poll_interval).await.is_err() {
                if cancel.is_cancelled() {
                    return Err(DependencyError::Cancelled);
                }
                return Err(DependencyError::NotRunning {
                    prefix: prefix.to_string(),
                    waited: window,
                });
            }
        }
    }
}

fn config<'a>(plan: &'a ProvisionPlan, key: &str) -> Result<&'a str, DependencyError> {
    plan.config
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| DependencyError::NotProvisionable {
            dependency: plan.name.clone(),
            reason: format!("plan is missing '{}'", key),
        })
}
