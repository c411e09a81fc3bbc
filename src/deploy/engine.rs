// ABOUTME: Deployment state machine: create, execute, cancel, and delete deployments.
// ABOUTME: One task per deployment, serialized per target, observing cancellation at named checkpoints.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cancel::{CancelToken, Interrupted};
use crate::deps::{DependencyError, DependencyResolver};
use crate::diagnostics::{Diagnostics, Warning, WarningKind};
use crate::orchestrator::{
    ContainerOrchestrator, DeploymentSpec, RemovalSpec, probe_http, stack_dir,
};
use crate::recipe::{ConfigValues, Recipe, RecipeCatalog};
use crate::remote::RemoteExecutor;
use crate::target::{Target, TargetDirectory};
use crate::template::TemplateRenderer;
use crate::types::{DeploymentId, StackName, TargetId};
use crate::validate::{validate_env_name, validate_env_value};

use super::broadcast::{Broadcaster, DEPLOYMENTS_CHANNEL, DeploymentEvent, NoopBroadcaster};
use super::error::{DeployError, DeployErrorKind};
use super::model::{Deployment, LogLevel};
use super::registry::{CancelRegistration, CancelRegistry, TargetLocks};
use super::sanitize::{redact_manifest, sanitize_config};
use super::state::DeploymentStatus;
use super::store::DeploymentStore;

/// Tunables for the execution task.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Root under which each stack gets its working directory.
    pub stacks_dir: String,
    /// Bound for starting a stack.
    pub deploy_timeout: Duration,
    /// Pause between starting a stack and checking it.
    pub health_grace: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stacks_dir: "/opt/stackwright/stacks".to_string(),
            deploy_timeout: Duration::from_secs(600),
            health_grace: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub recipe_slug: String,
    pub target_id: TargetId,
    /// User-supplied values. Sensitive entries live only until rendering.
    pub config: ConfigValues,
    /// Provision missing dependencies before deploying instead of only warning.
    pub auto_provision_dependencies: bool,
}

impl CreateRequest {
    pub fn new(recipe_slug: impl Into<String>, target_id: TargetId) -> Self {
        Self {
            recipe_slug: recipe_slug.into(),
            target_id,
            config: ConfigValues::new(),
            auto_provision_dependencies: false,
        }
    }

    pub fn config(mut self, config: ConfigValues) -> Self {
        self.config = config;
        self
    }

    pub fn auto_provision(mut self, enabled: bool) -> Self {
        self.auto_provision_dependencies = enabled;
        self
    }
}

/// Points where the execution task observes cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checkpoint {
    BeforeLock,
    AfterRender,
    BeforeDeploy,
    AfterDeploy,
    BeforeHealthCheck,
    AfterHealthCheck,
}

impl Checkpoint {
    fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::BeforeLock => "before lock",
            Checkpoint::AfterRender => "after render",
            Checkpoint::BeforeDeploy => "before deploy",
            Checkpoint::AfterDeploy => "after deploy",
            Checkpoint::BeforeHealthCheck => "before health check",
            Checkpoint::AfterHealthCheck => "after health check",
        }
    }
}

/// Everything the execution task needs, including the only copy of the
/// unsanitized configuration.
struct Job {
    recipe: Recipe,
    target: Target,
    working_dir: String,
    values: ConfigValues,
    auto_provision: bool,
}

struct EngineInner {
    catalog: Arc<dyn RecipeCatalog>,
    targets: Arc<dyn TargetDirectory>,
    store: Arc<dyn DeploymentStore>,
    orchestrator: Arc<dyn ContainerOrchestrator>,
    executor: Arc<dyn RemoteExecutor>,
    resolver: DependencyResolver,
    broadcaster: Arc<dyn Broadcaster>,
    renderer: TemplateRenderer,
    settings: EngineSettings,
    locks: TargetLocks,
    cancels: Arc<CancelRegistry>,
}

/// Drives deployments from creation to a terminal status.
#[derive(Clone)]
pub struct DeploymentEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for DeploymentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentEngine")
            .field("settings", &self.inner.settings)
            .field("in_flight", &self.inner.cancels.len())
            .finish_non_exhaustive()
    }
}

pub struct EngineBuilder {
    catalog: Arc<dyn RecipeCatalog>,
    targets: Arc<dyn TargetDirectory>,
    store: Arc<dyn DeploymentStore>,
    orchestrator: Arc<dyn ContainerOrchestrator>,
    executor: Arc<dyn RemoteExecutor>,
    resolver: Option<DependencyResolver>,
    broadcaster: Arc<dyn Broadcaster>,
    renderer: TemplateRenderer,
    settings: EngineSettings,
}

impl EngineBuilder {
    pub fn resolver(mut self, resolver: DependencyResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> DeploymentEngine {
        let resolver = self.resolver.unwrap_or_else(|| {
            DependencyResolver::new(
                Arc::clone(&self.catalog),
                Arc::clone(&self.store),
                Arc::clone(&self.orchestrator),
            )
            .with_renderer(self.renderer.clone())
        });
        DeploymentEngine {
            inner: Arc::new(EngineInner {
                catalog: self.catalog,
                targets: self.targets,
                store: self.store,
                orchestrator: self.orchestrator,
                executor: self.executor,
                resolver,
                broadcaster: self.broadcaster,
                renderer: self.renderer,
                settings: self.settings,
                locks: TargetLocks::new(),
                cancels: Arc::new(CancelRegistry::new()),
            }),
        }
    }
}

impl DeploymentEngine {
    pub fn builder(
        catalog: Arc<dyn RecipeCatalog>,
        targets: Arc<dyn TargetDirectory>,
        store: Arc<dyn DeploymentStore>,
        orchestrator: Arc<dyn ContainerOrchestrator>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> EngineBuilder {
        EngineBuilder {
            catalog,
            targets,
            store,
            orchestrator,
            executor,
            resolver: None,
            broadcaster: Arc::new(NoopBroadcaster),
            renderer: TemplateRenderer::default(),
            settings: EngineSettings::default(),
        }
    }

    /// Validate the request, persist a row in Validating, and start executing it.
    ///
    /// Returns as soon as the row exists; progress is visible through the
    /// store and the broadcaster.
    pub async fn create(&self, request: CreateRequest) -> Result<Deployment, DeployError> {
        let inner = &self.inner;
        let recipe = inner
            .catalog
            .get(&request.recipe_slug)
            .ok_or_else(|| DeployError::RecipeNotFound(request.recipe_slug.clone()))?;

        // Fail fast on templates that cannot render even with defaults.
        inner
            .renderer
            .render(&recipe.template, &recipe.dry_run_values())
            .await?;

        let values = recipe.effective_values(&request.config);
        let missing = recipe.missing_required(&values);
        if !missing.is_empty() {
            return Err(DeployError::MissingOptions(missing));
        }

        let target = inner
            .targets
            .get(&request.target_id)
            .ok_or_else(|| DeployError::TargetNotFound(request.target_id.clone()))?;
        if !target.online {
            return Err(DeployError::TargetOffline(target.id));
        }

        let stack = StackName::generate(&recipe.slug);
        let working_dir = stack_dir(&inner.settings.stacks_dir, stack.as_str())?;
        for (name, value) in recipe.env_exports(&values) {
            validate_env_name(&name)?;
            validate_env_value(&name, &value)?;
        }

        let mut deployment = Deployment::new(&recipe.slug, target.id.clone(), stack, &values);
        deployment.push_log(
            LogLevel::Info,
            format!("deployment of {} to {} requested", recipe.slug, target.name),
        );
        inner.store.insert(deployment.clone())?;

        let Some((token, registration)) = inner.cancels.register(&deployment.id) else {
            return Err(DeployError::InFlight(deployment.id));
        };

        tracing::info!(
            deployment_id = %deployment.id,
            recipe = %recipe.slug,
            target_id = %target.id,
            stack = %deployment.stack_name,
            "deployment created"
        );
        inner.emit_status(&deployment);

        let job = Job {
            recipe,
            target,
            working_dir,
            values,
            auto_provision: request.auto_provision_dependencies,
        };
        let task_inner = Arc::clone(inner);
        let row = deployment.clone();
        tokio::spawn(async move { task_inner.execute(row, job, token, registration).await });

        Ok(deployment)
    }

    /// Request cancellation. Observed at the next checkpoint.
    pub fn cancel(&self, id: &DeploymentId) -> Result<(), DeployError> {
        let inner = &self.inner;
        let row = inner
            .store
            .get(id)
            .ok_or_else(|| DeployError::DeploymentNotFound(id.clone()))?;
        if !row.status.is_cancellable() {
            return Err(DeployError::InvalidState {
                id: id.clone(),
                status: row.status,
                action: "cancel",
            });
        }
        if !inner.cancels.cancel(id) {
            return Err(DeployError::AlreadyFinished(id.clone()));
        }
        tracing::info!(deployment_id = %id, "cancellation requested");
        Ok(())
    }

    /// Stop and remove the remote stack, then the row. Volumes are kept.
    pub async fn delete(&self, id: &DeploymentId) -> Result<(), DeployError> {
        let inner = &self.inner;
        let row = inner
            .store
            .get(id)
            .ok_or_else(|| DeployError::DeploymentNotFound(id.clone()))?;
        if inner.cancels.contains(id) {
            return Err(DeployError::InFlight(id.clone()));
        }
        let target = inner
            .targets
            .get(&row.target_id)
            .ok_or_else(|| DeployError::TargetNotFound(row.target_id.clone()))?;

        let spec = RemovalSpec::new(target.address(), row.stack_name.as_str());
        let report = inner
            .orchestrator
            .remove_with_cleanup(&CancelToken::never(), &spec)
            .await?;
        for failure in &report.failed {
            tracing::warn!(
                deployment_id = %id,
                phase = failure.phase,
                error = %failure.error,
                "removal phase failed"
            );
        }

        inner.store.delete(id)?;
        tracing::info!(deployment_id = %id, stack = %row.stack_name, "deployment deleted");
        Ok(())
    }

    pub fn get(&self, id: &DeploymentId) -> Option<Deployment> {
        self.inner.store.get(id)
    }

    pub fn list(&self, target: &TargetId) -> Vec<Deployment> {
        self.inner.store.list_by_target(target)
    }

    pub fn is_in_flight(&self, id: &DeploymentId) -> bool {
        self.inner.cancels.contains(id)
    }

    /// Poll the store until the deployment reaches a terminal status and its
    /// task has let go of it.
    pub async fn wait_for_terminal(
        &self,
        id: &DeploymentId,
        poll: Duration,
    ) -> Result<Deployment, DeployError> {
        loop {
            let row = self
                .get(id)
                .ok_or_else(|| DeployError::DeploymentNotFound(id.clone()))?;
            if row.is_terminal() && !self.is_in_flight(id) {
                return Ok(row);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

impl EngineInner {
    async fn execute(
        self: Arc<Self>,
        mut row: Deployment,
        job: Job,
        token: CancelToken,
        registration: CancelRegistration,
    ) {
        let mut diagnostics = Diagnostics::default();
        let outcome = self.run(&mut row, job, &token, &mut diagnostics).await;

        // Unregister before the terminal write so a caller that observes the
        // terminal status can delete immediately.
        drop(registration);

        match outcome {
            Ok(()) => {
                row.deployed_at = Some(Utc::now());
                let summary = if diagnostics.has_warnings() {
                    format!("deployment running with {} warning(s)", diagnostics.warnings().len())
                } else {
                    "deployment running".to_string()
                };
                self.transition(&mut row, DeploymentStatus::Running, summary);
            }
            Err(err) => self.fail(&mut row, &err),
        }
    }

    async fn run(
        &self,
        row: &mut Deployment,
        job: Job,
        token: &CancelToken,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), DeployError> {
        let Job {
            recipe,
            target,
            working_dir,
            values,
            auto_provision,
        } = job;

        checkpoint(token, Checkpoint::BeforeLock)?;
        let _lock = tokio::select! {
            guard = self.locks.acquire(&target.id) => guard,
            _ = token.cancelled() => return Err(DeployError::Cancelled),
        };
        self.transition(row, DeploymentStatus::Preparing, "target lock acquired");

        self.resolve_dependencies(row, &recipe, &target, token, auto_provision, diagnostics)
            .await?;

        let manifest = self.renderer.render(&recipe.template, &values).await?;
        let env = recipe.env_exports(&values);
        row.config = sanitize_config(&values);
        row.manifest = redact_manifest(&manifest, &values);
        drop(values);
        self.log(row, LogLevel::Info, "manifest rendered");

        checkpoint(token, Checkpoint::AfterRender)?;
        self.transition(row, DeploymentStatus::Deploying, "deploying stack");

        let spec = DeploymentSpec {
            host: target.address(),
            stack_name: row.stack_name.to_string(),
            working_dir: working_dir.clone(),
            manifest,
            env,
            timeout: Some(self.settings.deploy_timeout),
        };

        let deployed = match checkpoint(token, Checkpoint::BeforeDeploy) {
            Ok(()) => self
                .orchestrator
                .deploy(token, &spec)
                .await
                .map_err(DeployError::from),
            Err(e) => Err(e),
        };
        let deployed = deployed.and_then(|()| checkpoint(token, Checkpoint::AfterDeploy));
        drop(spec);
        if let Err(err) = deployed {
            self.log(row, LogLevel::Error, format!("deploy failed: {}", err.details()));
            self.cleanup(row, &target, &working_dir, diagnostics).await;
            return Err(err);
        }

        self.transition(row, DeploymentStatus::HealthCheck, "waiting for stack to settle");
        let settled = match token.sleep(self.settings.health_grace).await {
            Ok(()) => checkpoint(token, Checkpoint::BeforeHealthCheck),
            Err(reason) => Err(interrupted(Checkpoint::BeforeHealthCheck, reason)),
        };
        if let Err(err) = settled {
            self.cleanup(row, &target, &working_dir, diagnostics).await;
            return Err(err);
        }

        let checked = self.confirm_running(row, &recipe, &target, token, diagnostics).await;
        let checked = checked.and_then(|()| checkpoint(token, Checkpoint::AfterHealthCheck));
        if let Err(err) = checked {
            // A stack that is simply not running stays in place for inspection.
            if !matches!(err, DeployError::NotRunning(_)) {
                self.cleanup(row, &target, &working_dir, diagnostics).await;
            }
            return Err(err);
        }

        Ok(())
    }

    /// Confirm the stack runs, then issue the recipe's HTTP probe if it has one.
    ///
    /// Probe failures are warnings. Cancellation interrupts either step.
    async fn confirm_running(
        &self,
        row: &mut Deployment,
        recipe: &Recipe,
        target: &Target,
        token: &CancelToken,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), DeployError> {
        let host = target.address();
        let status = self
            .orchestrator
            .health_check(token, row.stack_name.as_str(), &host)
            .await?;
        if !status.running {
            return Err(DeployError::NotRunning(format!(
                "{} ({})",
                row.stack_name, status.message
            )));
        }
        self.log(row, LogLevel::Info, format!("stack is up: {}", status.message));

        let Some(check) = &recipe.health_check else {
            return Ok(());
        };
        let probed = tokio::select! {
            probed = probe_http(self.executor.as_ref(), &host, check) => probed,
            reason = token.interrupted() => {
                return Err(interrupted(Checkpoint::AfterHealthCheck, reason));
            }
        };
        match probed {
            Ok(code) => self.log(row, LogLevel::Info, format!("HTTP probe returned {}", code)),
            Err(e) => {
                let message = format!("HTTP probe of {} failed: {}", check.path, e);
                self.log(row, LogLevel::Warn, message.clone());
                diagnostics.warn(Warning::http_probe(message));
            }
        }
        Ok(())
    }

    /// Check, and when requested provision, the recipe's dependencies.
    async fn resolve_dependencies(
        &self,
        row: &mut Deployment,
        recipe: &Recipe,
        target: &Target,
        token: &CancelToken,
        auto_provision: bool,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), DeployError> {
        if recipe.dependencies.is_empty() {
            return Ok(());
        }

        let result = match self.resolver.check_dependencies(token, recipe, target).await {
            Ok(result) => result,
            Err(e) if auto_provision || e.is_cancelled() => return Err(e.into()),
            Err(e) => {
                let message = format!("dependency check failed: {}", e);
                self.log(row, LogLevel::Warn, message.clone());
                diagnostics.warn(Warning::unsatisfied_dependency(message));
                return Ok(());
            }
        };

        for warning in &result.warnings {
            self.log(row, LogLevel::Warn, warning.message.clone());
        }
        if result.satisfied {
            self.log(row, LogLevel::Info, "dependencies satisfied");
            return Ok(());
        }

        if !auto_provision {
            for missing in &result.missing {
                let message = format!(
                    "missing {}: {}",
                    missing.dependency.label(),
                    missing.reason
                );
                self.log(row, LogLevel::Warn, message.clone());
                diagnostics.warn(Warning::unsatisfied_dependency(message));
            }
            return Ok(());
        }

        if let Some(blocking) = result.unprovisionable().next() {
            return Err(DependencyError::NotProvisionable {
                dependency: blocking.dependency.label(),
                reason: blocking.reason.clone(),
            }
            .into());
        }

        self.log(
            row,
            LogLevel::Info,
            format!("provisioning {} dependencies", result.plans.len()),
        );
        let mut progress = |step: usize, total: usize, message: &str| {
            self.log(row, LogLevel::Info, format!("[{}/{}] {}", step, total, message));
        };
        self.resolver
            .provision_dependencies(token, target, &result.plans, &mut progress, diagnostics)
            .await?;
        for warning in diagnostics.warnings() {
            if warning.kind == WarningKind::NestedDependency {
                self.log(row, LogLevel::Warn, warning.message.clone());
            }
        }
        self.log(row, LogLevel::Info, "dependencies provisioned");
        Ok(())
    }

    /// Best-effort removal of whatever the deploy step created.
    ///
    /// Runs without the deployment's token so a cancelled deployment still
    /// gets cleaned up. Failures are logged and never replace the original error.
    async fn cleanup(
        &self,
        row: &mut Deployment,
        target: &Target,
        working_dir: &str,
        diagnostics: &mut Diagnostics,
    ) {
        self.log(row, LogLevel::Info, "cleaning up partially created stack");
        let spec = RemovalSpec::new(target.address(), row.stack_name.as_str())
            .working_dir(working_dir);

        match self
            .orchestrator
            .remove_with_cleanup(&CancelToken::never(), &spec)
            .await
        {
            Ok(report) => {
                for failure in &report.failed {
                    let message = format!("cleanup {} failed: {}", failure.phase, failure.error);
                    self.log(row, LogLevel::Warn, message.clone());
                    diagnostics.warn(Warning::cleanup(message));
                }
            }
            Err(e) => {
                let message = format!("cleanup could not start: {}", e);
                self.log(row, LogLevel::Warn, message.clone());
                diagnostics.warn(Warning::cleanup(message));
            }
        }
    }

    fn fail(&self, row: &mut Deployment, err: &DeployError) {
        let details = err.details();
        if err.kind() == DeployErrorKind::Cancelled {
            tracing::warn!(deployment_id = %row.id, "deployment cancelled");
        } else {
            tracing::error!(deployment_id = %row.id, error = %err, "deployment failed");
        }
        row.error_details = details.clone();
        self.transition(row, DeploymentStatus::Failed, details);
    }

    /// Move to `next`, logging and broadcasting. Illegal moves are refused and reported.
    fn transition(&self, row: &mut Deployment, next: DeploymentStatus, message: impl Into<String>) {
        if !row.status.can_transition_to(next) {
            let err = DeployError::IllegalTransition {
                from: row.status,
                to: next,
            };
            tracing::error!(deployment_id = %row.id, "{}", err);
            return;
        }
        tracing::info!(
            deployment_id = %row.id,
            from = %row.status,
            to = %next,
            "status transition"
        );
        row.status = next;
        let level = if next == DeploymentStatus::Failed {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        let message = format!("{}: {}", next, message.into());
        self.log(row, level, message);
        self.emit_status(row);
    }

    /// Append to the persisted log, broadcast it, and save the row.
    fn log(&self, row: &mut Deployment, level: LogLevel, message: impl Into<String>) {
        let entry = row.push_log(level, message).clone();
        match level {
            LogLevel::Info => tracing::debug!(deployment_id = %row.id, "{}", entry.message),
            LogLevel::Warn => tracing::warn!(deployment_id = %row.id, "{}", entry.message),
            LogLevel::Error => tracing::error!(deployment_id = %row.id, "{}", entry.message),
        }
        self.broadcaster
            .broadcast(DEPLOYMENTS_CHANNEL, DeploymentEvent::log(&row.id, &entry));
        self.persist(row);
    }

    fn persist(&self, row: &Deployment) {
        if let Err(e) = self.store.update(row) {
            tracing::error!(deployment_id = %row.id, error = %e, "failed to persist deployment");
        }
    }

    fn emit_status(&self, row: &Deployment) {
        self.broadcaster.broadcast(
            DEPLOYMENTS_CHANNEL,
            DeploymentEvent::Status {
                id: row.id.clone(),
                status: row.status,
                error: row.error_details.clone(),
            },
        );
    }
}

fn checkpoint(token: &CancelToken, at: Checkpoint) -> Result<(), DeployError> {
    token.check().map_err(|reason| interrupted(at, reason))
}

fn interrupted(at: Checkpoint, reason: Interrupted) -> DeployError {
    tracing::debug!(checkpoint = at.as_str(), %reason, "interrupted at checkpoint");
    match reason {
        Interrupted::Cancelled => DeployError::Cancelled,
        Interrupted::DeadlineExceeded => DeployError::Timeout {
            operation: at.as_str(),
            timeout: Duration::ZERO,
        },
    }
}
