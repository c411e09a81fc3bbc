// ABOUTME: Test support utilities.
// ABOUTME: Scripted executor, fake orchestrator and pools, fixture recipes, and an engine harness.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use stackwright::cancel::CancelToken;
use stackwright::deploy::{
    ChannelBroadcaster, Deployment, DeploymentEngine, DeploymentStore, EngineSettings,
    InMemoryStore,
};
use stackwright::deps::{
    DependencyResolver, DependencySettings, PoolError, SharedCachePool, SharedDatabasePool,
};
use stackwright::orchestrator::{
    CleanupReport, ContainerOrchestrator, DeploymentSpec, HealthStatus, OrchestratorError,
    RemovalSpec, StackSummary,
};
use stackwright::recipe::{ConfigValues, InMemoryCatalog, Recipe};
use stackwright::remote::{RemoteError, RemoteExecutor};
use stackwright::target::{InMemoryTargets, Target};
use stackwright::types::{DeploymentId, TargetId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("stackwright=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ---------------------------------------------------------------------------
// Recording executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Reply {
    Stdout(String),
    Fail { exit_code: u32, stderr: String },
    Timeout,
    /// Hang long enough that only the caller's own cancellation ends the wait.
    Stall,
}

/// Replies to commands by the first scripted substring they contain and
/// records every command issued. Unscripted commands succeed with no output.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    script: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, needle: &str, stdout: &str) -> &Self {
        self.script
            .lock()
            .push((needle.to_string(), Reply::Stdout(stdout.to_string())));
        self
    }

    pub fn fail_on(&self, needle: &str, exit_code: u32, stderr: &str) -> &Self {
        self.script.lock().push((
            needle.to_string(),
            Reply::Fail {
                exit_code,
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    pub fn timeout_on(&self, needle: &str) -> &Self {
        self.script.lock().push((needle.to_string(), Reply::Timeout));
        self
    }

    pub fn stall_on(&self, needle: &str) -> &Self {
        self.script.lock().push((needle.to_string(), Reply::Stall));
        self
    }

    /// Every command issued, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(h, _)| h.clone()).collect()
    }

    pub fn commands_containing(&self, needle: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }

    async fn reply(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, RemoteError> {
        self.calls.lock().push((host.to_string(), command.to_string()));
        let reply = self
            .script
            .lock()
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());
        match reply {
            None => Ok(String::new()),
            Some(Reply::Stdout(out)) => Ok(out),
            Some(Reply::Fail { exit_code, stderr }) => {
                Err(RemoteError::CommandFailed { exit_code, stderr })
            }
            Some(Reply::Timeout) => Err(RemoteError::Timeout(timeout)),
            Some(Reply::Stall) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(RemoteError::Timeout(timeout))
            }
        }
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn execute(&self, host: &str, command: &str) -> Result<String, RemoteError> {
        self.reply(host, command, Duration::from_secs(300)).await
    }

    async fn execute_with_timeout(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, RemoteError> {
        self.reply(host, command, timeout).await
    }
}

// ---------------------------------------------------------------------------
// Fake orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Deploy { host: String, stack: String },
    Health { host: String, stack: String },
    Remove { host: String, stack: String },
    Cleanup {
        host: String,
        stack: String,
        working_dir: Option<String>,
    },
    List { host: String },
}

#[derive(Debug, Default)]
struct InFlight {
    current: usize,
    max: usize,
    per_host: HashMap<String, (usize, usize)>,
}

/// Orchestrator double that records calls and measures deploy concurrency.
#[derive(Debug)]
pub struct FakeOrchestrator {
    deploy_delay: Duration,
    deploy_error: Mutex<Option<String>>,
    running: Mutex<bool>,
    health_delay: Mutex<Duration>,
    list_deployed: Mutex<bool>,
    calls: Mutex<Vec<Call>>,
    specs: Mutex<Vec<DeploymentSpec>>,
    stacks: Mutex<Vec<StackSummary>>,
    in_flight: Mutex<InFlight>,
}

impl Default for FakeOrchestrator {
    fn default() -> Self {
        Self::with_delay(Duration::ZERO)
    }
}

impl FakeOrchestrator {
    pub fn with_delay(deploy_delay: Duration) -> Self {
        Self {
            deploy_delay,
            deploy_error: Mutex::new(None),
            running: Mutex::new(true),
            health_delay: Mutex::new(Duration::ZERO),
            list_deployed: Mutex::new(true),
            calls: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
            stacks: Mutex::new(Vec::new()),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    /// Make every subsequent deploy fail with a remote error.
    pub fn fail_deploys(&self, stderr: &str) {
        *self.deploy_error.lock() = Some(stderr.to_string());
    }

    pub fn set_running(&self, running: bool) {
        *self.running.lock() = running;
    }

    /// Make health checks take `delay`, returning early when cancelled.
    pub fn delay_health_checks(&self, delay: Duration) {
        *self.health_delay.lock() = delay;
    }

    /// Deploys succeed but the started stacks never show up as running.
    pub fn hide_deployed_stacks(&self) {
        *self.list_deployed.lock() = false;
    }

    /// Report an extra running project on every host.
    pub fn add_stack(&self, project: &str) {
        self.stacks.lock().push(StackSummary {
            project: project.to_string(),
            status: "running(1)".to_string(),
        });
    }

    pub fn health_checks(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Health { .. }))
            .count()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn specs(&self) -> Vec<DeploymentSpec> {
        self.specs.lock().clone()
    }

    pub fn deploy_count(&self) -> usize {
        self.specs.lock().len()
    }

    pub fn cleanups(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Cleanup { .. }))
            .collect()
    }

    /// Highest number of deploys observed running at once across all hosts.
    pub fn max_concurrent(&self) -> usize {
        self.in_flight.lock().max
    }

    /// Highest number of deploys observed running at once on `host`.
    pub fn max_concurrent_on(&self, host: &str) -> usize {
        self.in_flight
            .lock()
            .per_host
            .get(host)
            .map(|(_, max)| *max)
            .unwrap_or(0)
    }

    fn enter(&self, host: &str) {
        let mut flight = self.in_flight.lock();
        flight.current += 1;
        flight.max = flight.max.max(flight.current);
        let entry = flight.per_host.entry(host.to_string()).or_default();
        entry.0 += 1;
        entry.1 = entry.1.max(entry.0);
    }

    fn leave(&self, host: &str) {
        let mut flight = self.in_flight.lock();
        flight.current -= 1;
        if let Some(entry) = flight.per_host.get_mut(host) {
            entry.0 -= 1;
        }
    }
}

#[async_trait]
impl ContainerOrchestrator for FakeOrchestrator {
    async fn deploy(
        &self,
        cancel: &CancelToken,
        spec: &DeploymentSpec,
    ) -> Result<(), OrchestratorError> {
        spec.validate()?;
        self.calls.lock().push(Call::Deploy {
            host: spec.host.clone(),
            stack: spec.stack_name.clone(),
        });
        self.specs.lock().push(spec.clone());

        self.enter(&spec.host);
        let slept = cancel.sleep(self.deploy_delay).await;
        self.leave(&spec.host);
        if let Err(reason) = slept {
            return Err(OrchestratorError::interrupted("start stack", reason, self.deploy_delay));
        }

        if let Some(stderr) = self.deploy_error.lock().clone() {
            return Err(OrchestratorError::remote(
                "start stack",
                RemoteError::CommandFailed {
                    exit_code: 1,
                    stderr,
                },
            ));
        }

        if *self.list_deployed.lock() {
            self.add_stack(&spec.stack_name);
        }
        Ok(())
    }

    async fn health_check(
        &self,
        cancel: &CancelToken,
        stack: &str,
        host: &str,
    ) -> Result<HealthStatus, OrchestratorError> {
        self.calls.lock().push(Call::Health {
            host: host.to_string(),
            stack: stack.to_string(),
        });
        let delay = *self.health_delay.lock();
        if let Err(reason) = cancel.sleep(delay).await {
            return Err(OrchestratorError::interrupted("list containers", reason, delay));
        }
        let running = *self.running.lock();
        Ok(HealthStatus {
            running,
            healthy: running,
            message: if running {
                "1/1 containers up".to_string()
            } else {
                "no containers found".to_string()
            },
            checked_at: chrono::Utc::now(),
        })
    }

    async fn remove(
        &self,
        _cancel: &CancelToken,
        stack: &str,
        host: &str,
        _include_volumes: bool,
    ) -> Result<(), OrchestratorError> {
        self.calls.lock().push(Call::Remove {
            host: host.to_string(),
            stack: stack.to_string(),
        });
        self.stacks.lock().retain(|s| s.project != stack);
        Ok(())
    }

    async fn wait_for_healthy(
        &self,
        _cancel: &CancelToken,
        _stack: &str,
        _host: &str,
        _timeout: Option<Duration>,
    ) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn remove_with_cleanup(
        &self,
        _cancel: &CancelToken,
        spec: &RemovalSpec,
    ) -> Result<CleanupReport, OrchestratorError> {
        spec.validate()?;
        self.calls.lock().push(Call::Cleanup {
            host: spec.host.clone(),
            stack: spec.stack_name.clone(),
            working_dir: spec.working_dir.clone(),
        });
        self.stacks.lock().retain(|s| s.project != spec.stack_name);
        Ok(CleanupReport::default())
    }

    async fn list_running_stacks(
        &self,
        _cancel: &CancelToken,
        host: &str,
    ) -> Result<Vec<StackSummary>, OrchestratorError> {
        self.calls.lock().push(Call::List {
            host: host.to_string(),
        });
        Ok(self.stacks.lock().clone())
    }

    fn mode(&self) -> &'static str {
        "fake"
    }
}

// ---------------------------------------------------------------------------
// Fake shared pools
// ---------------------------------------------------------------------------

/// Shared database and cache pools backed by in-memory sets.
#[derive(Debug, Default)]
pub struct FakePools {
    instances: Mutex<Vec<String>>,
    database_error: Mutex<Option<String>>,
    databases: Mutex<Vec<(String, String)>>,
    namespaces: Mutex<Vec<(String, String)>>,
}

impl FakePools {
    pub fn with_instance(engine: &str) -> Self {
        let pools = Self::default();
        pools.instances.lock().push(engine.to_string());
        pools
    }

    /// Make every database provisioning request fail with `message`.
    pub fn fail_databases(&self, message: &str) {
        *self.database_error.lock() = Some(message.to_string());
    }

    pub fn databases(&self) -> Vec<(String, String)> {
        self.databases.lock().clone()
    }

    pub fn namespaces(&self) -> Vec<(String, String)> {
        self.namespaces.lock().clone()
    }
}

#[async_trait]
impl SharedDatabasePool for FakePools {
    async fn shared_instance_exists(
        &self,
        _cancel: &CancelToken,
        _target: &Target,
        engine: &str,
    ) -> Result<bool, PoolError> {
        Ok(self.instances.lock().iter().any(|e| e == engine))
    }

    async fn provision_database_in_shared_instance(
        &self,
        _cancel: &CancelToken,
        _target: &Target,
        engine: &str,
        database: &str,
    ) -> Result<(), PoolError> {
        if let Some(message) = self.database_error.lock().clone() {
            return Err(PoolError::Failed(message));
        }
        self.databases
            .lock()
            .push((engine.to_string(), database.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SharedCachePool for FakePools {
    async fn shared_instance_exists(
        &self,
        _cancel: &CancelToken,
        _target: &Target,
        engine: &str,
    ) -> Result<bool, PoolError> {
        Ok(self.instances.lock().iter().any(|e| e == engine))
    }

    async fn configure_cache_in_shared_instance(
        &self,
        _cancel: &CancelToken,
        _target: &Target,
        engine: &str,
        namespace: &str,
    ) -> Result<(), PoolError> {
        self.namespaces
            .lock()
            .push((engine.to_string(), namespace.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixture recipes
// ---------------------------------------------------------------------------

pub const WIKI: &str = r#"
slug: wiki
name: Wiki
template: |
  services:
    wiki:
      image: "wiki:{{ .version }}"
      environment:
        DOMAIN: "{{ .domain }}"
        ADMIN_PASSWORD: "{{ .admin_password }}"
options:
  - name: version
    default: "1.4"
  - name: domain
    required: true
  - name: admin_password
    type: password
    required: true
    env: ADMIN_PASSWORD
"#;

pub const BLOG: &str = r#"
slug: blog
template: |
  services:
    blog:
      image: "blog:latest"
dependencies:
  - type: database
    engine: postgres
    auto_provision: true
  - type: cache
    engine: redis
    required: false
"#;

pub const SHARED_DB_APP: &str = r#"
slug: notes
template: |
  services:
    notes:
      image: "notes:latest"
dependencies:
  - type: database
    engine: postgres
    shared: true
    auto_provision: true
  - type: cache
    engine: redis
    shared: true
    auto_provision: true
"#;

pub const POSTGRES: &str = r#"
slug: postgres
template: |
  services:
    db:
      image: "postgres:{{ .version }}"
options:
  - name: version
    default: "16"
resources:
  setup_time: 10s
"#;

pub const PROXIED: &str = r#"
slug: shop
template: |
  services:
    shop:
      image: "shop:latest"
dependencies:
  - type: reverse_proxy
    auto_provision: true
"#;

pub const TRAEFIK: &str = r#"
slug: traefik
template: |
  services:
    proxy:
      image: "traefik:v3"
resources:
  setup_time: 5s
  ram_mb: 128
"#;

pub const BROKEN: &str = r#"
slug: broken
template: "image: {{ .version | shout }}"
"#;

pub fn recipe(yaml: &str) -> Recipe {
    Recipe::from_yaml(yaml).unwrap()
}

pub fn catalog(recipes: &[&str]) -> Arc<InMemoryCatalog> {
    let catalog = InMemoryCatalog::new();
    for yaml in recipes {
        catalog.insert(recipe(yaml));
    }
    Arc::new(catalog)
}

pub fn target(id: &str, host: &str) -> Target {
    Target::new(id, host, 22)
}

pub fn fast_dependency_settings() -> DependencySettings {
    DependencySettings {
        poll_interval: Duration::from_millis(10),
        min_wait: Duration::from_millis(200),
        max_wait: Duration::from_secs(2),
        ..DependencySettings::default()
    }
}

// ---------------------------------------------------------------------------
// Engine harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: DeploymentEngine,
    pub store: Arc<InMemoryStore>,
    pub orchestrator: Arc<FakeOrchestrator>,
    pub executor: Arc<RecordingExecutor>,
    pub pools: Arc<FakePools>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub targets: Arc<InMemoryTargets>,
}

pub const NODE_1: &str = "node-1";
pub const NODE_2: &str = "node-2";

impl Harness {
    pub fn new(recipes: &[&str], orchestrator: FakeOrchestrator) -> Self {
        Self::with_pools(recipes, orchestrator, FakePools::default())
    }

    pub fn with_pools(recipes: &[&str], orchestrator: FakeOrchestrator, pools: FakePools) -> Self {
        init_tracing();

        let catalog = catalog(recipes);
        let targets = Arc::new(InMemoryTargets::new());
        targets.insert(target(NODE_1, "10.0.0.1"));
        targets.insert(target(NODE_2, "10.0.0.2"));

        let store = Arc::new(InMemoryStore::new());
        let orchestrator = Arc::new(orchestrator);
        let executor = Arc::new(RecordingExecutor::new());
        let pools = Arc::new(pools);
        let broadcaster = Arc::new(ChannelBroadcaster::new(1024));

        let resolver = DependencyResolver::new(catalog.clone(), store.clone(), orchestrator.clone())
            .with_database_pool(pools.clone())
            .with_cache_pool(pools.clone())
            .with_settings(fast_dependency_settings());

        let engine = DeploymentEngine::builder(
            catalog,
            targets.clone(),
            store.clone(),
            orchestrator.clone(),
            executor.clone(),
        )
        .resolver(resolver)
        .broadcaster(broadcaster.clone())
        .settings(EngineSettings {
            health_grace: Duration::from_millis(5),
            ..EngineSettings::default()
        })
        .build();

        Self {
            engine,
            store,
            orchestrator,
            executor,
            pools,
            broadcaster,
            targets,
        }
    }

    pub fn store(&self) -> &dyn DeploymentStore {
        self.store.as_ref()
    }
}

pub fn node(id: &str) -> TargetId {
    TargetId::new(id)
}

/// Wait until `check` holds, polling every few milliseconds for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Config values from string pairs.
pub fn values(pairs: &[(&str, &str)]) -> ConfigValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect()
}

/// Wait for a terminal status, failing the test after ten seconds.
pub async fn finish(engine: &DeploymentEngine, id: &DeploymentId) -> Deployment {
    tokio::time::timeout(
        Duration::from_secs(10),
        engine.wait_for_terminal(id, Duration::from_millis(5)),
    )
    .await
    .expect("deployment did not reach a terminal status")
    .unwrap()
}

pub fn wiki_values() -> ConfigValues {
    values(&[("domain", "wiki.example"), ("admin_password", "hunter2-secret")])
}
