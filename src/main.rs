// ABOUTME: Entry point for the stackwright CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use stackwright::cancel::CancelToken;
use stackwright::config::{Config, ServerAddress};
use stackwright::deploy::{
    ChannelBroadcaster, CreateRequest, DeployError, DeploymentEngine, DeploymentStatus,
    DeploymentStore, InMemoryStore,
};
use stackwright::deps::DependencyResolver;
use stackwright::error::{Error, Result};
use stackwright::orchestrator::{
    ComposeOrchestrator, ContainerOrchestrator, OrchestratorError, RemovalSpec, stack_dir,
};
use stackwright::output::{Output, OutputMode};
use stackwright::recipe::{ConfigValues, InMemoryCatalog, Recipe, RecipeCatalog};
use stackwright::remote::RemoteExecutor;
use stackwright::ssh::SshExecutor;
use stackwright::target::InMemoryTargets;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const EVENT_BUFFER: usize = 256;
const TERMINAL_POLL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    match result {
        Ok(()) => {}
        // Already reported by the deployment output.
        Err(Error::Failed { .. }) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;
    let config = Config::discover(&cwd)?;

    match cli.command {
        Commands::Validate { recipe } => validate(&config, &recipe).await,
        Commands::Render { recipe, set } => render(&config, &recipe, &set).await,
        Commands::Deploy {
            recipe,
            target,
            set,
            recipes,
            auto_provision,
            quiet,
            json,
        } => {
            let mode = if json {
                OutputMode::Json
            } else if quiet {
                OutputMode::Quiet
            } else {
                OutputMode::Normal
            };
            let options = DeployOptions {
                target,
                set,
                recipes_dir: recipes,
                auto_provision,
            };
            deploy(&config, &recipe, options, Output::new(mode)).await
        }
        Commands::Remove {
            stack,
            target,
            volumes,
        } => remove(&config, &stack, &target, volumes).await,
    }
}

/// Parse the recipe and dry-run its template with defaults.
async fn validate(config: &Config, path: &Path) -> Result<()> {
    let recipe = Recipe::load(path)?;
    config
        .renderer()
        .render(&recipe.template, &recipe.dry_run_values())
        .await?;
    println!("ok");
    Ok(())
}

async fn render(config: &Config, path: &Path, set: &[String]) -> Result<()> {
    let recipe = Recipe::load(path)?;
    let values = recipe.effective_values(&parse_set(&recipe, set)?);
    let missing = recipe.missing_required(&values);
    if !missing.is_empty() {
        return Err(DeployError::MissingOptions(missing).into());
    }
    let manifest = config.renderer().render(&recipe.template, &values).await?;
    print!("{manifest}");
    if !manifest.ends_with('\n') {
        println!();
    }
    Ok(())
}

struct DeployOptions {
    target: String,
    set: Vec<String>,
    recipes_dir: Option<PathBuf>,
    auto_provision: bool,
}

async fn deploy(
    config: &Config,
    path: &Path,
    options: DeployOptions,
    output: Output,
) -> Result<()> {
    let recipe = Recipe::load(path)?;
    let values = parse_set(&recipe, &options.set)?;
    let address = ServerAddress::parse(&options.target).map_err(Error::InvalidTarget)?;

    let catalog = match options.recipes_dir {
        Some(ref dir) => InMemoryCatalog::load_dir(dir)?,
        None => InMemoryCatalog::new(),
    };
    let slug = recipe.slug.clone();
    catalog.insert(recipe);
    let catalog: Arc<dyn RecipeCatalog> = Arc::new(catalog);

    let target = address.to_target();
    let target_id = target.id.clone();
    let targets = InMemoryTargets::new();
    targets.insert(target);

    let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(config.session(&address)));
    let orchestrator: Arc<dyn ContainerOrchestrator> = Arc::new(ComposeOrchestrator::new(
        Arc::clone(&executor),
        config.compose_settings(),
    ));
    let store: Arc<dyn DeploymentStore> = Arc::new(InMemoryStore::new());
    let broadcaster = Arc::new(ChannelBroadcaster::new(EVENT_BUFFER));
    let mut events = broadcaster.subscribe();

    let resolver = DependencyResolver::new(
        Arc::clone(&catalog),
        Arc::clone(&store),
        Arc::clone(&orchestrator),
    )
    .with_renderer(config.renderer())
    .with_settings(config.dependency_settings());

    let engine = DeploymentEngine::builder(catalog, Arc::new(targets), store, orchestrator, executor)
        .resolver(resolver)
        .broadcaster(broadcaster)
        .renderer(config.renderer())
        .settings(config.engine_settings())
        .build();

    output.progress(&format!("Deploying {} to {}", slug, target_id));

    let request = CreateRequest::new(&slug, target_id)
        .config(values)
        .auto_provision(options.auto_provision);
    let deployment = engine.create(request).await?;
    let id = deployment.id.clone();
    output.progress(&format!("  stack {}", deployment.stack_name));

    let terminal = engine.wait_for_terminal(&id, TERMINAL_POLL);
    tokio::pin!(terminal);
    let mut events_open = true;
    let mut interrupted = false;

    let finished = loop {
        tokio::select! {
            result = &mut terminal => break result?,
            message = events.recv(), if events_open => match message {
                Ok(message) if message.event.deployment_id() == &id => output.event(&message.event),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => events_open = false,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                output.progress("Interrupted, cancelling deployment...");
                if let Err(e) = engine.cancel(&id) {
                    tracing::warn!(deployment_id = %id, "cancel failed: {}", e);
                }
            }
        }
    };

    // Events published just before the terminal write are still queued.
    while let Ok(message) = events.try_recv() {
        if message.event.deployment_id() == &id {
            output.event(&message.event);
        }
    }

    output.finished(&finished);
    match finished.status {
        DeploymentStatus::Running => Ok(()),
        _ => Err(Error::Failed {
            id: id.to_string(),
            reason: finished.error_details,
        }),
    }
}

async fn remove(config: &Config, stack: &str, target: &str, volumes: bool) -> Result<()> {
    let address = ServerAddress::parse(target).map_err(Error::InvalidTarget)?;
    let host = address.to_target().address();
    let working_dir = stack_dir(&config.deploy.stacks_dir, stack)
        .map_err(OrchestratorError::from)?;

    let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(config.session(&address)));
    let orchestrator = ComposeOrchestrator::new(executor, config.compose_settings());

    let mut spec = RemovalSpec::new(host, stack).working_dir(working_dir);
    spec.include_volumes = volumes;

    let report = orchestrator
        .remove_with_cleanup(&CancelToken::never(), &spec)
        .await?;
    if report.all_succeeded() {
        println!("Removed {stack}");
    } else {
        for failure in &report.failed {
            eprintln!("  ✗ {}: {}", failure.phase, failure.error);
        }
        println!("Removed {stack} with {} cleanup failure(s)", report.failed.len());
    }
    Ok(())
}

/// Parse repeated `key=value` arguments, typed by the recipe's options.
fn parse_set(recipe: &Recipe, set: &[String]) -> Result<ConfigValues> {
    let mut values = ConfigValues::new();
    for arg in set {
        let (key, raw) = arg
            .split_once('=')
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| Error::InvalidSet(arg.clone()))?;
        values.insert(key.to_string(), recipe.coerce_value(key, raw));
    }
    Ok(values)
}
