//! Forge CLI
//!
//! The `forge` command drives capability synthesis from the terminal.
//!
//! ## Commands
//!
//! - `run`: forge a capability from a requirement (requires `--approve`)
//! - `registry list`: list installed capability modules
//! - `route`: ask the decision router what to do with one input
//! - `artifact show` / `artifact prune`: inspect and clean run artifacts

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn, Level};

use capability_registry::{CapabilityRegistry, FsCapabilityRegistry};
use forge_core::metrics::METRICS;
use forge_core::{
    obs, read_run_artifact, tools_from_registry, write_run_artifact, AbortHandle, Approval,
    CargoSandbox, DecisionRouter, Forge, ForgeConfig, ForgeRequest, ForgeRun,
    OllamaGateway, Requirement, RetentionPolicy,
};

#[derive(Parser)]
#[command(name = "forge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Staged capability synthesis with bounded repair", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "FORGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forge a new capability from a requirement
    Run {
        /// What the capability should do
        #[arg(short, long)]
        requirement: String,

        /// Short task name
        #[arg(short, long)]
        name: Option<String>,

        /// Grant approval for this run; without it the run aborts immediately
        #[arg(long)]
        approve: bool,

        /// Who approved the run
        #[arg(long, env = "USER", default_value = "operator")]
        approver: String,

        /// Attempt budget (overrides configuration)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Registry directory (overrides configuration)
        #[arg(long)]
        registry_dir: Option<PathBuf>,

        /// Run artifact directory (overrides configuration)
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,
    },

    /// Capability registry operations
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },

    /// Route one user input to a tool, a reply or a forge proposal
    Route {
        /// User input
        text: String,

        /// Recent conversation to include
        #[arg(short, long)]
        context: Option<String>,
    },

    /// Run artifact operations
    Artifact {
        #[command(subcommand)]
        action: ArtifactAction,
    },
}

#[derive(Subcommand)]
enum RegistryAction {
    /// List installed capability modules
    List {
        /// Registry directory (overrides configuration)
        #[arg(long)]
        registry_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ArtifactAction {
    /// Read and verify a run artifact
    Show {
        /// Run ID
        run_id: String,

        /// Run artifact directory (overrides configuration)
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,
    },

    /// Delete old run artifacts
    Prune {
        /// Remove runs older than this many days
        #[arg(long)]
        max_age_days: Option<u64>,

        /// Keep at most this many runs
        #[arg(long)]
        max_runs: Option<usize>,

        /// Run artifact directory (overrides configuration)
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,
    },
}

/// Printed by `forge run`.
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_id: String,
    requirement: &'a str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    capability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    attempts: u32,
    failures: Vec<String>,
    duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<String>,
}

impl<'a> RunSummary<'a> {
    fn new(run: &'a ForgeRun, artifact: Option<&Path>) -> Self {
        Self {
            run_id: run.run_id.to_string(),
            requirement: run.requirement.label(),
            outcome: run.outcome.tag(),
            capability: run.outcome.capability().map(|c| c.to_string()),
            reason: run.outcome.abort_reason().map(|r| r.to_string()),
            attempts: run.attempts,
            failures: run
                .history
                .iter()
                .map(|r| format!("attempt {} ({}): {}", r.attempt, r.stage.as_str(), r.summary))
                .collect(),
            duration_ms: run.duration_ms(),
            artifact: artifact.map(|p| p.display().to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    forge_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run {
            requirement,
            name,
            approve,
            approver,
            max_attempts,
            registry_dir,
            artifacts_dir,
        } => {
            let mut config = config;
            if let Some(n) = max_attempts {
                config.max_attempts = n;
            }
            if let Some(dir) = registry_dir {
                config.registry_dir = dir;
            }
            if let Some(dir) = artifacts_dir {
                config.artifacts_dir = dir;
            }
            config.validate()?;
            let request = build_request(&requirement, name.as_deref(), approve, &approver)?;
            cmd_run(&config, request).await
        }
        Commands::Registry { action } => match action {
            RegistryAction::List { registry_dir } => {
                let dir = registry_dir.unwrap_or_else(|| config.registry_dir.clone());
                cmd_registry_list(&dir).await
            }
        },
        Commands::Route { text, context } => cmd_route(&config, &text, context.as_deref()).await,
        Commands::Artifact { action } => match action {
            ArtifactAction::Show {
                run_id,
                artifacts_dir,
            } => {
                let dir = artifacts_dir.unwrap_or_else(|| config.artifacts_dir.clone());
                cmd_artifact_show(&run_id, &dir)
            }
            ArtifactAction::Prune {
                max_age_days,
                max_runs,
                artifacts_dir,
            } => {
                let dir = artifacts_dir.unwrap_or_else(|| config.artifacts_dir.clone());
                cmd_artifact_prune(&dir, max_age_days, max_runs)
            }
        },
    };

    METRICS.flush();
    result
}

fn load_config(path: Option<&Path>) -> Result<ForgeConfig> {
    match path {
        Some(p) => ForgeConfig::load(p)
            .with_context(|| format!("Failed to load configuration from {:?}", p)),
        None => ForgeConfig::from_env().context("Invalid configuration in environment"),
    }
}

fn build_request(
    requirement: &str,
    name: Option<&str>,
    approve: bool,
    approver: &str,
) -> Result<ForgeRequest> {
    let mut req = Requirement::new(requirement)?;
    if let Some(n) = name {
        req = req.with_name(n);
    }
    let approval = if approve {
        Approval::granted(approver)
    } else {
        Approval::Withheld
    };
    Ok(ForgeRequest::new(req, approval))
}

/// Forge one capability and persist the run artifact.
async fn cmd_run(config: &ForgeConfig, request: ForgeRequest) -> Result<()> {
    let gateway = OllamaGateway::new(config.gateway.clone())
        .context("Failed to build language-model gateway")?;
    if request.approval.is_granted() && !gateway.health_check().await {
        warn!(endpoint = %config.gateway.endpoint, "language model endpoint is not responding");
    }
    let sandbox = CargoSandbox::new(config.sandbox.clone()).context("Failed to prepare sandbox")?;
    let registry = FsCapabilityRegistry::new(&config.registry_dir)
        .with_context(|| format!("Failed to open registry at {:?}", config.registry_dir))?;

    let forge = Forge::from_model(
        Arc::new(gateway),
        Arc::new(sandbox),
        Arc::new(registry),
        config.policy(),
    );

    let abort = AbortHandle::new();
    let on_interrupt = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.abort("operator", "interrupted from terminal");
        }
    });

    let run = forge.run_with_abort(request, &abort).await;

    let artifact = match write_run_artifact(&run, &config.artifacts_dir) {
        Ok(path) => Some(path),
        Err(e) => {
            obs::emit_artifact_error(&run.run_id.to_string(), &e);
            None
        }
    };

    let summary = RunSummary::new(&run, artifact.as_deref());
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !run.outcome.is_success() {
        anyhow::bail!("forge run {} ended {}", run.run_id, run.outcome.tag());
    }
    Ok(())
}

async fn cmd_registry_list(dir: &Path) -> Result<()> {
    let registry = FsCapabilityRegistry::new(dir)
        .with_context(|| format!("Failed to open registry at {:?}", dir))?;
    let names = registry.list().await?;
    if names.is_empty() {
        println!("No capabilities installed in {:?}", dir);
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

async fn cmd_route(config: &ForgeConfig, text: &str, context: Option<&str>) -> Result<()> {
    let registry = FsCapabilityRegistry::new(&config.registry_dir)
        .with_context(|| format!("Failed to open registry at {:?}", config.registry_dir))?;
    let tools = tools_from_registry(&registry).await?;
    let gateway = OllamaGateway::new(config.gateway.clone())
        .context("Failed to build language-model gateway")?;

    let decision = DecisionRouter::new(Arc::new(gateway))
        .route(text, context, &tools)
        .await?;
    info!(tools = tools.len(), "routing decision made");
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn cmd_artifact_show(run_id: &str, dir: &Path) -> Result<()> {
    let run = read_run_artifact(run_id, dir)
        .with_context(|| format!("Failed to read run artifact {} from {:?}", run_id, dir))?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

fn cmd_artifact_prune(dir: &Path, max_age_days: Option<u64>, max_runs: Option<usize>) -> Result<()> {
    if max_age_days.is_none() && max_runs.is_none() {
        anyhow::bail!("Specify --max-age-days and/or --max-runs");
    }
    let pruned = RetentionPolicy {
        max_age_days,
        max_runs,
    }
    .prune(dir)?;
    println!("Pruned {} run artifact(s) from {:?}", pruned, dir);
    Ok(())
}
