// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! LLM Orchestrator CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use llm_orchestrator_benchmarks::{
    benchmarks::io::{write_raw_results, write_summary},
    run_all_benchmarks,
};
use llm_orchestrator_core::{validator, Engine, EngineConfig, HandlerRegistry, WorkflowDefinition};
use llm_orchestrator_providers::{AnthropicProvider, OpenAIProvider};
use llm_orchestrator_router::{
    ModelCatalog, ModelDescriptor, ProviderRegistry, RoutingClient, SpendLedger, SteeringRuleSet,
    TenantSpend,
};
use llm_orchestrator_secrets::{EnvSecretAccessor, SecretAccessorRef};
use llm_orchestrator_state::{
    ExecutionMode, ExecutionStore, ExecutionStoreRef, InMemoryExecutionStore, LogLevel,
    SqlxExecutionStore,
};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "llm-orchestrator")]
#[command(version, about = "Auterity Workflow Orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Tenant id the principal acts as (stands in for resolved auth)
    #[arg(long, global = true, default_value = "default")]
    tenant: String,

    /// User id the principal acts as
    #[arg(long, global = true, default_value = "cli-user")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow definition
    Validate {
        /// Path to workflow file
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Run a workflow
    Run {
        /// Path to workflow file
        #[arg(value_name = "FILE")]
        file: String,

        /// Input JSON string or file
        #[arg(short, long)]
        input: Option<String>,

        /// Invocation mode: sync (await completion) or async (return immediately)
        #[arg(long, default_value = "sync")]
        mode: String,

        /// Maximum concurrent steps (overrides MAX_CONCURRENCY / the workflow default)
        #[arg(long)]
        max_concurrency: Option<usize>,
    },

    /// Show an execution's status and step records
    Status {
        /// Execution id
        execution_id: String,
    },

    /// Show an execution's log stream
    Logs {
        /// Execution id
        execution_id: String,

        /// Only return entries with sequence greater than this value
        #[arg(long)]
        since: Option<i64>,

        /// Poll for new entries every second until the execution is terminal
        #[arg(short, long)]
        follow: bool,
    },

    /// Request cancellation of a running execution
    Cancel {
        /// Execution id
        execution_id: String,
    },

    /// Run the canonical benchmark suite
    Benchmark {
        /// Output directory for benchmark results
        #[arg(short, long, default_value = "benchmarks/output")]
        output: String,

        /// Output format: json, markdown, or both
        #[arg(short, long, default_value = "both")]
        format: String,

        /// Run benchmarks quietly (no progress output)
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("llm_orchestrator={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Validate { file } => validate_workflow(&file),
        Commands::Run {
            file,
            input,
            mode,
            max_concurrency,
        } => run_workflow(&file, input.as_deref(), &mode, max_concurrency, &cli.tenant, &cli.user).await,
        Commands::Status { execution_id } => status_command(&execution_id).await,
        Commands::Logs {
            execution_id,
            since,
            follow,
        } => logs_command(&execution_id, since, follow).await,
        Commands::Cancel { execution_id } => cancel_command(&execution_id).await,
        Commands::Benchmark {
            output,
            format,
            quiet,
        } => run_benchmarks(&output, &format, quiet).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_workflow_definition(file_path: &str) -> Result<WorkflowDefinition> {
    let content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read workflow file: {}", file_path))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse workflow definition: {}", file_path))
}

fn validate_workflow(file_path: &str) -> Result<()> {
    info!("Validating workflow: {}", file_path);
    println!("{} {}", "Validating workflow:".cyan().bold(), file_path);

    let def = load_workflow_definition(file_path)?;
    info!("Parsed workflow: {} v{}", def.name, def.version);

    let dag = validator::validate(&def).with_context(|| "Workflow validation failed")?;

    println!("{}", "✓ Workflow is valid".green().bold());
    println!("  Name: {}", def.name);
    println!("  Version: {}", def.version);
    println!("  Steps: {}", dag.step_ids().len());

    Ok(())
}

/// Reads `DATABASE_URL`; when set, connects and migrates a `SqlxExecutionStore`
/// so `status`/`logs`/`cancel` can observe state written by a prior `run`
/// invocation. Otherwise falls back to an in-memory store scoped to this
/// process, which only the `run` command itself can then observe.
async fn build_store() -> Result<ExecutionStoreRef> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let store = SqlxExecutionStore::connect(&url)
                .await
                .with_context(|| "Failed to connect to DATABASE_URL")?;
            store.migrate().await.with_context(|| "Failed to migrate execution store schema")?;
            Ok(Arc::new(store))
        }
        Err(_) => {
            warn!("DATABASE_URL not set; using an in-memory store scoped to this process");
            Ok(Arc::new(InMemoryExecutionStore::new()))
        }
    }
}

/// Wires an AI Routing Client from whatever provider credentials are present
/// in the environment, or returns `None` if no provider is configured (a
/// workflow with no `ai` steps runs fine without one).
fn build_router(store: ExecutionStoreRef) -> Option<Arc<RoutingClient>> {
    let mut providers: ProviderRegistry = ProviderRegistry::new();

    if let Ok(openai) = OpenAIProvider::from_env() {
        info!("Registered OpenAI provider");
        providers.insert("openai".to_string(), Arc::new(openai));
    }
    if let Ok(anthropic) = AnthropicProvider::from_env() {
        info!("Registered Anthropic provider");
        providers.insert("anthropic".to_string(), Arc::new(anthropic));
    }

    if providers.is_empty() {
        info!("No LLM provider credentials found; workflows with `ai` steps will fail");
        return None;
    }

    let catalog = ModelCatalog::new()
        .with_model(ModelDescriptor {
            model_id: "gpt-4o-mini".to_string(),
            provider: "openai".to_string(),
            capabilities: ["chat".to_string()].into_iter().collect(),
            estimated_cost_cents: 1,
            quality_score: 6,
        })
        .with_model(ModelDescriptor {
            model_id: "gpt-4o".to_string(),
            provider: "openai".to_string(),
            capabilities: ["chat".to_string(), "vision".to_string()].into_iter().collect(),
            estimated_cost_cents: 5,
            quality_score: 9,
        })
        .with_model(ModelDescriptor {
            model_id: "claude-3-5-sonnet".to_string(),
            provider: "anthropic".to_string(),
            capabilities: ["chat".to_string(), "vision".to_string()].into_iter().collect(),
            estimated_cost_cents: 4,
            quality_score: 9,
        });

    Some(Arc::new(RoutingClient::new(
        catalog,
        SteeringRuleSet::default(),
        providers,
        Arc::new(StoreBackedLedger { store }),
    )))
}

/// Bridges the router's abstract `SpendLedger` to the execution store's
/// per-tenant budget counter (§4.3 step 3 / §5's one cross-execution hotspot).
struct StoreBackedLedger {
    store: ExecutionStoreRef,
}

#[async_trait::async_trait]
impl SpendLedger for StoreBackedLedger {
    async fn current_spend(&self, tenant_id: &str) -> TenantSpend {
        match self.store.get_tenant_budget(tenant_id).await {
            Ok(Some(budget)) => TenantSpend {
                spend_cents: budget.period_spend_cents,
                cap_cents: budget.budget_cap_cents,
            },
            _ => TenantSpend {
                spend_cents: 0,
                cap_cents: i64::MAX,
            },
        }
    }

    async fn record_spend(&self, tenant_id: &str, cost_cents: i64) {
        if let Err(e) = self.store.record_spend(tenant_id, cost_cents).await {
            warn!(tenant_id, error = %e, "failed to record AI spend");
        }
    }
}

fn build_engine(store: ExecutionStoreRef, secrets: SecretAccessorRef) -> Engine {
    let router = build_router(store.clone());
    Engine::new(EngineConfig::from_env(), store, HandlerRegistry::new().with_builtins(), secrets, router)
}

async fn run_workflow(
    file_path: &str,
    input: Option<&str>,
    mode: &str,
    max_concurrency: Option<usize>,
    tenant: &str,
    user: &str,
) -> Result<()> {
    info!("Running workflow: {}", file_path);
    println!("{} {}", "Running workflow:".cyan().bold(), file_path);

    let def = load_workflow_definition(file_path)?;
    validator::validate(&def).with_context(|| "Workflow validation failed")?;

    let inputs = match input {
        Some(s) => parse_input(s)?,
        None => Value::Object(Default::default()),
    };
    info!("Workflow inputs: {}", inputs);

    let mode = match mode {
        "sync" => ExecutionMode::Sync,
        "async" => ExecutionMode::Async,
        other => anyhow::bail!("unknown --mode '{other}', expected 'sync' or 'async'"),
    };

    let store = build_store().await?;
    let secrets: SecretAccessorRef = Arc::new(EnvSecretAccessor::new());
    let mut config = EngineConfig::from_env();
    if let Some(max_concurrency) = max_concurrency {
        config.max_concurrency = max_concurrency;
    }
    let router = build_router(store.clone());
    let engine = Engine::new(config, store.clone(), HandlerRegistry::new().with_builtins(), secrets, router);

    println!("{}", "Executing workflow...".cyan());
    let execution_id = engine
        .execute(&def, tenant, user, inputs, mode)
        .await
        .with_context(|| "Failed to start workflow execution")?;

    if mode == ExecutionMode::Async {
        println!("{}", "✓ Execution started".green().bold());
        println!("  Execution id: {}", execution_id);
        println!("  Check progress with: llm-orchestrator status {}", execution_id);
        return Ok(());
    }

    let snapshot = store
        .load_execution_snapshot(execution_id)
        .await
        .with_context(|| "Failed to load execution snapshot")?;

    match snapshot.execution.status {
        llm_orchestrator_state::ExecutionStatus::Completed => {
            println!("{}", "✓ Workflow completed successfully".green().bold());
        }
        status => {
            println!("{} {:?}", "✗ Workflow did not complete:".red().bold(), status);
            if let Some(reason) = &snapshot.execution.error_message {
                println!("  {}", reason);
            }
        }
    }

    println!("\n{}", "Step records:".cyan().bold());
    for step in &snapshot.step_records {
        println!("  {} {:?}", step.step_id, step.status);
    }

    if let Some(outputs) = &snapshot.execution.outputs {
        println!("\n{}", "Outputs:".cyan().bold());
        println!("{}", serde_json::to_string_pretty(outputs).unwrap_or_default());
    }

    if snapshot.execution.status != llm_orchestrator_state::ExecutionStatus::Completed {
        std::process::exit(1);
    }

    Ok(())
}

async fn status_command(execution_id: &str) -> Result<()> {
    let execution_id = Uuid::parse_str(execution_id).with_context(|| "Invalid execution id")?;
    let store = build_store().await?;
    let snapshot = store
        .load_execution_snapshot(execution_id)
        .await
        .with_context(|| "Failed to load execution snapshot")?;

    println!("{} {}", "Execution:".cyan().bold(), snapshot.execution.id);
    println!("  Status: {:?}", snapshot.execution.status);
    println!("  Tenant: {}", snapshot.execution.tenant_id);
    println!("  Mode: {:?}", snapshot.execution.mode);
    if let Some(kind) = &snapshot.execution.error_kind {
        println!("  Error: {} ({})", snapshot.execution.error_message.as_deref().unwrap_or(""), kind);
    }

    println!("\n{}", "Steps:".cyan().bold());
    for step in &snapshot.step_records {
        println!("  {} {:?} ({} attempt(s))", step.step_id, step.status, step.attempts);
    }

    if !snapshot.routing_decisions.is_empty() {
        println!("\n{}", "Routing decisions:".cyan().bold());
        for decision in &snapshot.routing_decisions {
            println!(
                "  {} -> {} ({}, {}c)",
                decision.step_id, decision.model_id, decision.provider, decision.actual_cost_cents
            );
        }
    }

    Ok(())
}

async fn logs_command(execution_id: &str, since: Option<i64>, follow: bool) -> Result<()> {
    let execution_id = Uuid::parse_str(execution_id).with_context(|| "Invalid execution id")?;
    let store = build_store().await?;
    let mut cursor = since;

    loop {
        let entries = store
            .list_logs(execution_id, cursor, None)
            .await
            .with_context(|| "Failed to load logs")?;

        for entry in &entries {
            cursor = Some(entry.sequence);
            print_log_entry(entry);
        }

        if !follow {
            break;
        }

        let snapshot = store.load_execution_snapshot(execution_id).await;
        if matches!(snapshot, Ok(s) if s.execution.status.is_terminal()) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }

    Ok(())
}

fn print_log_entry(entry: &llm_orchestrator_state::LogEntry) {
    let level = match entry.level {
        LogLevel::Debug => "DEBUG".dimmed(),
        LogLevel::Info => "INFO".cyan(),
        LogLevel::Warn => "WARN".yellow(),
        LogLevel::Error => "ERROR".red(),
    };
    let step = entry.step_id.as_deref().unwrap_or("-");
    println!("[{}] {} {} {}", entry.sequence, level, step, entry.message);
}

async fn cancel_command(execution_id: &str) -> Result<()> {
    let execution_id = Uuid::parse_str(execution_id).with_context(|| "Invalid execution id")?;
    let store = build_store().await?;
    let secrets: SecretAccessorRef = Arc::new(EnvSecretAccessor::new());
    let engine = build_engine(store, secrets);

    engine
        .cancel_execution(execution_id)
        .await
        .with_context(|| "Failed to cancel execution")?;

    println!("{} {}", "✓ Cancellation requested for".green().bold(), execution_id);
    println!(
        "  {}",
        "Note: the running step(s) observe cancellation only if this CLI process is the one driving the execution.".dimmed()
    );
    Ok(())
}

fn parse_input(input_str: &str) -> Result<Value> {
    if Path::new(input_str).exists() {
        let content = fs::read_to_string(input_str)
            .with_context(|| format!("Failed to read input file: {}", input_str))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse input JSON from file: {}", input_str))
    } else {
        serde_json::from_str(input_str).with_context(|| "Failed to parse input JSON string")
    }
}

/// Runs the canonical benchmark suite.
async fn run_benchmarks(output_dir: &str, format: &str, quiet: bool) -> Result<()> {
    if !quiet {
        println!("{}", "Running LLM Orchestrator Benchmarks...".cyan().bold());
        println!();
    }

    info!("Starting benchmark suite");

    let results = run_all_benchmarks().await;

    if !quiet {
        println!(
            "{} {} benchmarks",
            "✓ Completed".green().bold(),
            results.len()
        );
        println!();

        for result in &results {
            let duration = result
                .metrics
                .get("duration_ms")
                .and_then(|v| v.as_f64())
                .map(|d| format!("{:.2}ms", d))
                .unwrap_or_else(|| "N/A".to_string());

            let ops = result
                .metrics
                .get("ops_per_sec")
                .and_then(|v| v.as_f64())
                .map(|o| format!("{:.0} ops/sec", o))
                .unwrap_or_else(|| "".to_string());

            println!(
                "  {} {} - {} {}",
                "●".green(),
                result.target_id.cyan(),
                duration,
                ops.dimmed()
            );
        }
        println!();
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir))?;

    let write_json = format == "json" || format == "both";
    let write_md = format == "markdown" || format == "both";

    if write_json {
        let paths = write_raw_results(&results, output_dir)
            .with_context(|| "Failed to write raw benchmark results")?;

        if !quiet {
            println!("{} JSON results written:", "✓".green().bold());
            for path in &paths {
                println!("  {}", path.dimmed());
            }
        }
    }

    if write_md {
        let summary_path = write_summary(&results, output_dir)
            .with_context(|| "Failed to write benchmark summary")?;

        if !quiet {
            println!(
                "{} Summary written: {}",
                "✓".green().bold(),
                summary_path.dimmed()
            );
        }
    }

    if !quiet {
        println!();
        println!("{}", "Benchmark suite completed successfully!".green().bold());
    }

    info!("Benchmark suite completed with {} results", results.len());

    Ok(())
}
