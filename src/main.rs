// src/main.rs
// CLI entry point: wires API keys + config into the orchestration engine
// and drives a single task through the department pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use forge::config::env::ApiKeys;
use forge::config::file::ForgeConfig;
use forge::departments::{
    ExecutionForeman, PlantManager, PreparationForeman, QualityGate, RAndDForeman,
};
use forge::feedback::FeedbackRouter;
use forge::llm::anthropic::AnthropicClient;
use forge::llm::labor::LaborClient;
use forge::llm::{LlmClient, Tier, TierRouter};
use forge::patterns::PatternTracker;
use forge::persistence::{ContextStore, SqliteContextStore};
use forge::task::{Department, Task, TaskState};

#[derive(Parser)]
#[command(name = "forge", about = "Agentic code-change orchestration engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a development request against a project directory.
    Run {
        /// Natural-language description of the change to make.
        request: String,
        /// Target project directory.
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
    /// Inspect the resolved configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (file + environment).
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env from ~/.forge/.env only (never from CWD — a malicious repo
    // must not be able to override API keys).
    if let Some(home) = dirs::home_dir() {
        if let Err(e) = dotenvy::from_path(home.join(".forge/.env")) {
            tracing::debug!("no global .env file loaded: {e}");
        }
    }

    let log_level = std::env::var("FORGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let level = match log_level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let cli = Cli::parse();
    let keys = ApiKeys::from_env();
    let config = ForgeConfig::load();

    match cli.command {
        None => {
            println!("forge: agentic code-change orchestration engine. Try `forge run \"<request>\" --project <dir>`.");
            Ok(())
        }
        Some(Commands::Config {
            action: ConfigAction::Show,
        }) => {
            println!("{config:#?}");
            println!("anthropic key present: {}", keys.anthropic.is_some());
            println!("labor key present: {}", keys.labor.is_some());
            Ok(())
        }
        Some(Commands::Run { request, project }) => {
            run_task(request, project, &keys, &config).await
        }
    }
}

fn build_router(keys: &ApiKeys, config: &ForgeConfig) -> Arc<TierRouter> {
    let mut clients: HashMap<Tier, Arc<dyn LlmClient>> = HashMap::new();

    if let Some(anthropic_key) = &keys.anthropic {
        let opus_model = config
            .tiers
            .opus_model
            .clone()
            .unwrap_or_else(|| "claude-opus-4-6".to_string());
        let sonnet_model = config
            .tiers
            .sonnet_model
            .clone()
            .unwrap_or_else(|| "claude-sonnet-4-6".to_string());
        clients.insert(
            Tier::Opus,
            Arc::new(AnthropicClient::new(anthropic_key.clone(), opus_model)),
        );
        clients.insert(
            Tier::Sonnet,
            Arc::new(AnthropicClient::new(anthropic_key.clone(), sonnet_model)),
        );
    } else {
        info!("no ANTHROPIC_API_KEY — opus and sonnet tiers will fail LLM calls");
    }

    if let Some(labor_key) = &keys.labor {
        let labor_model = config
            .tiers
            .labor_model
            .clone()
            .unwrap_or_else(|| "deepseek-chat".to_string());
        let base_url = config
            .tiers
            .labor_base_url
            .clone()
            .unwrap_or_else(|| "https://api.deepseek.com/chat/completions".to_string());
        clients.insert(
            Tier::Haiku,
            Arc::new(LaborClient::new(labor_key.clone(), labor_model, base_url)),
        );
    } else {
        info!("no FORGE_LABOR_API_KEY — haiku-class workers fall back to deterministic strategies only");
    }

    Arc::new(TierRouter::new(clients))
}

async fn run_task(
    raw_request: String,
    project: PathBuf,
    keys: &ApiKeys,
    config: &ForgeConfig,
) -> anyhow::Result<()> {
    let project_root = project.canonicalize().unwrap_or(project);
    let store_path = project_root.join(".forge").join("context.db");
    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store: Arc<dyn ContextStore> = Arc::new(SqliteContextStore::open(&store_path).await?);

    let router = build_router(keys, config);
    let patterns = Arc::new(PatternTracker::new(store.clone()));
    let feedback = Arc::new(FeedbackRouter::new(router.clone(), patterns.clone()));
    feedback.set_max_auto_retries(config.engine.max_auto_retries);

    let plant_manager = PlantManager::new(store.clone());
    let preparation = PreparationForeman::new(router.clone(), patterns.clone(), store.clone());
    let r_and_d = RAndDForeman::new(router.clone(), store.clone());
    let execution = ExecutionForeman::new(router.clone(), feedback.clone(), patterns.clone(), store.clone())
        .with_max_self_heal_attempts(config.engine.max_compilation_fix_attempts)
        .with_context_budget(config.engine.context_budget);
    let quality_gate = QualityGate::new(store.clone());

    let mut task = Task::new(raw_request, project_root.display().to_string());

    let classification = plant_manager.intake(&mut task).await?;
    info!(department = %classification.department, "task classified");

    if task.state() == TaskState::Blocked {
        println!("Task requires human sync before proceeding (low classification confidence).");
        return Ok(());
    }

    match classification.department {
        Department::Preparation => preparation.prepare(&mut task).await?,
        Department::RAndD => r_and_d.prepare(&mut task).await?,
    }

    if task.state() == TaskState::Failed {
        error!("preparation failed: {:?}", task.execution_result.as_ref().and_then(|r| r.error.clone()));
        return Ok(());
    }

    execution.execute(&mut task).await?;

    if task.state() == TaskState::Reviewing {
        quality_gate.review(&mut task).await?;
    }

    print_summary(&task);
    Ok(())
}

fn print_summary(task: &Task) {
    println!("task {} finished in state {}", task.id, task.state());
    if let Some(result) = &task.execution_result {
        println!(
            "  created: {:?}\n  modified: {:?}\n  compilation_passed: {} (attempts={}, self_healed={})\n  validation_passed: {}",
            result.files_created,
            result.files_modified,
            result.compilation_passed,
            result.compilation_attempts,
            result.compilation_self_healed,
            result.validation_passed,
        );
        println!("  cost: ${:.4}", result.cost_breakdown.total());
    }
    if let Some(quality) = &task.quality_result {
        println!("  quality recommendation: {}", quality.recommendation);
    }
}
