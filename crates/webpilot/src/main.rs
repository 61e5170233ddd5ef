//! webpilot: run one browser task with an LLM planner
//!
//! Usage:
//!   webpilot [options] <task...>
//!   webpilot --help

mod cli;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wp_browser::{ChromeDriver, register_browser_actions};
use wp_core::{
    AgentState, CancelHandle, CapabilityRegistry, Config, ContextManager, HistoryStore, LlmClient, LlmPlanner,
    Orchestrator, PageContext, PageExtractor, TaskSpec,
};
use wp_mcp::McpRegistry;
use wp_tools::register_default_tools;

use cli::{CliArgs, RunMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match cli::parse_args(std::env::args().skip(1)) {
        Ok(RunMode::Run(args)) => args,
        Ok(RunMode::Help) => {
            cli::print_help();
            return Ok(());
        }
        Ok(RunMode::Version) => {
            println!("webpilot {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Err(e) => {
            eprintln!("webpilot: {}", e);
            eprintln!("Run 'webpilot --help' for usage.");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config(&args)?;
    tracing::info!(model = %config.llm.model, provider = ?config.llm.provider, "Starting webpilot");

    let completed = run(config, args).await?;
    if !completed {
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(args: &CliArgs) -> anyhow::Result<Config> {
    let mut config = match &args.config_path {
        Some(path) => {
            dotenvy::dotenv().ok();
            Config::from_toml_file(path)
        }
        None => Config::load(),
    }
    .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    if args.headful {
        config.browser.headless = false;
    }
    if let Some(path) = &args.history_db {
        config.history.db_path = Some(path.clone());
    }
    Ok(config)
}

async fn run(config: Config, args: CliArgs) -> anyhow::Result<bool> {
    let browser_config = config.browser.clone();
    let driver = tokio::task::spawn_blocking(move || ChromeDriver::launch(browser_config))
        .await?
        .map_err(|e| anyhow::anyhow!("Failed to start browser: {}", e))?;
    let driver = Arc::new(driver);

    let mut registry = CapabilityRegistry::with_action_timeout(config.browser.action_timeout());
    register_browser_actions(&mut registry, &config.browser)?;
    register_default_tools(&mut registry, &config.detector)?;

    let mcp = match McpRegistry::from_settings(&config.mcp, &mut registry).await {
        Ok(mcp) => mcp,
        Err(e) => {
            tracing::warn!(error = %e, "MCP initialization failed");
            None
        }
    };
    tracing::info!(capabilities = registry.len(), names = ?registry.names(), "Capability catalog ready");

    let llm = LlmClient::new(&config.llm).map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?;
    let page = PageContext::new(driver, PageExtractor::new(config.extractor.clone()));

    let mut orchestrator = Orchestrator::new(
        Arc::new(registry),
        Arc::new(LlmPlanner::new(llm)),
        page,
        ContextManager::new(config.context.clone()),
        config.agent.clone(),
    );
    if let Some(path) = &config.history.db_path {
        let store = HistoryStore::new(path).map_err(|e| anyhow::anyhow!("Failed to open history store: {}", e))?;
        tracing::info!(path = %path, "Persisting run history");
        orchestrator = orchestrator.with_history_store(store);
    }

    let signals = tokio::spawn(watch_interrupts(orchestrator.cancel_handle()));
    let outcome = orchestrator.run(task_spec(&args)).await;
    signals.abort();

    if let Some(mcp) = mcp {
        // Tool adapters still hold their clients; drop the orchestrator first
        drop(orchestrator);
        mcp.shutdown().await;
    }

    println!();
    for entry in &outcome.history {
        println!("  {}", entry.summary());
    }
    match &outcome.state {
        AgentState::Completed { summary } => {
            println!("Completed in {} steps ({:.1?}): {}", outcome.steps_executed, outcome.elapsed, summary);
        }
        AgentState::Failed(reason) => {
            println!("Failed after {} steps ({:.1?}): {}", outcome.steps_executed, outcome.elapsed, reason);
        }
        other => println!("Stopped in state {}", other.name()),
    }

    Ok(outcome.is_completed())
}

fn task_spec(args: &CliArgs) -> TaskSpec {
    let mut task = TaskSpec::new(args.task.clone());
    if let Some(url) = &args.start_url {
        task = task.start_url(url.clone());
    }
    if let Some(limit) = args.max_steps {
        task = task.step_limit(limit);
    }
    if let Some(limit) = args.timeout {
        task = task.wall_clock_limit(limit);
    }
    if let Some(fragment) = args.success_url.clone() {
        task = task.success_when(move |snapshot| snapshot.url().contains(&fragment));
    }
    task
}

/// First Ctrl+C cancels the run cooperatively, the second exits
async fn watch_interrupts(cancel: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::warn!("Interrupt received, stopping after the current step (press Ctrl+C again to quit)");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Second interrupt, exiting");
        std::process::exit(130);
    }
}
