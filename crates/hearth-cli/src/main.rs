//! CLI entry point for the Hearth home assistant.
//!
//! This binary provides the `hearth` command with subcommands for the
//! interactive REPL, a scripted demo conversation, and a configuration
//! status check.

mod settings;

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hearth_capability::{SessionConfig, SessionManager};
use hearth_graph::{AssistantGraph, GraphConfig};
use hearth_intent::{ChatClassifier, ClassifierConfig, IntentClassifier};
use hearth_state::ConversationState;

use crate::settings::Settings;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Hearth -- a home assistant that understands Chinese household requests.
#[derive(Parser)]
#[command(
    name = "hearth",
    version,
    about = "Hearth -- conversational home assistant",
    long_about = "A home assistant that classifies household requests (weather, device \
                  control, schedules, scenes) and answers them through remotely \
                  discovered capabilities."
)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the assistant and enter the REPL.
    Run,

    /// Run a scripted demo conversation and exit.
    Demo,

    /// Show the effective configuration.
    Status,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => cmd_run(cli.debug).await,
        Commands::Demo => cmd_demo(cli.debug).await,
        Commands::Status => cmd_status().await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(debug: bool) -> Result<()> {
    init_tracing(if debug { "debug" } else { "info" });

    info!("starting hearth");

    let settings = Settings::load().context("failed to load configuration")?;
    let graph = build_graph(&settings)?;

    let discovered = graph
        .warm_up()
        .await
        .context("capability discovery failed")?;
    if discovered > 0 {
        info!(capabilities = discovered, "remote capabilities ready");
    }

    println!();
    println!("  Hearth v{}", env!("CARGO_PKG_VERSION"));
    println!("  家庭助手已就绪。输入您的请求，'quit' 退出。");
    println!();

    let stdin = io::stdin();
    let reader = stdin.lock();
    let mut prior: Option<ConversationState> = None;

    for line in reader.lines() {
        let line = line.context("failed to read input")?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed == "quit" || trimmed == "exit" {
            info!("user requested exit");
            break;
        }

        let state = graph.process_turn(trimmed, prior.as_ref()).await;
        println!("  {}", state.assistant_response);
        prior = Some(state);
    }

    info!("shutting down");
    graph.shutdown().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: demo
// ---------------------------------------------------------------------------

/// Scripted utterances covering each major workflow.
const DEMO_QUERIES: &[&str] = &[
    "东莞今天天气怎么样？",
    "打开客厅的灯",
    "你是谁？",
    "设置晚上8点的提醒",
    "帮我关空调",
];

async fn cmd_demo(debug: bool) -> Result<()> {
    init_tracing(if debug { "debug" } else { "warn" });

    let settings = Settings::load().context("failed to load configuration")?;
    let graph = build_graph(&settings)?;

    graph
        .warm_up()
        .await
        .context("capability discovery failed")?;

    for query in DEMO_QUERIES {
        println!();
        println!("🧪 用户查询: '{query}'");

        let state = graph.process_turn(query, None).await;

        println!("🤖 助手回复: {}", state.assistant_response);
        println!("📊 识别意图: {}", state.primary_intent);
    }

    println!();
    graph.shutdown().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

async fn cmd_status() -> Result<()> {
    init_tracing("warn");

    println!();
    println!("  Hearth Status");
    println!("  =============");
    println!();

    let config_path = std::path::Path::new(settings::DEFAULT_CONFIG_PATH);
    if config_path.exists() {
        println!("  Config file:       OK ({})", config_path.display());
    } else {
        println!("  Config file:       none (using defaults and environment)");
    }

    match std::env::var("HEARTH_CLASSIFIER_API_KEY") {
        Ok(_) => println!("  Classifier key:    SET"),
        Err(_) => println!("  Classifier key:    NOT SET in environment"),
    }

    match Settings::load() {
        Ok(settings) => {
            println!("  Configuration:     VALID");
            println!("  Capability server: {}", settings.capability_url);
            println!("  Classifier model:  {}", settings.classifier.model);
            println!("  Default city:      {}", settings.default_city);
        }
        Err(e) => {
            println!("  Configuration:     INVALID ({e:#})");
        }
    }

    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Wire the graph from validated settings.
fn build_graph(settings: &Settings) -> Result<AssistantGraph> {
    let classifier_config = ClassifierConfig::new(
        &settings.classifier.base_url,
        &settings.classifier.api_key,
        &settings.classifier.model,
    )
    .with_timeout(settings.classifier_timeout());

    let service =
        ChatClassifier::new(classifier_config).context("failed to build classification client")?;
    let classifier = IntentClassifier::new(Arc::new(service));

    let endpoint = settings.capability_endpoint()?;
    let session = SessionManager::new(SessionConfig::new(endpoint))
        .context("failed to build capability session")?;

    let graph_config = GraphConfig::default()
        .with_turn_timeout(settings.turn_timeout())
        .with_default_city(&settings.default_city);

    Ok(AssistantGraph::new(
        classifier,
        Arc::new(session),
        graph_config,
    ))
}

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
