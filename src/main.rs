//! Phalanx CLI - run one objective to completion

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use phalanx::{knowledge, Engine, EngineConfig, EngineEvent, FsResultSink, RemoteOracle};

/// Decompose an objective into a task tree and run it to completion.
#[derive(Debug, Parser)]
#[command(name = "phalanx", version, about)]
struct Cli {
    /// Short title for the objective
    title: String,
    /// Full description of what should be accomplished
    description: String,

    /// Directory where task outcomes are written
    #[arg(long, env = "PHALANX_LOG_PATH", default_value = "./logs")]
    log_path: String,

    /// Directory of reference files uploaded as worker context
    #[arg(long, env = "PHALANX_DATA_PATH")]
    data_path: Option<String>,

    /// Base URL of the reasoning service
    #[arg(long, env = "PHALANX_ORACLE_URL")]
    oracle_url: String,

    /// Bearer token for the reasoning service
    #[arg(long, env = "PHALANX_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Cap on concurrent oracle invocations
    #[arg(long, env = "PHALANX_MAX_CONCURRENCY", default_value_t = 16)]
    max_concurrency: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    info!(title = %cli.title, "Objective received");

    let oracle = Arc::new(RemoteOracle::new(cli.oracle_url, cli.api_key));
    let sink = Arc::new(FsResultSink::new(&cli.log_path));

    let mut config = EngineConfig {
        max_concurrency: cli.max_concurrency,
        ..EngineConfig::default()
    };

    if let Some(data_path) = &cli.data_path {
        println!("Gathering knowledge base files...");
        config.context_files =
            knowledge::seed_context(oracle.as_ref(), data_path.as_ref(), None).await;
        println!("Seeded {} context file(s)", config.context_files.len());
    }

    let (engine, mut events) = Engine::with_channel(oracle, sink, config);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::WorkerCreated { name, .. } => {
                    println!("Created worker \"{name}\"");
                }
                EngineEvent::TaskCreated { title, .. } => {
                    println!("Created task \"{title}\"");
                }
                EngineEvent::TaskCompleted { title, .. } => {
                    println!("Completed task \"{title}\"");
                }
                EngineEvent::Warning { message } => {
                    eprintln!("warning: {message}");
                }
                EngineEvent::TaskDispatched { .. } => {}
            }
        }
    });

    let outcome = engine
        .run_objective(&cli.title, &cli.description)
        .await
        .context("objective failed")?;

    drop(engine);
    let _ = printer.await;

    println!("\n{outcome}");
    Ok(())
}
