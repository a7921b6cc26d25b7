//! Pulse CLI - run a simulated job and watch its progress.

mod job;
mod logging;
mod stdout;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pulse_core::{ContextHolder, ExecutionContext, ProgressKey, PulseConfig};
use pulse_dispatch::Dispatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stdout::StdoutTransport;
use tracing::info;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Hierarchical progress tracking", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults apply when it does not exist
    #[arg(long, global = true, default_value = "pulse.json")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated weighted job
    Run {
        /// Label reported with every update
        #[arg(long, default_value = "demo")]
        code: String,
        /// Where progress goes
        #[arg(long, value_enum, default_value_t = Output::Stdout)]
        transport: Output,
        /// Parallel workers in the processing stage
        #[arg(long, default_value = "3")]
        workers: usize,
        /// Items per worker
        #[arg(long, default_value = "10")]
        items: u32,
        /// Milliseconds between two items
        #[arg(long, default_value = "20")]
        tick_ms: u64,
        /// Make this worker report an exception halfway
        #[arg(long)]
        fail_worker: Option<usize>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    /// JSON lines on stdout, throttled
    Stdout,
    /// Log lines only
    Log,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PulseConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    let _guard = logging::init(&config.log)?;

    match cli.command {
        Commands::Run {
            code,
            transport,
            workers,
            items,
            tick_ms,
            fail_worker,
        } => {
            let plan = job::JobPlan {
                workers,
                items,
                tick: Duration::from_millis(tick_ms),
                failing_worker: fail_worker,
            };
            run(&config, &code, transport, &plan).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run(config: &PulseConfig, code: &str, output: Output, plan: &job::JobPlan) -> Result<()> {
    let dispatcher = Arc::new(Dispatcher::from_config(config));

    let started_at = chrono::Utc::now().to_rfc3339();
    let holders: Vec<ContextHolder> = vec![Box::new(move |ctx: ExecutionContext| {
        ctx.with_metadata([("started_at", started_at.clone())])
    })];
    let ctx = ExecutionContext::new()
        .with_metadata([("job", code)])
        .attach(&holders);

    match output {
        Output::Stdout => {
            let transport = Arc::new(StdoutTransport::new());
            let session = dispatcher.open_session(code, transport.clone());
            info!("Reporting {} under session {}", code, session.key());
            let root = session.tracker_in(&ctx, code);
            job::run(&root, plan).await?;
            // Let the last throttled update go out before the session closes
            tokio::time::sleep(config.sender.cooldown() * 2).await;
            transport.close();
        }
        Output::Log => {
            let root = dispatcher.tracker_in(&ctx, &ProgressKey::generate(code), code);
            job::run(&root, plan).await?;
        }
    }

    info!("{} sessions left open", dispatcher.len());
    Ok(())
}
