use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tradeloop::agents::Workflow;
use tradeloop::models::agent_state::AgentState;
use tradeloop::models::config::TradeloopConfig;
use tradeloop::models::decision::CycleOutcome;
use tradeloop::store::StateStore;

const DEFAULT_CONFIG: &str = "config/tradeloop.toml";

#[derive(Parser, Debug)]
#[command(name = "tradeloop", about = "Autonomous single-symbol trading decision loop")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG, global = true)]
    config: String,

    /// Pretty-print output JSON
    #[arg(long, global = true)]
    pretty: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single decision cycle
    Run,
    /// Run cycles back to back until Ctrl-C
    Watch {
        /// Pause between the end of one cycle and the start of the next
        #[arg(long, default_value_t = 300)]
        interval_seconds: u64,
    },
    /// Print the persisted agent state
    State,
    /// Replace the persisted state with a fresh one
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Run => {
            let workflow = tradeloop::build_workflow(&config).context("Failed to build workflow")?;
            let outcome = workflow
                .run(None)
                .await
                .map_err(|e| anyhow::anyhow!("Cycle failed: {e}"))?;
            print_outcome(&outcome, cli.pretty)?;
        }
        Command::Watch { interval_seconds } => {
            let workflow = tradeloop::build_workflow(&config).context("Failed to build workflow")?;
            let cancel = CancellationToken::new();

            let signal = cancel.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received shutdown signal");
                signal.cancel();
            });

            watch(&workflow, Duration::from_secs(interval_seconds), cli.pretty, cancel).await;
        }
        Command::State => {
            let store = tradeloop::open_state_store(&config)?;
            match store.load().context("Failed to load state")? {
                Some(state) => println!("{}", to_json(&state, cli.pretty)?),
                None => println!("No persisted state for {}", config.market.symbol),
            }
        }
        Command::Reset => {
            let store = tradeloop::open_state_store(&config)?;
            let fresh = AgentState::new(config.workflow.initial_cash);
            store.save(&fresh).context("Failed to save state")?;
            tracing::info!(symbol = %config.market.symbol, cash = %fresh.cash_balance, "State reset");
            println!("{}", to_json(&fresh, cli.pretty)?);
        }
    }

    Ok(())
}

/// A missing file at the default path means "all defaults"; an explicit path must exist.
fn load_config(path: &str) -> Result<TradeloopConfig> {
    if path == DEFAULT_CONFIG && !Path::new(path).exists() {
        tracing::info!(path, "Config file not found, using defaults");
        return Ok(TradeloopConfig::default());
    }

    let config_str =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    tradeloop::parse_config(&config_str)
}

/// Sequential cycles: the next one starts only after the previous one finished.
async fn watch(workflow: &Workflow, interval: Duration, pretty: bool, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Watch loop starting");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = workflow.run(None) => match result {
                Ok(outcome) => {
                    if let Err(e) = print_outcome(&outcome, pretty) {
                        tracing::error!(error = %e, "Failed to print outcome");
                    }
                }
                // Retried at the next interval with state re-read from the store.
                Err(e) => tracing::error!(error = %e, "Cycle failed"),
            },
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Watch loop stopped");
}

fn print_outcome(outcome: &CycleOutcome, pretty: bool) -> Result<()> {
    match outcome {
        CycleOutcome::State(state) => println!("{}", to_json(state, pretty)?),
        CycleOutcome::Halted(termination) => println!("{termination}"),
    }
    Ok(())
}

fn to_json(state: &AgentState, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(state)?
    } else {
        serde_json::to_string(state)?
    };
    Ok(json)
}
