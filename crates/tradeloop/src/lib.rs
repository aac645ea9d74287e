//! tradeloop - an autonomous single-symbol trading decision loop.
//!
//! Each cycle recovers the persisted agent state, asks an advisor model for a
//! plan, gates it through a reviewer model, and enters or monitors the active
//! plan against the latest cached price.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tradeloop::models::config::TradeloopConfig;
//! use tradeloop::models::decision::CycleOutcome;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = TradeloopConfig::default();
//! let workflow = tradeloop::build_workflow(&config)?;
//! if let CycleOutcome::Halted(t) = workflow.run(None).await? {
//!     println!("{t}");
//! }
//! # Ok(())
//! # }
//! ```

pub use tradeloop_agents as agents;
pub use tradeloop_models as models;
pub use tradeloop_store as store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tradeloop_agents::{CacheMarketData, ClaudeReasoner, Workflow};
use tradeloop_models::config::TradeloopConfig;
use tradeloop_store::{CacheReader, SqliteReader, SqliteStateStore};

/// Open the state store for the configured symbol.
pub fn open_state_store(config: &TradeloopConfig) -> anyhow::Result<SqliteStateStore> {
    SqliteStateStore::open(&config.store.sqlite_path, &config.market.symbol)
        .with_context(|| format!("Failed to open state DB: {}", config.store.sqlite_path))
}

/// Build a Workflow wired to the market cache, the Claude CLI and the state store.
pub fn build_workflow(config: &TradeloopConfig) -> anyhow::Result<Workflow> {
    validate_config(config)?;

    let sqlite = SqliteReader::open(&config.market.cache_path)
        .with_context(|| format!("Failed to open market cache: {}", config.market.cache_path))?;
    let cache = Arc::new(CacheReader::new(
        sqlite,
        config.market.memory_max_capacity,
        Duration::from_secs(config.market.memory_ttl_seconds),
    ));
    let market = CacheMarketData::new(
        cache,
        config.market.symbol.clone(),
        config.market.timeframe.clone(),
        config.market.chart_reference(),
    );

    let timeout = Duration::from_secs(config.agents.call_timeout_seconds);
    let advisor = ClaudeReasoner::new("advisor", config.agents.advisor_model.clone(), timeout);
    let reviewer = ClaudeReasoner::new("reviewer", config.agents.reviewer_model.clone(), timeout);

    let store = open_state_store(config)?;

    Ok(Workflow::new(
        Arc::new(market),
        Arc::new(advisor),
        Arc::new(reviewer),
        Arc::new(store),
        config.workflow.clone(),
    ))
}

/// Parse and validate a TOML config. Every field has a default.
pub fn parse_config(toml_str: &str) -> anyhow::Result<TradeloopConfig> {
    let config: TradeloopConfig = toml::from_str(toml_str).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &TradeloopConfig) -> anyhow::Result<()> {
    config
        .workflow
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid [workflow] config: {e}"))
}
