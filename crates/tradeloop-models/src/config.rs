use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level configuration for tradeloop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TradeloopConfig {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Where market snapshots come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Path to the shared SQLite market cache (written by the data pipeline).
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    /// Maximum number of entries in the in-memory moka cache.
    #[serde(default = "default_memory_capacity")]
    pub memory_max_capacity: u64,
    /// How long a cache read stays hot in memory.
    #[serde(default = "default_memory_ttl")]
    pub memory_ttl_seconds: u64,
    /// Directory holding rendered charts, if any.
    #[serde(default)]
    pub chart_dir: Option<String>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            timeframe: default_timeframe(),
            cache_path: default_cache_path(),
            memory_max_capacity: default_memory_capacity(),
            memory_ttl_seconds: default_memory_ttl(),
            chart_dir: None,
        }
    }
}

impl MarketConfig {
    /// Chart path for the configured symbol, e.g. `charts/BTC_USDT_1h.png`.
    pub fn chart_reference(&self) -> Option<String> {
        self.chart_dir.as_ref().map(|dir| {
            format!(
                "{}/{}_{}.png",
                dir.trim_end_matches('/'),
                self.symbol.replace('/', "_"),
                self.timeframe
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// SQLite file holding the agent state, keyed by symbol.
    #[serde(default = "default_state_path")]
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_state_path(),
        }
    }
}

/// Models and timeouts for the advisor and reviewer roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    #[serde(default = "default_advisor_model")]
    pub advisor_model: String,
    /// Model used for the risk-review role.
    #[serde(default = "default_reviewer_model")]
    pub reviewer_model: String,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            advisor_model: default_advisor_model(),
            reviewer_model: default_reviewer_model(),
            call_timeout_seconds: default_call_timeout(),
        }
    }
}

/// Sizing, gating and deadline knobs for the decision cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    /// Cash balance of a freshly initialized state.
    #[serde(default = "default_initial_cash")]
    pub initial_cash: Decimal,
    /// Fraction of cash committed on entry.
    #[serde(default = "default_allocation_fraction")]
    pub allocation_fraction: Decimal,
    /// Trades reported below this confidence are downgraded to HOLD.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    /// Deadline for one whole cycle.
    #[serde(default = "default_deadline")]
    pub deadline_seconds: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            initial_cash: default_initial_cash(),
            allocation_fraction: default_allocation_fraction(),
            min_confidence: default_min_confidence(),
            deadline_seconds: default_deadline(),
        }
    }
}

impl WorkflowConfig {
    /// Reject values that would break the cash and position invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_cash < Decimal::ZERO {
            return Err(format!("initial_cash must be >= 0, got {}", self.initial_cash));
        }
        if self.allocation_fraction <= Decimal::ZERO || self.allocation_fraction > Decimal::ONE {
            return Err(format!(
                "allocation_fraction must be in (0, 1], got {}",
                self.allocation_fraction
            ));
        }
        if self.min_confidence < Decimal::ZERO || self.min_confidence > Decimal::ONE {
            return Err(format!(
                "min_confidence must be in [0, 1], got {}",
                self.min_confidence
            ));
        }
        if self.deadline_seconds == 0 {
            return Err("deadline_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

fn default_symbol() -> String {
    "BTC/USDT".to_string()
}
fn default_timeframe() -> String {
    "1h".to_string()
}
fn default_cache_path() -> String {
    "data/market_cache.db".to_string()
}
fn default_memory_capacity() -> u64 {
    1_000
}
fn default_memory_ttl() -> u64 {
    5
}
fn default_state_path() -> String {
    "data/agent_state.db".to_string()
}
fn default_advisor_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}
fn default_reviewer_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}
fn default_call_timeout() -> u64 {
    60
}
fn default_initial_cash() -> Decimal {
    Decimal::new(10_000, 0)
}
fn default_allocation_fraction() -> Decimal {
    Decimal::new(99, 2)
}
fn default_min_confidence() -> Decimal {
    Decimal::new(7, 1)
}
fn default_deadline() -> u64 {
    120
}
