use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The advisor's classification of the current market. Advisory only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketCycle {
    BullTrend,
    BearTrend,
    TradingRange,
}

impl FromStr for MarketCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bull_trend" => Ok(Self::BullTrend),
            "bear_trend" => Ok(Self::BearTrend),
            "trading_range" => Ok(Self::TradingRange),
            other => Err(format!("unknown market cycle: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl FromStr for TradeAction {
    type Err = String;

    /// Case-insensitive: model output uses both `"buy"` and `"BUY"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "HOLD" => Ok(Self::Hold),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a plan across cycles.
///
/// `Pending` until the reviewer approves, `Active` while governing trading,
/// `Closed` once the position has been liquidated at stop or target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanStatus {
    #[default]
    Pending,
    Active,
    Filled,
    Closed,
}

/// A single proposed-then-governed trade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingPlan {
    pub market_cycle: MarketCycle,
    pub action: TradeAction,
    pub target_price: Decimal,
    pub stop_loss: Decimal,
    #[serde(default)]
    pub status: PlanStatus,
    /// Audit trail. Execution appends outcome annotations, never replaces.
    pub reasoning: String,
}

impl TradingPlan {
    /// Synthetic HOLD used when the advisor response can't be turned into a plan.
    pub fn fallback_hold(cause: impl fmt::Display) -> Self {
        Self {
            market_cycle: MarketCycle::TradingRange,
            action: TradeAction::Hold,
            target_price: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            status: PlanStatus::Pending,
            reasoning: format!("Error: {cause}"),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    /// Append an outcome note to the reasoning trail.
    pub fn annotate(&mut self, note: &str) {
        self.reasoning.push(' ');
        self.reasoning.push_str(note);
    }
}

/// The agent's durable memory. The only persisted entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentState {
    pub cash_balance: Decimal,
    #[serde(default)]
    pub current_position: Decimal,
    #[serde(default)]
    pub active_plan: Option<TradingPlan>,
    /// Set whenever a plan transitions to ACTIVE.
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
}

impl AgentState {
    /// Fresh state: all cash, flat, no plan.
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash_balance: initial_cash,
            current_position: Decimal::ZERO,
            active_plan: None,
            last_update_time: None,
        }
    }

    /// True when an ACTIVE plan is governing trading.
    pub fn has_active_plan(&self) -> bool {
        self.active_plan.as_ref().is_some_and(TradingPlan::is_active)
    }

    pub fn is_flat(&self) -> bool {
        self.current_position.is_zero()
    }
}
