use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent_state::{AgentState, TradingPlan};
use crate::market::MarketSnapshot;

/// Where a proposal's action came from.
///
/// Everything other than `Advisor` is a HOLD the workflow synthesized itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanOrigin {
    /// The advisor's own decision, taken as-is.
    Advisor,
    /// The advisor proposed a trade below the confidence threshold.
    LowConfidence,
    /// The advisor call itself failed (CLI error, timeout).
    AdvisorFailed,
    /// The advisor response could not be parsed into a plan.
    Unparseable,
    /// The plan parsed but its levels are inconsistent with its action.
    Malformed,
}

/// Advisor output carried from plan formulation into risk review. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanProposal {
    pub plan: TradingPlan,
    pub origin: PlanOrigin,
    pub confidence: Option<Decimal>,
    pub snapshot: MarketSnapshot,
}

/// The reviewer's structured answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewVerdict {
    pub approved: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// Why a cycle ended without returning state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "origin")]
pub enum TerminationReason {
    Hold(PlanOrigin),
    Rejected,
    ReviewUnparseable,
    /// The reviewer call failed; treated like an unparseable review.
    ReviewFailed,
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Termination {
    pub reason: TerminationReason,
    pub message: String,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of one workflow invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// HOLD, rejection, or review failure. Nothing was persisted.
    Halted(Termination),
    /// A plan was activated or execute/monitor ran.
    State(AgentState),
}

impl CycleOutcome {
    pub fn state(&self) -> Option<&AgentState> {
        match self {
            Self::State(state) => Some(state),
            Self::Halted(_) => None,
        }
    }

    pub fn termination(&self) -> Option<&Termination> {
        match self {
            Self::Halted(t) => Some(t),
            Self::State(_) => None,
        }
    }
}
