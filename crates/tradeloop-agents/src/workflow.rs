//! The decision cycle.
//!
//! One invocation walks `Analyze → Formulate → Review → Execute` (or a prefix
//! of it) to a `Done` phase. The single `AgentState` value is threaded through
//! every phase explicitly and written to the store at two checkpoints: after
//! review approval and on every exit of the execute step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use tradeloop_models::agent_state::{AgentState, PlanStatus, TradeAction, TradingPlan};
use tradeloop_models::config::WorkflowConfig;
use tradeloop_models::decision::{
    CycleOutcome, PlanOrigin, PlanProposal, Termination, TerminationReason,
};
use tradeloop_models::market::MarketSnapshot;
use tradeloop_store::StateStore;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{MarketDataError, WorkflowError};
use crate::market::MarketDataSource;
use crate::parser::{parse_advisor_plan, parse_review, AdvisorPlan};
use crate::prompts::{
    advisor_system_prompt, advisor_user_prompt, reviewer_system_prompt, reviewer_user_prompt,
};
use crate::reasoner::{Prompt, ReasoningAgent, Role};

pub const STOPPED_OUT: &str = "[Stopped Out]";
pub const TARGET_HIT: &str = "[Target Hit]";
pub const LOW_CONFIDENCE: &str = "(Low Confidence - Forced Hold)";

/// Where a cycle is, and the payload that phase needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// Recover state (given, persisted, or fresh) and decide whether to analyze.
    Analyze { prior: Option<AgentState> },
    /// Ask the advisor for a plan.
    Formulate {
        state: AgentState,
        snapshot: MarketSnapshot,
    },
    /// Gate a proposal through the reviewer.
    Review {
        state: AgentState,
        proposal: PlanProposal,
    },
    /// Enter or monitor the ACTIVE plan. `allow_entry` is false in the cycle
    /// that activated the plan, so the fill uses the next cycle's price.
    Execute { state: AgentState, allow_entry: bool },
    Done(CycleOutcome),
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Analyze { .. } => "analyze",
            Self::Formulate { .. } => "formulate",
            Self::Review { .. } => "review",
            Self::Execute { .. } => "execute",
            Self::Done(_) => "done",
        }
    }
}

/// Drives decision cycles against one symbol's persisted state.
///
/// Callers must not run two cycles for the same symbol concurrently.
pub struct Workflow {
    market: Arc<dyn MarketDataSource>,
    advisor: Arc<dyn ReasoningAgent>,
    reviewer: Arc<dyn ReasoningAgent>,
    store: Arc<dyn StateStore>,
    config: WorkflowConfig,
}

impl Workflow {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        advisor: Arc<dyn ReasoningAgent>,
        reviewer: Arc<dyn ReasoningAgent>,
        store: Arc<dyn StateStore>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            market,
            advisor,
            reviewer,
            store,
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run one cycle to completion under the configured deadline.
    ///
    /// `prior` resumes from a caller-held state; `None` loads from the store.
    /// On `DeadlineExceeded` the persisted state is unknown and should be
    /// re-read before the next cycle.
    pub async fn run(&self, prior: Option<AgentState>) -> Result<CycleOutcome, WorkflowError> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", %cycle_id, symbol = %self.market.symbol());
        let deadline = Duration::from_secs(self.config.deadline_seconds);

        tokio::time::timeout(deadline, self.drive(prior).instrument(span))
            .await
            .map_err(|_| WorkflowError::DeadlineExceeded(self.config.deadline_seconds))?
    }

    async fn drive(&self, prior: Option<AgentState>) -> Result<CycleOutcome, WorkflowError> {
        let start = Instant::now();
        let mut phase = Phase::Analyze { prior };

        loop {
            phase = match phase {
                Phase::Done(outcome) => {
                    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Cycle complete");
                    return Ok(outcome);
                }
                next => {
                    debug!(phase = next.name(), "Entering phase");
                    self.step(next).await?
                }
            };
        }
    }

    /// Advance one phase. `Done` maps to itself.
    pub async fn step(&self, phase: Phase) -> Result<Phase, WorkflowError> {
        match phase {
            Phase::Analyze { prior } => self.analyze(prior).await,
            Phase::Formulate { state, snapshot } => Ok(self.formulate(state, snapshot).await),
            Phase::Review { state, proposal } => self.review(state, proposal).await,
            Phase::Execute { state, allow_entry } => self.execute(state, allow_entry).await,
            done @ Phase::Done(_) => Ok(done),
        }
    }

    async fn analyze(&self, prior: Option<AgentState>) -> Result<Phase, WorkflowError> {
        let state = match prior {
            Some(state) => state,
            None => match self.store.load()? {
                Some(state) => state,
                None => {
                    info!(cash = %self.config.initial_cash, "No persisted state, initializing");
                    AgentState::new(self.config.initial_cash)
                }
            },
        };

        if state.has_active_plan() {
            info!("Active plan in force, skipping analysis");
            return Ok(Phase::Execute {
                state,
                allow_entry: true,
            });
        }

        let snapshot = self.market.snapshot().await?;
        info!(price = %snapshot.current_price, timeframe = %snapshot.timeframe, "Market snapshot");
        Ok(Phase::Formulate { state, snapshot })
    }

    /// Never fails: any advisor problem becomes a HOLD with a recorded origin.
    async fn formulate(&self, state: AgentState, snapshot: MarketSnapshot) -> Phase {
        let prompt = Prompt::new(
            Role::Advisor,
            advisor_system_prompt(),
            advisor_user_prompt(&snapshot),
        )
        .with_chart(snapshot.chart_reference.clone());

        let proposal = match self.advisor.complete(&prompt).await {
            Ok(raw) => self.proposal_from_response(&raw, snapshot),
            Err(e) => {
                warn!(advisor = self.advisor.name(), error = %e, "Advisor call failed");
                hold_proposal(TradingPlan::fallback_hold(&e), PlanOrigin::AdvisorFailed, None, snapshot)
            }
        };

        info!(
            action = %proposal.plan.action,
            origin = ?proposal.origin,
            confidence = ?proposal.confidence,
            "Plan formulated"
        );
        Phase::Review { state, proposal }
    }

    fn proposal_from_response(&self, raw: &str, snapshot: MarketSnapshot) -> PlanProposal {
        let AdvisorPlan { mut plan, confidence } = match parse_advisor_plan(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Advisor response unparseable");
                return hold_proposal(
                    TradingPlan::fallback_hold(&e),
                    PlanOrigin::Unparseable,
                    None,
                    snapshot,
                );
            }
        };

        if plan.action == TradeAction::Hold {
            return hold_proposal(plan, PlanOrigin::Advisor, confidence, snapshot);
        }

        if let Some(c) = confidence.filter(|c| *c < self.config.min_confidence) {
            debug!(confidence = %c, min = %self.config.min_confidence, "Below confidence threshold");
            plan.action = TradeAction::Hold;
            plan.annotate(LOW_CONFIDENCE);
            return hold_proposal(plan, PlanOrigin::LowConfidence, confidence, snapshot);
        }

        if let Err(cause) = check_levels(&plan, snapshot.current_price) {
            warn!(%cause, "Advisor plan has inconsistent levels");
            return hold_proposal(
                TradingPlan::fallback_hold(cause),
                PlanOrigin::Malformed,
                confidence,
                snapshot,
            );
        }

        PlanProposal {
            plan,
            origin: PlanOrigin::Advisor,
            confidence,
            snapshot,
        }
    }

    async fn review(
        &self,
        mut state: AgentState,
        proposal: PlanProposal,
    ) -> Result<Phase, WorkflowError> {
        let PlanProposal {
            mut plan,
            origin,
            snapshot,
            ..
        } = proposal;

        match plan.action {
            TradeAction::Hold => {
                return Ok(halt(
                    TerminationReason::Hold(origin),
                    format!("Hold Decision - No Action Taken: {}", plan.reasoning),
                ));
            }
            TradeAction::Sell => {
                info!("SELL proposal discarded before review");
                return Ok(halt(
                    TerminationReason::Unsupported,
                    format!("SELL plans are not supported; plan discarded: {}", plan.reasoning),
                ));
            }
            TradeAction::Buy => {}
        }

        let prompt = Prompt::new(
            Role::Reviewer,
            reviewer_system_prompt(),
            reviewer_user_prompt(&plan, snapshot.current_price),
        );

        let raw = match self.reviewer.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(reviewer = self.reviewer.name(), error = %e, "Reviewer call failed");
                return Ok(halt(
                    TerminationReason::ReviewFailed,
                    format!("Risk review failed, plan not activated: {e}"),
                ));
            }
        };

        let verdict = match parse_review(&raw) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "Reviewer response unparseable, failing closed");
                return Ok(halt(
                    TerminationReason::ReviewUnparseable,
                    format!("Risk review response unparseable, plan not activated: {e}"),
                ));
            }
        };

        if !verdict.approved {
            info!(reasoning = %verdict.reasoning, "Plan rejected");
            return Ok(halt(
                TerminationReason::Rejected,
                format!("Plan rejected by risk review: {}", verdict.reasoning),
            ));
        }

        plan.status = PlanStatus::Active;
        state.active_plan = Some(plan);
        state.last_update_time = Some(Utc::now());
        self.store.save(&state)?;
        info!(reasoning = %verdict.reasoning, "Plan approved and activated");

        Ok(Phase::Execute {
            state,
            allow_entry: false,
        })
    }

    async fn execute(
        &self,
        mut state: AgentState,
        allow_entry: bool,
    ) -> Result<Phase, WorkflowError> {
        let Some(action) = state
            .active_plan
            .as_ref()
            .filter(|plan| plan.is_active())
            .map(|plan| plan.action)
        else {
            warn!("Execute reached without an active plan");
            return self.finish(state);
        };

        if action != TradeAction::Buy {
            warn!(%action, "No execution rules for active plan action, leaving unchanged");
            return self.finish(state);
        }

        if state.is_flat() && !allow_entry {
            debug!("Plan activated this cycle, entry deferred");
            return self.finish(state);
        }

        let symbol = self.market.symbol().to_string();
        let price = self.market.current_price(&symbol).await?;
        if price <= Decimal::ZERO {
            return Err(MarketDataError::InvalidPrice { symbol, price }.into());
        }

        let out_of_range = || MarketDataError::PriceOutOfRange {
            symbol: symbol.clone(),
            price,
        };

        if state.is_flat() {
            let quantity = enter_position(&mut state, price, self.config.allocation_fraction)
                .map_err(|_| out_of_range())?;
            info!(
                %price,
                %quantity,
                cash = %state.cash_balance,
                "Entered position"
            );
        } else if let Some(note) = monitor_position(&mut state, price).map_err(|_| out_of_range())? {
            info!(%price, cash = %state.cash_balance, outcome = note, "Position closed");
        } else {
            debug!(%price, "Exit conditions not met");
        }

        self.finish(state)
    }

    fn finish(&self, state: AgentState) -> Result<Phase, WorkflowError> {
        self.store.save(&state)?;
        Ok(Phase::Done(CycleOutcome::State(state)))
    }
}

fn halt(reason: TerminationReason, message: String) -> Phase {
    info!(?reason, "Cycle halted");
    Phase::Done(CycleOutcome::Halted(Termination { reason, message }))
}

fn hold_proposal(
    plan: TradingPlan,
    origin: PlanOrigin,
    confidence: Option<Decimal>,
    snapshot: MarketSnapshot,
) -> PlanProposal {
    PlanProposal {
        plan: TradingPlan {
            action: TradeAction::Hold,
            ..plan
        },
        origin,
        confidence,
        snapshot,
    }
}

/// Exit levels must bracket the entry price on the correct sides.
fn check_levels(plan: &TradingPlan, price: Decimal) -> Result<(), String> {
    let ok = match plan.action {
        TradeAction::Buy => plan.stop_loss < price && price < plan.target_price,
        TradeAction::Sell => plan.target_price < price && price < plan.stop_loss,
        TradeAction::Hold => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!(
            "{} plan levels inconsistent with price {price} (stop {}, target {})",
            plan.action, plan.stop_loss, plan.target_price
        ))
    }
}

/// Position arithmetic left the representable `Decimal` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// Fixed-fraction full fill at `price`. Returns the quantity bought.
///
/// `state` is only touched once every product fits.
pub fn enter_position(
    state: &mut AgentState,
    price: Decimal,
    fraction: Decimal,
) -> Result<Decimal, Overflow> {
    let quantity = state
        .cash_balance
        .checked_mul(fraction)
        .and_then(|budget| budget.checked_div(price))
        .ok_or(Overflow)?;
    let cash = quantity
        .checked_mul(price)
        .and_then(|cost| state.cash_balance.checked_sub(cost))
        .ok_or(Overflow)?;

    state.cash_balance = cash;
    state.current_position = quantity;
    Ok(quantity)
}

/// Liquidate at `price` if the stop or target is hit. Returns the annotation
/// applied, or `None` when the plan stays ACTIVE.
pub fn monitor_position(
    state: &mut AgentState,
    price: Decimal,
) -> Result<Option<&'static str>, Overflow> {
    let Some(plan) = state.active_plan.as_ref() else {
        return Ok(None);
    };
    let note = if price <= plan.stop_loss {
        STOPPED_OUT
    } else if price >= plan.target_price {
        TARGET_HIT
    } else {
        return Ok(None);
    };

    let cash = state
        .current_position
        .checked_mul(price)
        .and_then(|proceeds| state.cash_balance.checked_add(proceeds))
        .ok_or(Overflow)?;

    if let Some(plan) = state.active_plan.as_mut() {
        plan.status = PlanStatus::Closed;
        plan.annotate(note);
    }
    state.cash_balance = cash;
    state.current_position = Decimal::ZERO;
    Ok(Some(note))
}
