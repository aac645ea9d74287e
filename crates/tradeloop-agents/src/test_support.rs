//! Scripted collaborators for driving the workflow in tests.
//!
//! `ScriptedReasoner` replays a queue of responses and records every prompt it
//! was given; `StaticMarket` serves a settable price. Neither touches the
//! network or the Claude CLI.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tradeloop_models::agent_state::{AgentState, MarketCycle, PlanStatus, TradeAction, TradingPlan};
use tradeloop_models::config::WorkflowConfig;
use tradeloop_models::market::MarketSnapshot;
use tradeloop_store::MemoryStateStore;

use crate::error::{AgentError, MarketDataError};
use crate::market::MarketDataSource;
use crate::reasoner::{Prompt, ReasoningAgent};
use crate::workflow::Workflow;

/// Reasoner that replays canned responses in order.
///
/// Once the queue is drained every further call fails with `AgentError::Cli`,
/// so an unexpected extra call shows up as a failed cycle rather than a hang.
pub struct ScriptedReasoner {
    name: String,
    responses: Mutex<VecDeque<Result<String, AgentError>>>,
    prompts: Mutex<Vec<Prompt>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedReasoner {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn replying(name: &str, response: &str) -> Self {
        Self::new(name).then_reply(response)
    }

    pub fn failing(name: &str, error: AgentError) -> Self {
        Self::new(name).then_fail(error)
    }

    pub fn then_reply(self, response: &str) -> Self {
        self.push(Ok(response.to_string()));
        self
    }

    pub fn then_fail(self, error: AgentError) -> Self {
        self.push(Err(error));
        self
    }

    /// Sleep before answering, for deadline tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, response: Result<String, AgentError>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningAgent for ScriptedReasoner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .responses
            .lock()
            .map_err(|e| AgentError::Cli(e.to_string()))?
            .pop_front();
        next.unwrap_or_else(|| Err(AgentError::Cli(format!("{} has no scripted response", self.name))))
    }
}

/// Market source with a single settable price.
pub struct StaticMarket {
    symbol: String,
    price: Mutex<Decimal>,
    unavailable: bool,
    snapshot_calls: AtomicUsize,
    price_calls: AtomicUsize,
}

impl StaticMarket {
    pub fn new(symbol: &str, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: Mutex::new(price),
            unavailable: false,
            snapshot_calls: AtomicUsize::new(0),
            price_calls: AtomicUsize::new(0),
        }
    }

    /// Every read fails with `DataUnavailable`.
    pub fn unavailable(symbol: &str) -> Self {
        Self {
            unavailable: true,
            ..Self::new(symbol, Decimal::ZERO)
        }
    }

    pub fn set_price(&self, price: Decimal) {
        if let Ok(mut p) = self.price.lock() {
            *p = price;
        }
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    fn price(&self) -> Result<Decimal, MarketDataError> {
        if self.unavailable {
            return Err(MarketDataError::DataUnavailable(format!(
                "no data for {}",
                self.symbol
            )));
        }
        self.price
            .lock()
            .map(|p| *p)
            .map_err(|e| MarketDataError::DataUnavailable(e.to_string()))
    }
}

#[async_trait]
impl MarketDataSource for StaticMarket {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn snapshot(&self) -> Result<MarketSnapshot, MarketDataError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let price = self.price()?;
        Ok(MarketSnapshot {
            symbol: self.symbol.clone(),
            timeframe: "1h".to_string(),
            current_price: price,
            volume_24h: Decimal::from(2_000),
            chart_reference: Some(format!("charts/{}_1h.png", self.symbol.replace('/', "_"))),
            timestamp: Utc::now(),
        })
    }

    async fn current_price(&self, _symbol: &str) -> Result<Decimal, MarketDataError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.price()
    }
}

/// The collaborators behind one test workflow, kept so tests can inspect them.
pub struct Harness {
    pub market: Arc<StaticMarket>,
    pub advisor: Arc<ScriptedReasoner>,
    pub reviewer: Arc<ScriptedReasoner>,
    pub store: Arc<MemoryStateStore>,
    pub workflow: Workflow,
}

impl Harness {
    pub fn new(
        market: StaticMarket,
        advisor: ScriptedReasoner,
        reviewer: ScriptedReasoner,
        store: MemoryStateStore,
        config: WorkflowConfig,
    ) -> Self {
        let market = Arc::new(market);
        let advisor = Arc::new(advisor);
        let reviewer = Arc::new(reviewer);
        let store = Arc::new(store);
        let workflow = Workflow::new(
            market.clone(),
            advisor.clone(),
            reviewer.clone(),
            store.clone(),
            config,
        );
        Self {
            market,
            advisor,
            reviewer,
            store,
            workflow,
        }
    }
}

/// Advisor reply in the signal dialect the advisor prompt asks for.
pub fn advisor_reply(signal: &str, confidence: f64, stop: f64, target: f64) -> String {
    serde_json::json!({
        "market_cycle": "bull_trend",
        "analysis": "Bull breakout above EMA 20",
        "signal": signal,
        "confidence": confidence,
        "stop_loss_level": stop,
        "take_profit_level": target,
    })
    .to_string()
}

pub fn review_reply(approved: bool, reasoning: &str) -> String {
    serde_json::json!({ "approved": approved, "reasoning": reasoning }).to_string()
}

/// ACTIVE BUY plan with the given levels.
pub fn active_buy_plan(stop: Decimal, target: Decimal) -> TradingPlan {
    TradingPlan {
        market_cycle: MarketCycle::BullTrend,
        action: TradeAction::Buy,
        target_price: target,
        stop_loss: stop,
        status: PlanStatus::Active,
        reasoning: "Bull breakout".to_string(),
    }
}

/// State holding `position` under an ACTIVE BUY plan.
pub fn state_with_plan(cash: Decimal, position: Decimal, plan: TradingPlan) -> AgentState {
    AgentState {
        cash_balance: cash,
        current_position: position,
        active_plan: Some(plan),
        last_update_time: Some(Utc::now()),
    }
}
