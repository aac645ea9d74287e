pub mod agent_state;
pub mod cache_schema;
pub mod config;
pub mod decision;
pub mod market;

pub use agent_state::{AgentState, MarketCycle, PlanStatus, TradeAction, TradingPlan};
pub use cache_schema::CacheRow;
pub use config::{AgentsConfig, MarketConfig, StoreConfig, TradeloopConfig, WorkflowConfig};
pub use decision::{
    CycleOutcome, PlanOrigin, PlanProposal, ReviewVerdict, Termination, TerminationReason,
};
pub use market::{Bar, MarketSnapshot, Quote};
