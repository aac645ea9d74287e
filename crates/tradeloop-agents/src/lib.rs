pub mod claude_cli;
pub mod error;
pub mod market;
pub mod parser;
pub mod prompts;
pub mod reasoner;
pub mod workflow;

pub mod test_support;

pub use error::{AgentError, MarketDataError, WorkflowError};
pub use market::{CacheMarketData, MarketDataSource};
pub use reasoner::{ClaudeReasoner, Prompt, ReasoningAgent, Role};
pub use workflow::{Phase, Workflow};
