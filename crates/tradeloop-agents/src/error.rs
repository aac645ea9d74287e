use rust_decimal::Decimal;
use thiserror::Error;

/// Failures talking to, or making sense of, a reasoning collaborator.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: Decimal },

    #[error("Price for {symbol} out of range for position arithmetic: {price}")]
    PriceOutOfRange { symbol: String, price: Decimal },

    #[error("Market cache error: {0}")]
    Cache(#[from] tradeloop_store::StoreError),
}

/// The only errors that escape a cycle. Everything else becomes a terminal
/// outcome or a downgraded HOLD.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error("State store error: {0}")]
    Store(#[from] tradeloop_store::StoreError),

    #[error("Cycle exceeded its {0}s deadline; persisted state is unknown")]
    DeadlineExceeded(u64),
}
