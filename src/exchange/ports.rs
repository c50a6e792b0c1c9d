//! Port traits between the strategy and the exchange.
//!
//! The strategy only ever talks to these two interfaces; the live Bitget
//! client and the paper-trading mock both implement them. Keeping the seam
//! here means the state machine can be driven in tests without any network.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::PairConfig;
use crate::exchange::types::{FillStatus, FundingSnapshot, OrderHandle, OrderIntent};

/// Market-data fetch failures. All variants mean "no usable snapshot this
/// tick"; the strategy skips the tick and retries next interval.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("market data unavailable: {0}")]
    Unavailable(String),
    #[error("market data request timed out")]
    Timeout,
}

/// Execution failures.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The venue refused the order (insufficient balance, halted symbol, ...).
    /// The order was never live; the leg did not fill.
    #[error("order rejected: {0}")]
    Rejected(String),
    /// Transport-level failure; the order state is unknown until polled.
    #[error("execution transport error: {0}")]
    Transport(String),
    #[error("execution request timed out")]
    Timeout,
}

/// Read-only market data for one symbol pair. Pure query interface, no state.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetch the current funding rate, mark price, and spot price.
    async fn snapshot(&self, pair: &PairConfig) -> Result<FundingSnapshot, MarketDataError>;
}

/// Order placement and fill tracking. No internal state beyond what the
/// venue reports.
#[async_trait]
pub trait Execution: Send + Sync {
    /// Free USDT balance available for new positions.
    async fn available_capital_usd(&self) -> Result<Decimal, ExecutionError>;

    /// Submit a market order. Returns a handle for fill polling.
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderHandle, ExecutionError>;

    /// Query the fill state of a previously submitted order.
    async fn poll_fill(&self, handle: &OrderHandle) -> Result<FillStatus, ExecutionError>;
}
