//! Exchange connectivity.
//!
//! ## Bitget
//! REST access to spot and USDT-margined futures:
//! - Market data (funding rate, mark price, spot ticker)
//! - Account operations (orders, fills, balances)
//!
//! ## Ports
//! The strategy depends only on the `MarketData` and `Execution` traits;
//! `BitgetClient` implements both for live trading, the mocks implement them
//! for paper trading and tests.

mod bitget;
pub mod mock;
mod ports;
mod types;

pub use bitget::BitgetClient;
pub use mock::{FillBehavior, MockExecution, MockMarketData};
pub use ports::{Execution, ExecutionError, MarketData, MarketDataError};
pub use types::*;
