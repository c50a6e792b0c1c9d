//! # Funding Arb
//!
//! Single-venue funding-rate arbitrage on Bitget: hold spot long + perp short
//! while the funding rate pays, close the pair when the edge decays.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Bitget REST client plus the market-data / execution ports
//! - `strategy`: Position state machine, sizing, and entry/exit logic
//! - `alert`: Alert events and sinks
//! - `runner`: The fixed-interval tick loop and shutdown handling
//! - `utils`: Shared decimal arithmetic helpers

pub mod alert;
pub mod config;
pub mod exchange;
pub mod runner;
pub mod strategy;
pub mod utils;

pub use config::Config;
