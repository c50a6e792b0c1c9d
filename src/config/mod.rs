//! Configuration management for the funding arb bot.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bitget API credentials
    #[serde(default)]
    pub bitget: BitgetConfig,
    /// The spot/perp pair this instance trades
    #[serde(default)]
    pub pair: PairConfig,
    /// Position sizing parameters
    #[serde(default)]
    pub sizing: SizingConfig,
    /// Execution and scheduling parameters
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BitgetConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key for signing requests
    #[serde(default)]
    pub api_secret: String,
    /// Passphrase set when the key was created
    #[serde(default)]
    pub api_passphrase: String,
}

/// The single spot/perp pair the strategy trades. Immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    /// Spot symbol, e.g. "BTCUSDT"
    #[serde(default = "default_spot_symbol")]
    pub spot_symbol: String,
    /// USDT-margined perp symbol, e.g. "BTCUSDT"
    #[serde(default = "default_perp_symbol")]
    pub perp_symbol: String,
    /// Minimum funding rate per interval to justify holding the spread
    #[serde(default = "default_funding_threshold")]
    pub funding_threshold: Decimal,
    /// Target USD notional per leg
    #[serde(default = "default_target_notional")]
    pub target_notional_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Minimum order notional in USDT; sizing below this is a no-op
    #[serde(default = "default_min_order_notional")]
    pub min_order_notional: Decimal,
    /// Spot quantity step size
    #[serde(default = "default_lot_size")]
    pub spot_lot_size: Decimal,
    /// Perp quantity step size
    #[serde(default = "default_lot_size")]
    pub perp_lot_size: Decimal,
    /// Maximum allowed spot/perp notional imbalance as a fraction of target
    #[serde(default = "default_notional_tolerance")]
    pub notional_tolerance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Seconds between strategy ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-call timeout for market-data and execution requests
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Ticks to wait for both legs to fill before declaring a mismatch
    #[serde(default = "default_max_fill_polls")]
    pub max_fill_polls: u32,
    /// Close the pair after holding this long; the funding window has passed
    #[serde(default = "default_max_hold_hours")]
    pub max_hold_hours: u32,
}

// Default value functions
fn default_spot_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_perp_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_funding_threshold() -> Decimal {
    Decimal::new(1, 4) // 0.0001 (0.01% per funding interval)
}

fn default_target_notional() -> Decimal {
    Decimal::new(50, 0) // $50
}

fn default_min_order_notional() -> Decimal {
    Decimal::new(5, 0) // $5, Bitget's spot minimum
}

fn default_lot_size() -> Decimal {
    Decimal::new(1, 6) // 0.000001
}

fn default_notional_tolerance() -> Decimal {
    Decimal::new(2, 2) // 0.02 (2% of target notional)
}

fn default_poll_interval() -> u64 {
    30
}

fn default_call_timeout() -> u64 {
    10
}

fn default_max_fill_polls() -> u32 {
    5
}

fn default_max_hold_hours() -> u32 {
    8 // Bitget settles funding every 8 hours
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("FARB"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values. Failures here are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.pair.spot_symbol.is_empty() && !self.pair.perp_symbol.is_empty(),
            "spot_symbol and perp_symbol must be set"
        );

        anyhow::ensure!(
            self.pair.funding_threshold > Decimal::ZERO,
            "funding_threshold must be positive"
        );

        anyhow::ensure!(
            self.pair.target_notional_usd > Decimal::ZERO,
            "target_notional_usd must be positive"
        );

        anyhow::ensure!(
            self.sizing.spot_lot_size > Decimal::ZERO && self.sizing.perp_lot_size > Decimal::ZERO,
            "lot sizes must be positive"
        );

        anyhow::ensure!(
            self.sizing.notional_tolerance > Decimal::ZERO
                && self.sizing.notional_tolerance < Decimal::ONE,
            "notional_tolerance must be between 0 and 1"
        );

        anyhow::ensure!(
            self.execution.poll_interval_secs >= 1,
            "poll_interval_secs must be at least 1"
        );

        anyhow::ensure!(
            self.execution.max_fill_polls >= 1,
            "max_fill_polls must be at least 1"
        );

        Ok(())
    }

    /// Validate that credentials are present. Required for live trading only.
    pub fn validate_credentials(&self) -> Result<()> {
        anyhow::ensure!(
            !self.bitget.api_key.is_empty()
                && !self.bitget.api_secret.is_empty()
                && !self.bitget.api_passphrase.is_empty(),
            "Bitget api_key, api_secret and api_passphrase are required for live trading"
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bitget: BitgetConfig::default(),
            pair: PairConfig::default(),
            sizing: SizingConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            spot_symbol: default_spot_symbol(),
            perp_symbol: default_perp_symbol(),
            funding_threshold: default_funding_threshold(),
            target_notional_usd: default_target_notional(),
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_order_notional: default_min_order_notional(),
            spot_lot_size: default_lot_size(),
            perp_lot_size: default_lot_size(),
            notional_tolerance: default_notional_tolerance(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            call_timeout_secs: default_call_timeout(),
            max_fill_polls: default_max_fill_polls(),
            max_hold_hours: default_max_hold_hours(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_has_no_credentials() {
        let config = Config::default();
        assert!(config.validate_credentials().is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = Config::default();
        config.pair.funding_threshold = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tolerance_bounds() {
        let mut config = Config::default();
        config.sizing.notional_tolerance = dec!(1.5);
        assert!(config.validate().is_err());
    }
}
