//! Domain types shared by the ports, plus Bitget API payload definitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which side of the pair an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegKind {
    Spot,
    Perp,
}

impl LegKind {
    /// Get display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LegKind::Spot => "spot",
            LegKind::Perp => "perp",
        }
    }

    /// The other leg of the pair.
    pub fn other(&self) -> LegKind {
        match self {
            LegKind::Spot => LegKind::Perp,
            LegKind::Perp => LegKind::Spot,
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    /// The side that unwinds a fill on this side.
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// A point-in-time read of the market. Produced fresh each poll, never reused.
#[derive(Debug, Clone)]
pub struct FundingSnapshot {
    /// Signed fraction per funding interval, e.g. 0.0001 = 0.01%
    pub rate: Decimal,
    /// Perp mark price
    pub mark_price: Decimal,
    /// Spot last price
    pub spot_price: Decimal,
    /// Exchange-reported observation time
    pub observed_at: DateTime<Utc>,
}

/// A desired trade, produced by the strategy and consumed by the execution
/// port. Market orders only; quantity is in base units.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub side: OrderSide,
    pub symbol: String,
    pub quantity: Decimal,
    pub leg: LegKind,
}

/// Identifies a submitted order for fill polling.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderHandle {
    pub leg: LegKind,
    pub symbol: String,
    pub order_id: String,
}

/// Fill state of a submitted order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillStatus {
    Pending,
    Filled(Decimal),
    Cancelled,
}

// ==================== Bitget wire types ====================

/// Standard Bitget response envelope: `{"code":"00000","msg":"success","data":...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub code: String,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Bitget signals success with code "00000".
    pub fn is_ok(&self) -> bool {
        self.code == "00000"
    }
}

/// Current funding rate for a perp symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRateData {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub funding_rate: Decimal,
}

/// Perp ticker; carries the mark price and exchange timestamp.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerpTickerData {
    pub symbol: String,
    #[serde(rename = "markPrice", with = "rust_decimal::serde::str")]
    pub mark_price: Decimal,
    #[serde(rename = "ts", with = "string_millis")]
    pub timestamp_ms: i64,
}

/// Spot ticker; carries the last traded price.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotTickerData {
    pub symbol: String,
    #[serde(rename = "lastPr", with = "rust_decimal::serde::str")]
    pub last_price: Decimal,
}

/// Order placement acknowledgment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderData {
    pub order_id: String,
    #[serde(default)]
    pub client_oid: Option<String>,
}

/// Order detail as returned by the order-info endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetailData {
    pub order_id: String,
    /// live | partially_filled | filled | cancelled. Spot reports "status",
    /// mix reports "state"; spellings of cancelled differ too.
    #[serde(alias = "state")]
    pub status: String,
    #[serde(rename = "baseVolume", with = "rust_decimal::serde::str")]
    pub filled_quantity: Decimal,
}

impl OrderDetailData {
    /// Collapse Bitget's order status string into the port-level fill state.
    pub fn fill_status(&self) -> FillStatus {
        match self.status.as_str() {
            "filled" => FillStatus::Filled(self.filled_quantity),
            "cancelled" | "canceled" => FillStatus::Cancelled,
            _ => FillStatus::Pending,
        }
    }
}

/// One asset row from the spot account assets endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotAssetData {
    pub coin: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub available: Decimal,
}

/// Outgoing spot order body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: String,
    pub force: String,
    pub size: String,
}

/// Outgoing mix (perp) order body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MixOrderRequest {
    pub symbol: String,
    pub product_type: String,
    pub margin_coin: String,
    pub margin_mode: String,
    pub side: OrderSide,
    pub order_type: String,
    pub size: String,
}

/// Bitget returns timestamps as quoted millisecond strings.
mod string_millis {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<i64>().map_err(serde::de::Error::custom)
    }
}
