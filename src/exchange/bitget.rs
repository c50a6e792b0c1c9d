//! Bitget REST API client.

use crate::config::{BitgetConfig, PairConfig};
use crate::exchange::ports::{Execution, ExecutionError, MarketData, MarketDataError};
use crate::exchange::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

const REST_BASE_URL: &str = "https://api.bitget.com";
const PRODUCT_TYPE: &str = "USDT-FUTURES";
const MARGIN_COIN: &str = "USDT";

/// Bitget API client for both spot and USDT-margined futures.
pub struct BitgetClient {
    http: Client,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    base_url: String,
}

impl BitgetClient {
    /// Create a new Bitget client from configuration.
    pub fn new(config: &BitgetConfig) -> Result<Self> {
        Self::with_base_url(config, REST_BASE_URL)
    }

    /// Create a client against an alternate base URL (test servers).
    pub fn with_base_url(config: &BitgetConfig, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_passphrase: config.api_passphrase.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Generate the request signature: base64(HMAC-SHA256(secret, prehash))
    /// over `timestamp + METHOD + requestPath + body`.
    fn sign(&self, timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
        let prehash = format!("{}{}{}{}", timestamp, method, request_path, body);
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(prehash.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Get current timestamp in milliseconds.
    fn timestamp() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis()
            .to_string()
    }

    /// Build a query string with percent-encoded values, sorted as given.
    fn query_string(params: &[(&str, &str)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Unsigned GET for public market data.
    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, MarketDataError> {
        let query = Self::query_string(params);
        let url = format!("{}{}?{}", self.base_url, path, query);

        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                MarketDataError::Timeout
            } else {
                MarketDataError::Unavailable(e.to_string())
            }
        })?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| MarketDataError::Unavailable(format!("malformed payload: {}", e)))?;

        if !envelope.is_ok() {
            return Err(MarketDataError::Unavailable(format!(
                "code {}: {}",
                envelope.code, envelope.msg
            )));
        }

        envelope
            .data
            .ok_or_else(|| MarketDataError::Unavailable("empty data field".to_string()))
    }

    /// Signed GET for account endpoints.
    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ExecutionError> {
        let request_path = if params.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, Self::query_string(params))
        };
        let url = format!("{}{}", self.base_url, request_path);

        let timestamp = Self::timestamp();
        let signature = self.sign(&timestamp, "GET", &request_path, "");

        let response = self
            .http
            .get(&url)
            .header("ACCESS-KEY", &self.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp)
            .header("ACCESS-PASSPHRASE", &self.api_passphrase)
            .header("Content-Type", "application/json")
            .header("locale", "en-US")
            .send()
            .await
            .map_err(map_transport)?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ExecutionError::Transport(format!("malformed payload: {}", e)))?;

        if !envelope.is_ok() {
            return Err(ExecutionError::Transport(format!(
                "code {}: {}",
                envelope.code, envelope.msg
            )));
        }

        envelope
            .data
            .ok_or_else(|| ExecutionError::Transport("empty data field".to_string()))
    }

    /// Signed POST for order placement. A non-success envelope code here means
    /// the venue refused the order, which maps to `Rejected`.
    async fn post_signed<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ExecutionError> {
        let body_str = serde_json::to_string(body)
            .map_err(|e| ExecutionError::Transport(format!("body serialization: {}", e)))?;
        let url = format!("{}{}", self.base_url, path);

        let timestamp = Self::timestamp();
        let signature = self.sign(&timestamp, "POST", path, &body_str);

        let response = self
            .http
            .post(&url)
            .header("ACCESS-KEY", &self.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp)
            .header("ACCESS-PASSPHRASE", &self.api_passphrase)
            .header("Content-Type", "application/json")
            .header("locale", "en-US")
            .body(body_str)
            .send()
            .await
            .map_err(map_transport)?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ExecutionError::Transport(format!("malformed payload: {}", e)))?;

        if !envelope.is_ok() {
            return Err(ExecutionError::Rejected(format!(
                "code {}: {}",
                envelope.code, envelope.msg
            )));
        }

        envelope
            .data
            .ok_or_else(|| ExecutionError::Transport("empty data field".to_string()))
    }

    // ==================== Market Data (Public) ====================

    /// Current funding rate for a perp symbol.
    #[instrument(skip(self))]
    pub async fn get_funding_rate(&self, symbol: &str) -> Result<FundingRateData, MarketDataError> {
        let rows: Vec<FundingRateData> = self
            .get_public(
                "/api/v2/mix/market/current-fund-rate",
                &[("symbol", symbol), ("productType", PRODUCT_TYPE)],
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| MarketDataError::Unavailable("no funding rate row".to_string()))
    }

    /// Perp ticker with mark price.
    #[instrument(skip(self))]
    pub async fn get_perp_ticker(&self, symbol: &str) -> Result<PerpTickerData, MarketDataError> {
        let rows: Vec<PerpTickerData> = self
            .get_public(
                "/api/v2/mix/market/ticker",
                &[("symbol", symbol), ("productType", PRODUCT_TYPE)],
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| MarketDataError::Unavailable("no perp ticker row".to_string()))
    }

    /// Spot ticker with last price.
    #[instrument(skip(self))]
    pub async fn get_spot_ticker(&self, symbol: &str) -> Result<SpotTickerData, MarketDataError> {
        let rows: Vec<SpotTickerData> = self
            .get_public("/api/v2/spot/market/tickers", &[("symbol", symbol)])
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| MarketDataError::Unavailable("no spot ticker row".to_string()))
    }

    // ==================== Account (Authenticated) ====================

    /// Spot account asset balances.
    #[instrument(skip(self))]
    pub async fn get_spot_assets(&self) -> Result<Vec<SpotAssetData>, ExecutionError> {
        self.get_signed("/api/v2/spot/account/assets", &[]).await
    }

    /// Place a spot market order. Bitget sizes market buys in quote currency,
    /// so buys convert the base quantity at the current last price.
    #[instrument(skip(self))]
    pub async fn place_spot_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<PlaceOrderData, ExecutionError> {
        let size = match side {
            OrderSide::Buy => {
                let ticker = self
                    .get_spot_ticker(symbol)
                    .await
                    .map_err(|e| ExecutionError::Transport(e.to_string()))?;
                let quote = (quantity * ticker.last_price).round_dp(2);
                quote.to_string()
            }
            OrderSide::Sell => quantity.normalize().to_string(),
        };

        let body = SpotOrderRequest {
            symbol: symbol.to_string(),
            side,
            order_type: "market".to_string(),
            force: "gtc".to_string(),
            size,
        };

        debug!(%symbol, side = side.as_str(), %quantity, "Placing spot order");
        self.post_signed("/api/v2/spot/trade/place-order", &body)
            .await
    }

    /// Place a perp market order (one-way mode, cross margin).
    #[instrument(skip(self))]
    pub async fn place_mix_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<PlaceOrderData, ExecutionError> {
        let body = MixOrderRequest {
            symbol: symbol.to_string(),
            product_type: PRODUCT_TYPE.to_string(),
            margin_coin: MARGIN_COIN.to_string(),
            margin_mode: "crossed".to_string(),
            side,
            order_type: "market".to_string(),
            size: quantity.normalize().to_string(),
        };

        debug!(%symbol, side = side.as_str(), %quantity, "Placing mix order");
        self.post_signed("/api/v2/mix/order/place-order", &body)
            .await
    }

    /// Fill state of a spot order.
    #[instrument(skip(self))]
    pub async fn get_spot_order(&self, order_id: &str) -> Result<OrderDetailData, ExecutionError> {
        let rows: Vec<OrderDetailData> = self
            .get_signed("/api/v2/spot/trade/orderInfo", &[("orderId", order_id)])
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| ExecutionError::Transport("order not found".to_string()))
    }

    /// Fill state of a perp order.
    #[instrument(skip(self))]
    pub async fn get_mix_order(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderDetailData, ExecutionError> {
        self.get_signed(
            "/api/v2/mix/order/detail",
            &[
                ("symbol", symbol),
                ("productType", PRODUCT_TYPE),
                ("orderId", order_id),
            ],
        )
        .await
    }
}

fn map_transport(e: reqwest::Error) -> ExecutionError {
    if e.is_timeout() {
        ExecutionError::Timeout
    } else {
        ExecutionError::Transport(e.to_string())
    }
}

#[async_trait]
impl MarketData for BitgetClient {
    async fn snapshot(&self, pair: &PairConfig) -> Result<FundingSnapshot, MarketDataError> {
        let (funding, perp, spot) = tokio::try_join!(
            self.get_funding_rate(&pair.perp_symbol),
            self.get_perp_ticker(&pair.perp_symbol),
            self.get_spot_ticker(&pair.spot_symbol),
        )?;

        let observed_at = DateTime::<Utc>::from_timestamp_millis(perp.timestamp_ms)
            .unwrap_or_else(Utc::now);

        Ok(FundingSnapshot {
            rate: funding.funding_rate,
            mark_price: perp.mark_price,
            spot_price: spot.last_price,
            observed_at,
        })
    }
}

#[async_trait]
impl Execution for BitgetClient {
    async fn available_capital_usd(&self) -> Result<Decimal, ExecutionError> {
        let assets = self.get_spot_assets().await?;
        Ok(assets
            .into_iter()
            .find(|a| a.coin.eq_ignore_ascii_case(MARGIN_COIN))
            .map(|a| a.available)
            .unwrap_or(Decimal::ZERO))
    }

    async fn submit(&self, intent: &OrderIntent) -> Result<OrderHandle, ExecutionError> {
        let placed = match intent.leg {
            LegKind::Spot => {
                self.place_spot_order(&intent.symbol, intent.side, intent.quantity)
                    .await?
            }
            LegKind::Perp => {
                self.place_mix_order(&intent.symbol, intent.side, intent.quantity)
                    .await?
            }
        };

        Ok(OrderHandle {
            leg: intent.leg,
            symbol: intent.symbol.clone(),
            order_id: placed.order_id,
        })
    }

    async fn poll_fill(&self, handle: &OrderHandle) -> Result<FillStatus, ExecutionError> {
        let detail = match handle.leg {
            LegKind::Spot => self.get_spot_order(&handle.order_id).await?,
            LegKind::Perp => self.get_mix_order(&handle.symbol, &handle.order_id).await?,
        };

        Ok(detail.fill_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> BitgetClient {
        BitgetClient::new(&BitgetConfig {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            api_passphrase: "pass".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_signature_is_deterministic() {
        let client = test_client();
        let a = client.sign("1717171717000", "GET", "/api/v2/spot/account/assets", "");
        let b = client.sign("1717171717000", "GET", "/api/v2/spot/account/assets", "");
        assert_eq!(a, b);
        // base64 of a 32-byte HMAC-SHA256 digest is 44 chars with padding
        assert_eq!(a.len(), 44);
        assert!(a.ends_with('='));
    }

    #[test]
    fn test_signature_covers_body() {
        let client = test_client();
        let empty = client.sign("1", "POST", "/api/v2/mix/order/place-order", "");
        let with_body = client.sign("1", "POST", "/api/v2/mix/order/place-order", "{\"a\":1}");
        assert_ne!(empty, with_body);
    }

    #[test]
    fn test_query_string_encodes_values() {
        let q = BitgetClient::query_string(&[("symbol", "BTCUSDT"), ("productType", "USDT-FUTURES")]);
        assert_eq!(q, "symbol=BTCUSDT&productType=USDT-FUTURES");
    }
}
