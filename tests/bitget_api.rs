//! Bitget REST client tests against a local mock server.

use funding_arb::config::{BitgetConfig, PairConfig};
use funding_arb::exchange::{
    BitgetClient, Execution, ExecutionError, FillStatus, LegKind, MarketData, MarketDataError,
    OrderIntent, OrderSide,
};
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> BitgetClient {
    BitgetClient::with_base_url(
        &BitgetConfig {
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
            api_passphrase: "test-pass".to_string(),
        },
        &server.uri(),
    )
    .unwrap()
}

fn pair() -> PairConfig {
    PairConfig::default()
}

async fn mount_market_data(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v2/mix/market/current-fund-rate"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("productType", "USDT-FUTURES"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "00000",
            "msg": "success",
            "data": [{"symbol": "BTCUSDT", "fundingRate": "0.000125"}]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/mix/market/ticker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "00000",
            "msg": "success",
            "data": [{"symbol": "BTCUSDT", "markPrice": "50000.5", "ts": "1717171717000"}]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/spot/market/tickers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "00000",
            "msg": "success",
            "data": [{"symbol": "BTCUSDT", "lastPr": "50010.0"}]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn snapshot_combines_funding_and_prices() {
    let server = MockServer::start().await;
    mount_market_data(&server).await;

    let snapshot = client(&server).snapshot(&pair()).await.unwrap();

    assert_eq!(snapshot.rate, dec!(0.000125));
    assert_eq!(snapshot.mark_price, dec!(50000.5));
    assert_eq!(snapshot.spot_price, dec!(50010.0));
    assert_eq!(snapshot.observed_at.timestamp_millis(), 1717171717000);
}

#[tokio::test]
async fn snapshot_fails_on_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = client(&server).snapshot(&pair()).await;
    assert!(matches!(result, Err(MarketDataError::Unavailable(_))));
}

#[tokio::test]
async fn snapshot_fails_on_error_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "40034",
            "msg": "Parameter does not exist",
            "data": null
        })))
        .mount(&server)
        .await;

    let result = client(&server).snapshot(&pair()).await;
    assert!(matches!(result, Err(MarketDataError::Unavailable(_))));
}

#[tokio::test]
async fn perp_order_is_signed_and_submitted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/mix/order/place-order"))
        .and(header_exists("ACCESS-KEY"))
        .and(header_exists("ACCESS-SIGN"))
        .and(header_exists("ACCESS-TIMESTAMP"))
        .and(header_exists("ACCESS-PASSPHRASE"))
        .and(body_partial_json(json!({
            "symbol": "BTCUSDT",
            "productType": "USDT-FUTURES",
            "marginCoin": "USDT",
            "side": "sell",
            "orderType": "market",
            "size": "0.001"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "00000",
            "msg": "success",
            "data": {"orderId": "121211212122", "clientOid": null}
        })))
        .mount(&server)
        .await;

    let intent = OrderIntent {
        side: OrderSide::Sell,
        symbol: "BTCUSDT".to_string(),
        quantity: dec!(0.001),
        leg: LegKind::Perp,
    };
    let handle = client(&server).submit(&intent).await.unwrap();

    assert_eq!(handle.order_id, "121211212122");
    assert_eq!(handle.leg, LegKind::Perp);
}

#[tokio::test]
async fn spot_market_buy_sends_quote_notional() {
    let server = MockServer::start().await;
    mount_market_data(&server).await;

    // 0.001 BTC at the $50,010 spot last price -> $50.01 quote size
    Mock::given(method("POST"))
        .and(path("/api/v2/spot/trade/place-order"))
        .and(body_partial_json(json!({
            "symbol": "BTCUSDT",
            "side": "buy",
            "orderType": "market",
            "size": "50.01"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "00000",
            "msg": "success",
            "data": {"orderId": "9988776655", "clientOid": "abc"}
        })))
        .mount(&server)
        .await;

    let intent = OrderIntent {
        side: OrderSide::Buy,
        symbol: "BTCUSDT".to_string(),
        quantity: dec!(0.001),
        leg: LegKind::Spot,
    };
    let handle = client(&server).submit(&intent).await.unwrap();
    assert_eq!(handle.order_id, "9988776655");
}

#[tokio::test]
async fn rejected_order_maps_to_rejected_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/mix/order/place-order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "43012",
            "msg": "Insufficient balance",
            "data": null
        })))
        .mount(&server)
        .await;

    let intent = OrderIntent {
        side: OrderSide::Sell,
        symbol: "BTCUSDT".to_string(),
        quantity: dec!(0.001),
        leg: LegKind::Perp,
    };
    let result = client(&server).submit(&intent).await;

    match result {
        Err(ExecutionError::Rejected(msg)) => assert!(msg.contains("43012")),
        other => panic!("expected Rejected, got {:?}", other.map(|h| h.order_id)),
    }
}

#[tokio::test]
async fn spot_fill_poll_parses_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/spot/trade/orderInfo"))
        .and(query_param("orderId", "9988776655"))
        .and(header_exists("ACCESS-SIGN"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "00000",
            "msg": "success",
            "data": [{"orderId": "9988776655", "status": "filled", "baseVolume": "0.001"}]
        })))
        .mount(&server)
        .await;

    let handle = funding_arb::exchange::OrderHandle {
        leg: LegKind::Spot,
        symbol: "BTCUSDT".to_string(),
        order_id: "9988776655".to_string(),
    };
    let status = client(&server).poll_fill(&handle).await.unwrap();
    assert_eq!(status, FillStatus::Filled(dec!(0.001)));
}

#[tokio::test]
async fn mix_fill_poll_accepts_state_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/mix/order/detail"))
        .and(query_param("orderId", "121211212122"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "00000",
            "msg": "success",
            "data": {"orderId": "121211212122", "state": "live", "baseVolume": "0"}
        })))
        .mount(&server)
        .await;

    let handle = funding_arb::exchange::OrderHandle {
        leg: LegKind::Perp,
        symbol: "BTCUSDT".to_string(),
        order_id: "121211212122".to_string(),
    };
    let status = client(&server).poll_fill(&handle).await.unwrap();
    assert_eq!(status, FillStatus::Pending);
}

#[tokio::test]
async fn available_capital_reads_usdt_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/spot/account/assets"))
        .and(header_exists("ACCESS-KEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "00000",
            "msg": "success",
            "data": [
                {"coin": "BTC", "available": "0.25"},
                {"coin": "USDT", "available": "823.17"}
            ]
        })))
        .mount(&server)
        .await;

    let available = client(&server).available_capital_usd().await.unwrap();
    assert_eq!(available, dec!(823.17));
}
