use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method, Response};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use super::{ApiCredentials, ExchangeError, MarketDataProvider, OrderGateway};
use crate::models::{Candle, Interval, OrderAck, OrderId, OrderSide, StopSize};

const MAINNET_BASE: &str = "https://fapi.binance.com";
const TESTNET_BASE: &str = "https://testnet.binancefuture.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RECV_WINDOW_MS: u64 = 5000;
const RATE_LIMIT_RPM: u32 = 1200;
const PRICE_DECIMALS: u32 = 1;
const QUANTITY_DECIMALS: u32 = 3;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Fixed-delay retry schedule for idempotent reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }
}

/// Binance USDⓈ-M futures REST client bound to one symbol
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    symbol: String,
    credentials: ApiCredentials,
    rate_limiter: Arc<BinanceRateLimiter>,
    candle_retry: RetryPolicy,
    read_retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: OrderId,
    #[serde(default)]
    client_order_id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrder {
    order_id: OrderId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
}

#[derive(Debug, Deserialize)]
struct LeverageResponse {
    leverage: u32,
}

impl BinanceFuturesClient {
    pub fn new(credentials: ApiCredentials, symbol: impl Into<String>) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExchangeError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: MAINNET_BASE.to_string(),
            symbol: symbol.into(),
            credentials,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            candle_retry: RetryPolicy::fixed(10, Duration::from_secs(2)),
            read_retry: RetryPolicy::fixed(3, Duration::from_secs(1)),
        })
    }

    pub fn testnet(mut self) -> Self {
        self.base_url = TESTNET_BASE.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_candle_retry(mut self, policy: RetryPolicy) -> Self {
        self.candle_retry = policy;
        self
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Change the symbol's leverage. Returns the leverage the exchange applied.
    pub async fn set_leverage(&self, leverage: u32) -> Result<u32, ExchangeError> {
        let params = vec![
            ("symbol", self.symbol.clone()),
            ("leverage", leverage.to_string()),
        ];
        let response: LeverageResponse = self
            .send_signed(Method::POST, "/fapi/v1/leverage", params)
            .await?;

        tracing::info!(symbol = %self.symbol, leverage = response.leverage, "Leverage set");
        Ok(response.leverage)
    }

    // ========================================================================
    // Request plumbing
    // ========================================================================

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "GET");

        let response = self.client.get(&url).query(params).send().await?;
        decode_response(response).await
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let query = self.credentials.signed_query(
            &params,
            Utc::now().timestamp_millis(),
            RECV_WINDOW_MS,
        );
        let url = format!("{}{}?{}", self.base_url, path, query);
        tracing::debug!(method = %method, path = %path, "Signed request");

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", self.credentials.api_key())
            .send()
            .await?;
        decode_response(response).await
    }

    async fn place_order(&self, mut params: Vec<(&'static str, String)>) -> Result<OrderAck, ExchangeError> {
        let client_order_id = new_client_order_id();
        params.insert(0, ("symbol", self.symbol.clone()));
        params.push(("newClientOrderId", client_order_id.clone()));

        tracing::info!(params = ?params, "Placing order");

        let response: OrderResponse = self
            .send_signed(Method::POST, "/fapi/v1/order", params)
            .await?;

        tracing::info!(
            order_id = response.order_id,
            status = %response.status,
            "Order accepted"
        );

        Ok(OrderAck {
            order_id: response.order_id,
            client_order_id: if response.client_order_id.is_empty() {
                client_order_id
            } else {
                response.client_order_id
            },
        })
    }

    // ========================================================================
    // Single-attempt reads (wrapped by retry)
    // ========================================================================

    async fn fetch_candles_once(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let now = Utc::now();
        let boundary = interval.last_boundary(now);
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.as_str().to_string()),
            ("endTime", (boundary.timestamp_millis() - 1).to_string()),
            ("limit", count.to_string()),
        ];

        let rows: Vec<Vec<serde_json::Value>> = self.get_public("/fapi/v1/klines", &params).await?;
        let candles = closed_candles(&rows, now)?;

        if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
            tracing::info!(
                "Fetched {} closed {} candles for {} ({} to {})",
                candles.len(),
                interval,
                symbol,
                first.open_time,
                last.open_time
            );
        }

        Ok(candles)
    }

    async fn ticker_price_once(&self) -> Result<f64, ExchangeError> {
        let ticker: TickerPrice = self
            .get_public("/fapi/v1/ticker/price", &[("symbol", self.symbol.clone())])
            .await?;
        parse_number(&ticker.price)
    }

    async fn open_orders_once(&self) -> Result<HashSet<OrderId>, ExchangeError> {
        let orders: Vec<OpenOrder> = self
            .send_signed(
                Method::GET,
                "/fapi/v1/openOrders",
                vec![("symbol", self.symbol.clone())],
            )
            .await?;
        Ok(orders.into_iter().map(|o| o.order_id).collect())
    }

    async fn position_amount_once(&self) -> Result<f64, ExchangeError> {
        let positions: Vec<PositionRisk> = self
            .send_signed(
                Method::GET,
                "/fapi/v2/positionRisk",
                vec![("symbol", self.symbol.clone())],
            )
            .await?;

        // Hedge mode returns one row per side; one-way mode a single row
        positions
            .iter()
            .filter(|p| p.symbol == self.symbol)
            .map(|p| parse_number(&p.position_amt))
            .sum()
    }
}

#[async_trait]
impl OrderGateway for BinanceFuturesClient {
    async fn submit_market_order(
        &self,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        self.place_order(vec![
            ("side", side.as_exchange_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", format_decimal(quantity, QUANTITY_DECIMALS)?),
        ])
        .await
    }

    async fn submit_stop_order(
        &self,
        side: OrderSide,
        stop_price: f64,
        size: StopSize,
    ) -> Result<OrderAck, ExchangeError> {
        let mut params = vec![
            ("side", side.as_exchange_str().to_string()),
            ("type", "STOP_MARKET".to_string()),
            ("stopPrice", format_decimal(stop_price, PRICE_DECIMALS)?),
        ];
        // closePosition cannot be combined with quantity or reduceOnly
        match size {
            StopSize::ClosePosition => params.push(("closePosition", "true".to_string())),
            StopSize::ReduceOnly(quantity) => {
                params.push(("quantity", format_decimal(quantity, QUANTITY_DECIMALS)?));
                params.push(("reduceOnly", "true".to_string()));
            }
        }
        self.place_order(params).await
    }

    async fn submit_limit_order(
        &self,
        side: OrderSide,
        quantity: f64,
        price: f64,
        reduce_only: bool,
    ) -> Result<OrderAck, ExchangeError> {
        let mut params = vec![
            ("side", side.as_exchange_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", format_decimal(quantity, QUANTITY_DECIMALS)?),
            ("price", format_decimal(price, PRICE_DECIMALS)?),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        self.place_order(params).await
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<(), ExchangeError> {
        let _: OrderResponse = self
            .send_signed(
                Method::DELETE,
                "/fapi/v1/order",
                vec![
                    ("symbol", self.symbol.clone()),
                    ("orderId", order_id.to_string()),
                ],
            )
            .await?;
        tracing::info!(order_id, "Order cancelled");
        Ok(())
    }

    async fn cancel_all_orders(&self) -> Result<(), ExchangeError> {
        let _: serde_json::Value = self
            .send_signed(
                Method::DELETE,
                "/fapi/v1/allOpenOrders",
                vec![("symbol", self.symbol.clone())],
            )
            .await?;
        tracing::info!(symbol = %self.symbol, "Cancelled all open orders");
        Ok(())
    }

    async fn close_long_position(&self, quantity: f64) -> Result<OrderAck, ExchangeError> {
        self.place_order(vec![
            ("side", OrderSide::Sell.as_exchange_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", format_decimal(quantity, QUANTITY_DECIMALS)?),
            ("reduceOnly", "true".to_string()),
        ])
        .await
    }

    async fn list_open_orders(&self) -> Result<HashSet<OrderId>, ExchangeError> {
        retry_read("open orders", self.read_retry, || self.open_orders_once()).await
    }

    async fn get_current_price(&self) -> Result<f64, ExchangeError> {
        retry_read("ticker price", self.read_retry, || self.ticker_price_once()).await
    }

    async fn get_position_amount(&self) -> Result<f64, ExchangeError> {
        retry_read("position risk", self.read_retry, || self.position_amount_once()).await
    }
}

#[async_trait]
impl MarketDataProvider for BinanceFuturesClient {
    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        retry_read("klines", self.candle_retry, || {
            self.fetch_candles_once(symbol, interval, count)
        })
        .await
    }
}

impl std::fmt::Debug for BinanceFuturesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFuturesClient")
            .field("base_url", &self.base_url)
            .field("symbol", &self.symbol)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Run an idempotent read with a fixed-delay retry schedule
async fn retry_read<T, F, Fut>(what: &str, policy: RetryPolicy, mut op: F) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("✓ {} succeeded after {} attempts", what, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                tracing::warn!(
                    "Retry {}/{}: {} failed: {}. Retrying in {:?}",
                    attempt,
                    policy.attempts,
                    what,
                    e,
                    policy.delay
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    tracing::error!("{} failed after {} attempts: {}", what, attempt, e);
                }
                return Err(e);
            }
        }
    }
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, ExchangeError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ExchangeError::from_response(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(format!("{}: {}", e, truncate(&body))))
}

/// Parse kline rows, keeping only candles whose close time has passed
fn closed_candles(rows: &[Vec<serde_json::Value>], now: DateTime<Utc>) -> Result<Vec<Candle>, ExchangeError> {
    let now_ms = now.timestamp_millis();
    let mut candles = Vec::with_capacity(rows.len());

    for row in rows {
        let close_time = row
            .get(6)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ExchangeError::Decode("kline missing close time".into()))?;
        if close_time >= now_ms {
            tracing::debug!(close_time, "Dropping in-progress candle");
            continue;
        }

        let open_ms = row
            .first()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ExchangeError::Decode("kline missing open time".into()))?;
        let open_time = DateTime::from_timestamp_millis(open_ms)
            .ok_or_else(|| ExchangeError::Decode(format!("bad kline open time {}", open_ms)))?;

        candles.push(Candle {
            open_time,
            open: kline_field(row, 1)?,
            high: kline_field(row, 2)?,
            low: kline_field(row, 3)?,
            close: kline_field(row, 4)?,
            volume: kline_field(row, 5)?,
        });
    }

    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    Ok(candles)
}

fn kline_field(row: &[serde_json::Value], index: usize) -> Result<f64, ExchangeError> {
    match row.get(index) {
        Some(serde_json::Value::String(s)) => parse_number(s),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ExchangeError::Decode(format!("kline field {} out of range", index))),
        _ => Err(ExchangeError::Decode(format!("kline missing field {}", index))),
    }
}

fn parse_number(s: &str) -> Result<f64, ExchangeError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| ExchangeError::Decode(format!("not a number: {:?}", s)))
}

/// Render a price/quantity at exchange precision
fn format_decimal(value: f64, decimals: u32) -> Result<String, ExchangeError> {
    let decimal = Decimal::from_f64(value)
        .filter(|_| value.is_finite())
        .ok_or_else(|| ExchangeError::InvalidRequest(format!("cannot format {} for the exchange", value)))?;
    Ok(decimal.round_dp(decimals).normalize().to_string())
}

fn new_client_order_id() -> String {
    format!("bb-{}", Uuid::new_v4().simple())
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client(server: &Server) -> BinanceFuturesClient {
        BinanceFuturesClient::new(ApiCredentials::new("key".into(), "secret".into()), "BTCUSDT")
            .unwrap()
            .with_base_url(server.url())
            .with_candle_retry(RetryPolicy::fixed(2, Duration::ZERO))
            .with_read_retry(RetryPolicy::fixed(2, Duration::ZERO))
    }

    fn kline(open_ms: i64, close: &str, close_ms: i64) -> serde_json::Value {
        serde_json::json!([
            open_ms, "100.0", "110.0", "90.0", close, "12.5",
            close_ms, "1250.0", 42, "6.0", "600.0", "0"
        ])
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(64123.456, 1).unwrap(), "64123.5");
        assert_eq!(format_decimal(1.0, 3).unwrap(), "1");
        assert_eq!(format_decimal(0.7812, 3).unwrap(), "0.781");
        assert!(format_decimal(f64::NAN, 1).is_err());
    }

    #[test]
    fn test_client_order_id_fits_exchange_limit() {
        let id = new_client_order_id();
        assert!(id.len() <= 36);
        assert!(id.starts_with("bb-"));
    }

    #[test]
    fn test_closed_candles_drops_in_progress() {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let hour = 3_600_000;
        let rows: Vec<Vec<serde_json::Value>> = vec![
            kline(now_ms - 3 * hour, "101.0", now_ms - 2 * hour - 1),
            kline(now_ms - 2 * hour, "102.0", now_ms - hour - 1),
            kline(now_ms - hour / 2, "103.0", now_ms + hour / 2),
        ]
        .into_iter()
        .map(|v| v.as_array().cloned().unwrap())
        .collect();

        let candles = closed_candles(&rows, now).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, 102.0);
        assert_eq!(candles[0].high, 110.0);
    }

    #[tokio::test]
    async fn test_ticker_price() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v1/ticker/price")
            .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
            .with_status(200)
            .with_body(r#"{"symbol":"BTCUSDT","price":"64250.10","time":1700000000000}"#)
            .create_async()
            .await;

        let price = client(&server).get_current_price().await.unwrap();
        assert_eq!(price, 64250.10);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_candles() {
        let mut server = Server::new_async().await;
        let now_ms = Utc::now().timestamp_millis();
        let hour = 3_600_000;
        let body = serde_json::json!([
            kline(now_ms - 3 * hour, "101.0", now_ms - 2 * hour - 1),
            kline(now_ms - 2 * hour, "102.0", now_ms - hour - 1),
        ]);

        let mock = server
            .mock("GET", "/fapi/v1/klines")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("interval".into(), "1h".into()),
                Matcher::UrlEncoded("limit".into(), "30".into()),
            ]))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let candles = client(&server)
            .fetch_recent_candles("BTCUSDT", Interval::OneHour, 30)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert!(candles[0].open_time < candles[1].open_time);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_candle_fetch_retries_server_errors() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v1/klines")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("bad gateway")
            .expect(2)
            .create_async()
            .await;

        let result = client(&server)
            .fetch_recent_candles("BTCUSDT", Interval::OneHour, 30)
            .await;

        assert!(result.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_open_orders_signed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v1/openOrders")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::Regex("signature=[0-9a-f]{64}".into()),
            ]))
            .match_header("X-MBX-APIKEY", "key")
            .with_status(200)
            .with_body(r#"[{"orderId":11,"symbol":"BTCUSDT"},{"orderId":12,"symbol":"BTCUSDT"}]"#)
            .create_async()
            .await;

        let open = client(&server).list_open_orders().await.unwrap();
        assert_eq!(open, HashSet::from([11, 12]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_order_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-2019,"msg":"Margin is insufficient."}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server)
            .submit_market_order(OrderSide::Buy, 1.0)
            .await
            .unwrap_err();

        assert!(err.is_definitely_not_placed());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_stop_order_params() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("type".into(), "STOP_MARKET".into()),
                Matcher::UrlEncoded("side".into(), "SELL".into()),
                Matcher::UrlEncoded("stopPrice".into(), "63900.5".into()),
                Matcher::UrlEncoded("closePosition".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"orderId":77,"clientOrderId":"bb-abc","status":"NEW"}"#)
            .create_async()
            .await;

        let ack = client(&server)
            .submit_stop_order(OrderSide::Sell, 63900.5, StopSize::ClosePosition)
            .await
            .unwrap();

        assert_eq!(ack.order_id, 77);
        assert_eq!(ack.client_order_id, "bb-abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reduce_only_stop_params() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("type".into(), "STOP_MARKET".into()),
                Matcher::UrlEncoded("stopPrice".into(), "64400.0".into()),
                Matcher::UrlEncoded("quantity".into(), "0.781".into()),
                Matcher::UrlEncoded("reduceOnly".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"orderId":80,"clientOrderId":"bb-trail","status":"NEW"}"#)
            .create_async()
            .await;

        let ack = client(&server)
            .submit_stop_order(OrderSide::Sell, 64400.0, StopSize::ReduceOnly(0.781))
            .await
            .unwrap();

        assert_eq!(ack.order_id, 80);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_target_limit_is_reduce_only() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("type".into(), "LIMIT".into()),
                Matcher::UrlEncoded("side".into(), "SELL".into()),
                Matcher::UrlEncoded("timeInForce".into(), "GTC".into()),
                Matcher::UrlEncoded("quantity".into(), "0.781".into()),
                Matcher::UrlEncoded("price".into(), "64750.0".into()),
                Matcher::UrlEncoded("reduceOnly".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"orderId":78,"clientOrderId":"bb-target","status":"NEW"}"#)
            .create_async()
            .await;

        let ack = client(&server)
            .submit_limit_order(OrderSide::Sell, 0.781, 64750.0, true)
            .await
            .unwrap();

        assert_eq!(ack.order_id, 78);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_position_amount() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/fapi/v2/positionRisk")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"symbol":"BTCUSDT","positionAmt":"0.781","entryPrice":"64000.0"}]"#)
            .create_async()
            .await;

        let amount = client(&server).get_position_amount().await.unwrap();
        assert_eq!(amount, 0.781);
    }
}
