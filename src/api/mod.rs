// Exchange boundary: order gateway and market data traits plus the Binance client
pub mod auth;
pub mod binance;
pub mod error;

pub use auth::ApiCredentials;
pub use binance::{BinanceFuturesClient, RetryPolicy};
pub use error::ExchangeError;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::models::{Candle, Interval, OrderAck, OrderId, OrderSide, StopSize};

/// Order placement and account queries for the single traded instrument.
///
/// Mutating calls are never retried by implementations; a failed
/// submission is reported once and the caller decides what to do.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit_market_order(
        &self,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck, ExchangeError>;

    /// Stop-market order sized by `size`
    async fn submit_stop_order(
        &self,
        side: OrderSide,
        stop_price: f64,
        size: StopSize,
    ) -> Result<OrderAck, ExchangeError>;

    /// Good-till-cancelled limit order. A `reduce_only` order can only
    /// shrink the current position, never open or flip one.
    async fn submit_limit_order(
        &self,
        side: OrderSide,
        quantity: f64,
        price: f64,
        reduce_only: bool,
    ) -> Result<OrderAck, ExchangeError>;

    async fn cancel_order(&self, order_id: OrderId) -> Result<(), ExchangeError>;

    async fn cancel_all_orders(&self) -> Result<(), ExchangeError>;

    /// Reduce-only market sell of `quantity`
    async fn close_long_position(&self, quantity: f64) -> Result<OrderAck, ExchangeError>;

    async fn list_open_orders(&self) -> Result<HashSet<OrderId>, ExchangeError>;

    async fn get_current_price(&self) -> Result<f64, ExchangeError>;

    /// Signed position size on the exchange (positive = long)
    async fn get_position_amount(&self) -> Result<f64, ExchangeError>;
}

/// Source of completed candles
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Up to `count` fully closed candles, oldest first, ending at the most
    /// recently completed interval boundary
    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;
}
