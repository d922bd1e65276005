//! Scriptable in-memory exchange and store for unit tests.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::api::{ExchangeError, MarketDataProvider, OrderGateway};
use crate::models::{Candle, Interval, OrderAck, OrderId, OrderSide, Position, StopSize};
use crate::persistence::{StateStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Market { side: OrderSide, quantity: f64 },
    Stop { side: OrderSide, stop_price: f64, size: StopSize },
    Limit { side: OrderSide, quantity: f64, price: f64, reduce_only: bool },
    Cancel(OrderId),
    CancelAll,
    Close(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Market,
    Stop,
    Limit,
    Price,
    OpenOrders,
    PositionAmount,
}

type ErrorFactory = fn() -> ExchangeError;

pub fn rejected() -> ExchangeError {
    ExchangeError::Api {
        status: 400,
        code: -2019,
        message: "Margin is insufficient.".into(),
    }
}

pub fn timed_out() -> ExchangeError {
    ExchangeError::Timeout
}

struct State {
    price: f64,
    next_order_id: OrderId,
    repeat_ids: bool,
    open_orders: HashSet<OrderId>,
    close_position_stops: HashSet<OrderId>,
    failing_cancels: HashSet<OrderId>,
    failures: HashMap<Op, ErrorFactory>,
    position_amount: f64,
    calls: Vec<GatewayCall>,
}

pub struct MockGateway {
    state: Mutex<State>,
}

impl MockGateway {
    pub fn new(price: f64) -> Self {
        Self {
            state: Mutex::new(State {
                price,
                next_order_id: 1000,
                repeat_ids: false,
                open_orders: HashSet::new(),
                close_position_stops: HashSet::new(),
                failing_cancels: HashSet::new(),
                failures: HashMap::new(),
                position_amount: 0.0,
                calls: Vec::new(),
            }),
        }
    }

    pub fn set_price(&self, price: f64) {
        self.state.lock().unwrap().price = price;
    }

    pub fn fail(&self, op: Op, error: ErrorFactory) {
        self.state.lock().unwrap().failures.insert(op, error);
    }

    pub fn fail_price_reads(&self) {
        self.fail(Op::Price, timed_out);
    }

    pub fn fail_cancel(&self, order_id: OrderId) {
        self.state.lock().unwrap().failing_cancels.insert(order_id);
    }

    pub fn repeat_order_ids(&self) {
        self.state.lock().unwrap().repeat_ids = true;
    }

    pub fn set_open_orders(&self, ids: &[OrderId]) {
        self.state.lock().unwrap().open_orders = ids.iter().copied().collect();
    }

    pub fn open_orders(&self) -> HashSet<OrderId> {
        self.state.lock().unwrap().open_orders.clone()
    }

    pub fn set_position_amount(&self, amount: f64) {
        self.state.lock().unwrap().position_amount = amount;
    }

    pub fn position_amount(&self) -> f64 {
        self.state.lock().unwrap().position_amount
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn cancelled(&self) -> Vec<OrderId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn check(state: &State, op: Op) -> Result<(), ExchangeError> {
        match state.failures.get(&op) {
            Some(factory) => Err(factory()),
            None => Ok(()),
        }
    }

    fn ack(state: &mut State) -> OrderAck {
        if !state.repeat_ids {
            state.next_order_id += 1;
        }
        OrderAck {
            order_id: state.next_order_id,
            client_order_id: format!("test-{}", state.next_order_id),
        }
    }
}

#[async_trait]
impl OrderGateway for MockGateway {
    async fn submit_market_order(&self, side: OrderSide, quantity: f64) -> Result<OrderAck, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Market { side, quantity });
        Self::check(&state, Op::Market)?;
        state.position_amount += match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };
        Ok(Self::ack(&mut state))
    }

    async fn submit_stop_order(
        &self,
        side: OrderSide,
        stop_price: f64,
        size: StopSize,
    ) -> Result<OrderAck, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Stop { side, stop_price, size });
        Self::check(&state, Op::Stop)?;
        if size == StopSize::ClosePosition
            && state.close_position_stops.iter().any(|id| state.open_orders.contains(id))
        {
            return Err(ExchangeError::Api {
                status: 400,
                code: -4130,
                message: "An open stop or take profit order with GTE and closePosition in the direction is existing.".into(),
            });
        }
        let ack = Self::ack(&mut state);
        state.open_orders.insert(ack.order_id);
        if size == StopSize::ClosePosition {
            state.close_position_stops.insert(ack.order_id);
        }
        Ok(ack)
    }

    async fn submit_limit_order(
        &self,
        side: OrderSide,
        quantity: f64,
        price: f64,
        reduce_only: bool,
    ) -> Result<OrderAck, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Limit { side, quantity, price, reduce_only });
        Self::check(&state, Op::Limit)?;
        let ack = Self::ack(&mut state);
        state.open_orders.insert(ack.order_id);
        Ok(ack)
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<(), ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Cancel(order_id));
        if state.failing_cancels.contains(&order_id) || !state.open_orders.remove(&order_id) {
            return Err(ExchangeError::Api {
                status: 400,
                code: -2011,
                message: "Unknown order sent.".into(),
            });
        }
        Ok(())
    }

    async fn cancel_all_orders(&self) -> Result<(), ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::CancelAll);
        state.open_orders.clear();
        Ok(())
    }

    async fn close_long_position(&self, quantity: f64) -> Result<OrderAck, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Close(quantity));
        state.position_amount -= quantity;
        Ok(Self::ack(&mut state))
    }

    async fn list_open_orders(&self) -> Result<HashSet<OrderId>, ExchangeError> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Op::OpenOrders)?;
        Ok(state.open_orders.clone())
    }

    async fn get_current_price(&self) -> Result<f64, ExchangeError> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Op::Price)?;
        Ok(state.price)
    }

    async fn get_position_amount(&self) -> Result<f64, ExchangeError> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Op::PositionAmount)?;
        Ok(state.position_amount)
    }
}

/// Serves a fixed candle series
pub struct StaticMarketData {
    candles: Mutex<Result<Vec<Candle>, ()>>,
}

impl StaticMarketData {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles: Mutex::new(Ok(candles)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            candles: Mutex::new(Err(())),
        }
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    async fn fetch_recent_candles(
        &self,
        _symbol: &str,
        _interval: Interval,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        match &*self.candles.lock().unwrap() {
            Ok(candles) => {
                let skip = candles.len().saturating_sub(count);
                Ok(candles[skip..].to_vec())
            }
            Err(()) => Err(ExchangeError::Timeout),
        }
    }
}

/// Store whose writes always fail
pub struct FailingStore;

#[async_trait]
impl StateStore for FailingStore {
    async fn load(&self) -> Result<Option<Position>, StoreError> {
        Ok(None)
    }

    async fn save(&self, _position: &Position) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

/// Hourly candles with the given closes; low is `close - 5`
pub fn hourly_candles(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time: start + Duration::hours(i as i64),
            open: close,
            high: close + 5.0,
            low: close - 5.0,
            close,
            volume: 100.0,
        })
        .collect()
}
