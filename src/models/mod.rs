use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Exchange-assigned order identifier
pub type OrderId = u64;

/// OHLCV candlestick for one completed interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bollinger values computed over the trailing window ending at a candle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bands {
    pub sma: f64,
    pub std_dev: f64,
    pub upper: f64,
    pub lower: f64,
}

impl Bands {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Candle decorated with bands. `bands` is `None` until the window is full.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandedCandle {
    pub candle: Candle,
    pub bands: Option<Bands>,
}

impl BandedCandle {
    pub fn unbanded(candle: Candle) -> Self {
        Self {
            candle,
            bands: None,
        }
    }
}

/// Kline interval supported by the market data provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Interval::OneMinute => Duration::minutes(1),
            Interval::FiveMinutes => Duration::minutes(5),
            Interval::FifteenMinutes => Duration::minutes(15),
            Interval::OneHour => Duration::hours(1),
            Interval::FourHours => Duration::hours(4),
            Interval::OneDay => Duration::days(1),
        }
    }

    /// Most recent interval boundary at or before `now` (UTC-aligned, like exchange klines)
    pub fn last_boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.duration().num_milliseconds();
        let ms = now.timestamp_millis();
        let floored = ms - ms.rem_euclid(step);
        DateTime::from_timestamp_millis(floored).unwrap_or(now)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_exchange_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// How much a stop-market order closes when it triggers.
///
/// The exchange allows only one live `closePosition` stop per side, so a
/// replacement stop placed while the original is still working must carry
/// an explicit reduce-only quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopSize {
    ClosePosition,
    ReduceOnly(f64),
}

/// Acknowledgement for an accepted order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Both exit orders gone; cannot tell which filled
    Ambiguous,
    Manual,
}

/// The single persisted position record.
///
/// Order ids and prices are only meaningful while `in_trade` is true; a
/// flat record keeps whatever the last trade left behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub in_trade: bool,
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default, deserialize_with = "lenient_time")]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default, deserialize_with = "lenient_order_id")]
    pub market_order_id: Option<OrderId>,
    #[serde(default, deserialize_with = "lenient_order_id")]
    pub stop_loss_order_id: Option<OrderId>,
    #[serde(default, deserialize_with = "lenient_order_id")]
    pub target_order_id: Option<OrderId>,
    #[serde(default)]
    pub stop_loss_price: f64,
    #[serde(default)]
    pub target_price: f64,
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    /// Zeroed record used on first run
    pub fn flat() -> Self {
        Self {
            in_trade: false,
            entry_price: 0.0,
            entry_time: None,
            quantity: 0.0,
            market_order_id: None,
            stop_loss_order_id: None,
            target_order_id: None,
            stop_loss_price: 0.0,
            target_price: 0.0,
            exit_reason: None,
        }
    }

    /// Same record marked flat with the given exit reason
    pub fn closed(&self, reason: ExitReason) -> Self {
        Self {
            in_trade: false,
            exit_reason: Some(reason),
            ..self.clone()
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

/// Accepts integer ids, numeric strings, empty strings and null.
/// State files written by earlier versions of the bot used "" for "no order".
fn lenient_order_id<'de, D>(deserializer: D) -> Result<Option<OrderId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(id)) => Ok(Some(id)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Accepts RFC 3339, "%Y-%m-%d %H:%M:%S" (read as UTC), empty strings and null
fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(t.with_timezone(&Utc)));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
