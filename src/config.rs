//! Runtime settings, loaded once at startup.
//!
//! Sources, lowest precedence first: built-in defaults, an optional config
//! file (`config.json`, `config.toml`, ...), then `BANDBOT_*` environment
//! variables. The upper-case keys of older `config.json` files (`API_KEY`,
//! `TRADING_CAPITAL`, ...) are accepted as aliases.

use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::time::Duration;

use crate::api::{ApiCredentials, RetryPolicy};
use crate::execution::{CheckSchedule, ExitPolicy, Market};
use crate::models::Interval;
use crate::risk::PositionSizer;
use crate::strategy::BandTouchConfig;

const ENV_PREFIX: &str = "BANDBOT";
const DEFAULT_CONFIG_NAME: &str = "config";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Clone, Deserialize)]
pub struct Settings {
    #[serde(default, alias = "API_KEY")]
    pub api_key: String,
    #[serde(default, alias = "API_SECRET")]
    pub api_secret: String,

    #[serde(default = "default_trading_capital", alias = "TRADING_CAPITAL")]
    pub trading_capital: f64,
    #[serde(default = "default_leverage", alias = "LEVERAGE")]
    pub leverage: u32,

    #[serde(default = "default_bollinger_period", alias = "BOLLINGER_PERIOD")]
    pub bollinger_period: usize,
    #[serde(default = "default_bollinger_std", alias = "BOLLINGER_STD")]
    pub bollinger_std: f64,
    #[serde(default = "default_min_bollinger_width", alias = "MIN_BOLLINGER_WIDTH")]
    pub min_bollinger_width: f64,

    #[serde(default = "default_stop_loss_points", alias = "STOP_LOSS_POINTS")]
    pub stop_loss_points: f64,
    #[serde(default = "default_true", alias = "USE_UPPER_BAND_EXIT")]
    pub use_upper_band_exit: bool,
    #[serde(default = "default_take_profit_points")]
    pub take_profit_points: f64,
    #[serde(default)]
    pub use_trailing_stop: bool,
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: Interval,
    #[serde(default = "default_candle_lookback")]
    pub candle_lookback: usize,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    #[serde(default = "default_fetch_retry_delay_secs")]
    pub fetch_retry_delay_secs: u64,

    #[serde(default = "default_check_minute")]
    pub check_minute: u32,
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub testnet: bool,
}

fn default_trading_capital() -> f64 {
    5000.0
}
fn default_leverage() -> u32 {
    10
}
fn default_bollinger_period() -> usize {
    10
}
fn default_bollinger_std() -> f64 {
    1.5
}
fn default_min_bollinger_width() -> f64 {
    300.0
}
fn default_stop_loss_points() -> f64 {
    100.0
}
fn default_take_profit_points() -> f64 {
    200.0
}
fn default_true() -> bool {
    true
}
fn default_settle_delay_secs() -> u64 {
    2
}
fn default_symbol() -> String {
    "BTCUSDT".to_string()
}
fn default_interval() -> Interval {
    Interval::OneHour
}
fn default_candle_lookback() -> usize {
    30
}
fn default_fetch_retries() -> u32 {
    10
}
fn default_fetch_retry_delay_secs() -> u64 {
    2
}
fn default_check_minute() -> u32 {
    31
}
fn default_utc_offset_minutes() -> i32 {
    330
}
fn default_state_file() -> PathBuf {
    PathBuf::from("trade_state.json")
}

impl Settings {
    /// Load from `path` (must exist) or the optional default `config.*`,
    /// overlaid with `BANDBOT_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |msg: String| Err(SettingsError::Invalid(msg));

        if self.api_key.trim().is_empty() || self.api_secret.trim().is_empty() {
            return invalid("api_key and api_secret must be set".into());
        }
        if !self.trading_capital.is_finite() || self.trading_capital <= 0.0 {
            return invalid(format!("trading_capital must be positive, got {}", self.trading_capital));
        }
        if self.leverage == 0 {
            return invalid("leverage must be at least 1".into());
        }
        if self.bollinger_period < 2 {
            return invalid(format!("bollinger_period must be >= 2, got {}", self.bollinger_period));
        }
        if !(self.bollinger_std > 0.0) {
            return invalid(format!("bollinger_std must be positive, got {}", self.bollinger_std));
        }
        if !(self.stop_loss_points > 0.0) {
            return invalid(format!("stop_loss_points must be positive, got {}", self.stop_loss_points));
        }
        if !self.use_upper_band_exit && !(self.take_profit_points > 0.0) {
            return invalid(format!(
                "take_profit_points must be positive, got {}",
                self.take_profit_points
            ));
        }
        if self.check_minute >= 60 {
            return invalid(format!("check_minute must be below 60, got {}", self.check_minute));
        }
        if self.candle_lookback < self.bollinger_period {
            return invalid(format!(
                "candle_lookback ({}) must cover bollinger_period ({})",
                self.candle_lookback, self.bollinger_period
            ));
        }
        Ok(())
    }

    pub fn credentials(&self) -> ApiCredentials {
        ApiCredentials::new(self.api_key.clone(), self.api_secret.clone())
    }

    pub fn band_config(&self) -> BandTouchConfig {
        BandTouchConfig {
            period: self.bollinger_period,
            std_dev_multiplier: self.bollinger_std,
            min_width: self.min_bollinger_width,
        }
    }

    pub fn exit_policy(&self) -> ExitPolicy {
        ExitPolicy {
            stop_loss_points: self.stop_loss_points,
            use_upper_band_exit: self.use_upper_band_exit,
            take_profit_points: self.take_profit_points,
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            use_trailing_stop: self.use_trailing_stop,
        }
    }

    pub fn sizer(&self) -> PositionSizer {
        PositionSizer::new(self.trading_capital, self.leverage)
    }

    pub fn market(&self) -> Market {
        Market {
            symbol: self.symbol.clone(),
            interval: self.interval,
            lookback: self.candle_lookback,
        }
    }

    pub fn candle_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.fetch_retries, Duration::from_secs(self.fetch_retry_delay_secs))
    }

    pub fn schedule(&self) -> CheckSchedule {
        CheckSchedule::new(self.check_minute, self.utc_offset_minutes)
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("trading_capital", &self.trading_capital)
            .field("leverage", &self.leverage)
            .field("bollinger_period", &self.bollinger_period)
            .field("bollinger_std", &self.bollinger_std)
            .field("min_bollinger_width", &self.min_bollinger_width)
            .field("stop_loss_points", &self.stop_loss_points)
            .field("use_upper_band_exit", &self.use_upper_band_exit)
            .field("take_profit_points", &self.take_profit_points)
            .field("use_trailing_stop", &self.use_trailing_stop)
            .field("symbol", &self.symbol)
            .field("interval", &self.interval)
            .field("check_minute", &self.check_minute)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("state_file", &self.state_file)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[set]"))
            .field("testnet", &self.testnet)
            .finish_non_exhaustive()
    }
}
