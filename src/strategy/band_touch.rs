use crate::indicators::add_bollinger_bands;
use crate::models::Candle;
use crate::strategy::signals::{evaluate_signal, Signal};
use crate::strategy::Strategy;

/// Lower Bollinger band touch strategy
///
/// Entry (long) when the last completed candle's low or close reaches the
/// lower band while the bands are wider than `min_width`.
#[derive(Debug, Clone)]
pub struct BandTouchStrategy {
    config: BandTouchConfig,
}

#[derive(Debug, Clone)]
pub struct BandTouchConfig {
    /// Rolling window for mean and deviation
    pub period: usize,

    /// Band distance in standard deviations
    pub std_dev_multiplier: f64,

    /// Minimum upper-lower distance in quote currency
    pub min_width: f64,
}

impl Default for BandTouchConfig {
    fn default() -> Self {
        Self {
            period: 10,
            std_dev_multiplier: 1.5,
            min_width: 300.0,
        }
    }
}

impl BandTouchStrategy {
    pub fn new(config: BandTouchConfig) -> Self {
        Self { config }
    }
}

impl Default for BandTouchStrategy {
    fn default() -> Self {
        Self::new(BandTouchConfig::default())
    }
}

impl Strategy for BandTouchStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Signal {
        let banded = add_bollinger_bands(
            candles,
            self.config.period,
            self.config.std_dev_multiplier,
        );
        evaluate_signal(&banded, self.config.min_width)
    }

    fn name(&self) -> &str {
        "BollingerBandTouch"
    }

    fn min_candles_required(&self) -> usize {
        self.config.period
    }
}
