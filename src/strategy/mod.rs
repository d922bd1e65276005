// Trading strategy module
pub mod band_touch;
pub mod signals;

pub use band_touch::{BandTouchConfig, BandTouchStrategy};
pub use signals::{evaluate_signal, NoSignalReason, Signal, TouchLeg};

use crate::models::Candle;

/// Base trait for entry strategies
pub trait Strategy: Send + Sync {
    /// Evaluate the latest completed candle of a series
    fn generate_signal(&self, candles: &[Candle]) -> Signal;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
