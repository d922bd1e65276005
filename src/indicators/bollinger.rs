use super::{calculate_sample_std_dev, calculate_sma};
use crate::models::{BandedCandle, Bands, Candle};

/// Decorate each candle with Bollinger bands over closing prices.
///
/// Candles before index `period - 1` carry no bands. Never fails past this
/// boundary: a degenerate window (period < 2, non-finite closes) leaves the
/// affected candles unbanded and logs a warning.
pub fn add_bollinger_bands(candles: &[Candle], period: usize, multiplier: f64) -> Vec<BandedCandle> {
    if period < 2 {
        tracing::warn!(period, "Bollinger period too small, returning unbanded series");
        return candles.iter().cloned().map(BandedCandle::unbanded).collect();
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let bands = if i + 1 >= period {
                band_at(&closes[..=i], period, multiplier)
            } else {
                None
            };

            if bands.is_none() && i + 1 >= period {
                tracing::warn!(
                    open_time = %candle.open_time,
                    "Non-finite band values, leaving candle unbanded"
                );
            }

            BandedCandle {
                candle: candle.clone(),
                bands,
            }
        })
        .collect()
}

fn band_at(closes: &[f64], period: usize, multiplier: f64) -> Option<Bands> {
    let sma = calculate_sma(closes, period)?;
    let std_dev = calculate_sample_std_dev(closes, period)?;
    let bands = Bands {
        sma,
        std_dev,
        upper: sma + multiplier * std_dev,
        lower: sma - multiplier * std_dev,
    };

    if bands.upper.is_finite() && bands.lower.is_finite() {
        Some(bands)
    } else {
        None
    }
}
