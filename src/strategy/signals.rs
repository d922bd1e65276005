use crate::models::BandedCandle;

/// Which price leg touched the lower band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchLeg {
    Low,
    Close,
    LowAndClose,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoSignalReason {
    EmptySeries,
    BandsUndefined,
    /// Band width at or below the configured minimum
    NarrowBands { width: f64 },
    /// Neither low nor close reached the lower band
    NoTouch { width: f64 },
}

/// Entry decision derived from the most recent banded candle
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    EnterLong {
        candle: BandedCandle,
        leg: TouchLeg,
        width: f64,
    },
    NoSignal(NoSignalReason),
}

impl Signal {
    pub fn is_entry(&self) -> bool {
        matches!(self, Signal::EnterLong { .. })
    }

    /// The candle that produced an entry signal
    pub fn trigger_candle(&self) -> Option<&BandedCandle> {
        match self {
            Signal::EnterLong { candle, .. } => Some(candle),
            Signal::NoSignal(_) => None,
        }
    }
}

/// Touch-or-breach test on the last candle of a banded series.
///
/// Signals only when the band width is strictly greater than `min_width` and
/// the candle's low or close is at or below the lower band.
pub fn evaluate_signal(series: &[BandedCandle], min_width: f64) -> Signal {
    let Some(latest) = series.last() else {
        return Signal::NoSignal(NoSignalReason::EmptySeries);
    };

    let Some(bands) = latest.bands else {
        tracing::info!("Bands undefined for latest candle, no signal");
        return Signal::NoSignal(NoSignalReason::BandsUndefined);
    };

    let width = bands.width();
    if width <= min_width {
        tracing::info!(
            width = %format!("{:.2}", width),
            min_width,
            "Band width at or below minimum, no signal"
        );
        return Signal::NoSignal(NoSignalReason::NarrowBands { width });
    }

    let candle = &latest.candle;
    let low_touch = candle.low <= bands.lower;
    let close_touch = candle.close <= bands.lower;

    let leg = match (low_touch, close_touch) {
        (true, true) => TouchLeg::LowAndClose,
        (true, false) => TouchLeg::Low,
        (false, true) => TouchLeg::Close,
        (false, false) => {
            tracing::info!(
                width = %format!("{:.2}", width),
                low = candle.low,
                close = candle.close,
                lower_band = %format!("{:.2}", bands.lower),
                "No lower band touch"
            );
            return Signal::NoSignal(NoSignalReason::NoTouch { width });
        }
    };

    tracing::info!(
        width = %format!("{:.2}", width),
        leg = ?leg,
        low = candle.low,
        close = candle.close,
        lower_band = %format!("{:.2}", bands.lower),
        upper_band = %format!("{:.2}", bands.upper),
        "Lower band touch, entry signal"
    );

    Signal::EnterLong {
        candle: latest.clone(),
        leg,
        width,
    }
}
