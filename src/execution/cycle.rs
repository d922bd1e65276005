use std::sync::Arc;
use thiserror::Error;

use crate::api::{ExchangeError, MarketDataProvider, OrderGateway};
use crate::execution::position_manager::{
    EntryError, PositionManager, ReconcileError, ReconcileOutcome,
};
use crate::models::{Interval, Position};
use crate::risk::{validate_quantity, PositionSizer, SizingError};
use crate::strategy::{NoSignalReason, Signal, Strategy};

/// What a single cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Exit orders still resting; signal evaluation skipped
    StillInPosition,
    /// Startup check found an untracked exchange position
    EntriesBlocked,
    InsufficientData { got: usize, needed: usize },
    NoSignal(NoSignalReason),
    Entered(Position),
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("reconcile failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("market data unavailable: {0}")]
    MarketData(ExchangeError),

    #[error("position sizing rejected: {0}")]
    Sizing(#[from] SizingError),

    #[error("entry failed: {0}")]
    Entry(#[from] EntryError),
}

/// Market/order parameters for the traded instrument
#[derive(Debug, Clone)]
pub struct Market {
    pub symbol: String,
    pub interval: Interval,
    /// Candles requested per cycle
    pub lookback: usize,
}

/// One reconcile-or-evaluate pass. Owns the position manager, so only one
/// cycle can run at a time.
pub struct TradingCycle {
    manager: PositionManager,
    market_data: Arc<dyn MarketDataProvider>,
    gateway: Arc<dyn OrderGateway>,
    strategy: Box<dyn Strategy>,
    sizer: PositionSizer,
    market: Market,
}

impl TradingCycle {
    pub fn new(
        manager: PositionManager,
        market_data: Arc<dyn MarketDataProvider>,
        gateway: Arc<dyn OrderGateway>,
        strategy: Box<dyn Strategy>,
        sizer: PositionSizer,
        market: Market,
    ) -> Self {
        Self {
            manager,
            market_data,
            gateway,
            strategy,
            sizer,
            market,
        }
    }

    pub fn manager(&self) -> &PositionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PositionManager {
        &mut self.manager
    }

    pub async fn run_once(&mut self) -> Result<CycleOutcome, CycleError> {
        tracing::info!("Running trading cycle...");

        if self.manager.is_in_trade() {
            let outcome = self.manager.reconcile().await?;
            if !outcome.is_complete() {
                self.trail_stop().await;
                tracing::info!("Still in active trade, waiting for exit");
                return Ok(CycleOutcome::StillInPosition);
            }
            log_exit(outcome);
        }

        if self.manager.entries_blocked() {
            tracing::warn!("Skipping signal evaluation: entries are blocked");
            return Ok(CycleOutcome::EntriesBlocked);
        }

        let candles = self
            .market_data
            .fetch_recent_candles(&self.market.symbol, self.market.interval, self.market.lookback)
            .await
            .map_err(CycleError::MarketData)?;

        let needed = self.strategy.min_candles_required();
        if candles.len() < needed {
            tracing::error!(
                "Insufficient data: {} candles, {} needs {}",
                candles.len(),
                self.strategy.name(),
                needed
            );
            return Ok(CycleOutcome::InsufficientData {
                got: candles.len(),
                needed,
            });
        }

        let (trigger, width) = match self.strategy.generate_signal(&candles) {
            Signal::EnterLong { candle, leg, width } => {
                tracing::info!(
                    "Trade signal: {:?} touched lower band ${:.2} (width ${:.2}) on {} candle",
                    leg,
                    candle.bands.map(|b| b.lower).unwrap_or_default(),
                    width,
                    candle.candle.open_time
                );
                (candle, width)
            }
            Signal::NoSignal(reason) => {
                tracing::info!("No trade signal detected ({:?})", reason);
                return Ok(CycleOutcome::NoSignal(reason));
            }
        };

        let quantity = validate_quantity(self.sizer.size(self.gateway.as_ref()).await)?;
        tracing::info!(quantity, width, "Attempting to enter trade");

        let position = self.manager.enter_long(quantity, &trigger).await?;
        Ok(CycleOutcome::Entered(position))
    }

    async fn trail_stop(&mut self) {
        match self.manager.update_trailing_stop().await {
            Ok(_) => {}
            Err(e) => tracing::warn!("Trailing stop update failed: {}", e),
        }
    }
}

fn log_exit(outcome: ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::StopLossHit { .. } => {
            tracing::info!("Previous trade closed at stop-loss, ready for next signal")
        }
        ReconcileOutcome::TargetHit { .. } => {
            tracing::info!("Previous trade closed at target, ready for next signal")
        }
        ReconcileOutcome::BothClosed => {
            tracing::warn!("Previous trade closed with unknown exit, ready for next signal")
        }
        ReconcileOutcome::NotInPosition | ReconcileOutcome::StillOpen => {}
    }
}
