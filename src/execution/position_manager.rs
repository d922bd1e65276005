use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Duration};

use crate::api::{ExchangeError, OrderGateway};
use crate::models::{BandedCandle, ExitReason, OrderId, OrderSide, Position, StopSize};
use crate::persistence::{load_or_init, StateStore, StoreError};
use crate::risk::sizing::round_to;
use crate::risk::{validate_quantity, SizingError};

/// Below this an exchange position amount is treated as flat
const FLAT_EPSILON: f64 = 1e-9;

/// How exit orders are priced and managed once a position is open
#[derive(Debug, Clone, PartialEq)]
pub struct ExitPolicy {
    /// Stop distance below entry, in quote currency
    pub stop_loss_points: f64,
    /// Target at the triggering candle's upper band; otherwise entry + `take_profit_points`
    pub use_upper_band_exit: bool,
    pub take_profit_points: f64,
    /// Wait between the market order and the entry price read
    pub settle_delay: Duration,
    pub use_trailing_stop: bool,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            stop_loss_points: 100.0,
            use_upper_band_exit: true,
            take_profit_points: 200.0,
            settle_delay: Duration::from_secs(2),
            use_trailing_stop: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("already in position")]
    AlreadyInPosition,

    #[error("entries blocked: exchange holds a position the store does not know about")]
    EntriesBlocked,

    #[error("refusing to enter: {0}")]
    InvalidQuantity(#[from] SizingError),

    #[error("triggering candle has no bands")]
    MissingBands,

    #[error("market order rejected: {0}")]
    MarketOrderRejected(ExchangeError),

    #[error("market order outcome unknown: {0}")]
    MarketOrderAmbiguous(ExchangeError),

    #[error("entry price unavailable: {0}")]
    EntryPriceUnavailable(ExchangeError),

    #[error("stop-loss order failed: {0}")]
    StopOrderFailed(ExchangeError),

    #[error("target order failed: {0}")]
    TargetOrderFailed(ExchangeError),

    #[error("exchange returned order id {0} for both stop and target")]
    DuplicateExitOrderIds(OrderId),

    #[error("failed to persist new position: {0}")]
    Persist(StoreError),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("failed to persist position: {0}")]
    Persist(#[from] StoreError),
}

/// Result of matching the stored exit orders against the exchange's open orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    NotInPosition,
    /// Both exit orders still resting
    StillOpen,
    /// Stop filled; `target_cancelled` reports the sibling cancel
    StopLossHit { target_cancelled: bool },
    TargetHit { stop_cancelled: bool },
    /// Neither exit order is open; the winner cannot be determined
    BothClosed,
}

impl ReconcileOutcome {
    /// True when this reconcile moved the position to FLAT
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::StopLossHit { .. }
                | ReconcileOutcome::TargetHit { .. }
                | ReconcileOutcome::BothClosed
        )
    }
}

/// Store vs exchange position check run once at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartupCheck {
    Consistent,
    /// Exchange holds a position while the store is FLAT; entries are blocked
    UntrackedExchangePosition { amount: f64 },
    /// Store is IN_POSITION but the exchange is flat; the next reconcile resolves it
    ExchangeFlat,
}

/// Owns the single position record and every transition of it.
///
/// Persisted states are FLAT and IN_POSITION. Entry and exit phases only
/// exist inside a single call; a failed entry always ends FLAT with the
/// exchange flattened.
pub struct PositionManager {
    gateway: Arc<dyn OrderGateway>,
    store: Arc<dyn StateStore>,
    policy: ExitPolicy,
    position: Position,
    entries_blocked: bool,
}

impl PositionManager {
    /// Load the stored record (creating a FLAT one on first run)
    pub async fn restore(
        gateway: Arc<dyn OrderGateway>,
        store: Arc<dyn StateStore>,
        policy: ExitPolicy,
    ) -> Result<Self, StoreError> {
        let position = load_or_init(store.as_ref()).await?;

        if position.in_trade {
            tracing::info!(
                entry_price = position.entry_price,
                quantity = position.quantity,
                stop_loss_order_id = ?position.stop_loss_order_id,
                target_order_id = ?position.target_order_id,
                "Restored open position"
            );
        }

        Ok(Self {
            gateway,
            store,
            policy,
            position,
            entries_blocked: false,
        })
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn is_in_trade(&self) -> bool {
        self.position.in_trade
    }

    pub fn entries_blocked(&self) -> bool {
        self.entries_blocked
    }

    // ========================================================================
    // FLAT -> IN_POSITION
    // ========================================================================

    /// Open a long with a paired stop-loss and target.
    ///
    /// On success both exit orders are live and the record naming them is
    /// persisted. On any failure after the market order may have executed,
    /// open orders are cancelled and the position closed before returning.
    pub async fn enter_long(
        &mut self,
        quantity: f64,
        trigger: &BandedCandle,
    ) -> Result<Position, EntryError> {
        if self.position.in_trade {
            tracing::warn!("enter_long called while already in position, ignoring");
            return Err(EntryError::AlreadyInPosition);
        }
        if self.entries_blocked {
            tracing::error!("Entry refused: untracked exchange position, run `bandbot flatten` to resolve");
            return Err(EntryError::EntriesBlocked);
        }

        let quantity = validate_quantity(quantity)?;
        let bands = trigger.bands.ok_or(EntryError::MissingBands)?;

        tracing::info!(
            "🎯 Entering long: qty {} (signal close ${:.1}, upper band ${:.1})",
            quantity,
            trigger.candle.close,
            bands.upper
        );

        // 1. Market buy, never retried
        let market = match self
            .gateway
            .submit_market_order(OrderSide::Buy, quantity)
            .await
        {
            Ok(ack) => ack,
            Err(e) if e.is_definitely_not_placed() => {
                tracing::error!("Market order rejected: {}", e);
                return Err(EntryError::MarketOrderRejected(e));
            }
            Err(e) => {
                tracing::error!("Market order outcome unknown: {}", e);
                self.abort_entry(quantity, &[]).await;
                return Err(EntryError::MarketOrderAmbiguous(e));
            }
        };
        tracing::info!(order_id = market.order_id, "Market order placed");

        // 2. Entry price proxy
        sleep(self.policy.settle_delay).await;
        let entry_price = match self.read_entry_price().await {
            Ok(price) => price,
            Err(e) => {
                self.abort_entry(quantity, &[]).await;
                return Err(EntryError::EntryPriceUnavailable(e));
            }
        };

        // 3. Stop-loss closing the whole position
        let stop_loss_price = round_to(entry_price - self.policy.stop_loss_points, 1);
        let stop = match self
            .gateway
            .submit_stop_order(OrderSide::Sell, stop_loss_price, StopSize::ClosePosition)
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!("Stop-loss order at ${:.1} failed: {}", stop_loss_price, e);
                self.abort_entry(quantity, &[]).await;
                return Err(EntryError::StopOrderFailed(e));
            }
        };
        tracing::info!(order_id = stop.order_id, stop_price = stop_loss_price, "Stop-loss placed");

        // 4. Limit target
        let target_price = if self.policy.use_upper_band_exit {
            round_to(bands.upper, 1)
        } else {
            round_to(entry_price + self.policy.take_profit_points, 1)
        };
        if target_price <= entry_price {
            tracing::warn!(
                "Target ${:.1} is at or below entry ${:.1}, limit will fill immediately",
                target_price,
                entry_price
            );
        }

        let target = match self
            .gateway
            .submit_limit_order(OrderSide::Sell, quantity, target_price, true)
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!("Target order at ${:.1} failed: {}", target_price, e);
                self.abort_entry(quantity, &[stop.order_id]).await;
                return Err(EntryError::TargetOrderFailed(e));
            }
        };
        tracing::info!(order_id = target.order_id, price = target_price, "Target placed");

        if stop.order_id == target.order_id {
            tracing::error!(order_id = stop.order_id, "Stop and target share an order id");
            self.abort_entry(quantity, &[stop.order_id]).await;
            return Err(EntryError::DuplicateExitOrderIds(stop.order_id));
        }

        // 5. Persist
        let position = Position {
            in_trade: true,
            entry_price,
            entry_time: Some(Utc::now()),
            quantity,
            market_order_id: Some(market.order_id),
            stop_loss_order_id: Some(stop.order_id),
            target_order_id: Some(target.order_id),
            stop_loss_price,
            target_price,
            exit_reason: None,
        };

        if let Err(e) = self.store.save(&position).await {
            tracing::error!("Could not persist new position: {}", e);
            self.abort_entry(quantity, &[stop.order_id, target.order_id]).await;
            return Err(EntryError::Persist(e));
        }

        self.position = position.clone();
        tracing::info!(
            "✅ In position: {} @ ${:.1} | stop ${:.1} | target ${:.1}",
            quantity,
            entry_price,
            stop_loss_price,
            target_price
        );

        Ok(position)
    }

    async fn read_entry_price(&self) -> Result<f64, ExchangeError> {
        let price = self.gateway.get_current_price().await?;
        if !price.is_finite() || price <= 0.0 {
            return Err(ExchangeError::Decode(format!("unusable ticker price {}", price)));
        }
        Ok(price)
    }

    /// Cancel what this entry placed and close whatever filled
    async fn abort_entry(&self, quantity: f64, placed: &[OrderId]) {
        tracing::error!("🚨 Entry aborted, flattening exchange position");

        for &order_id in placed {
            if let Err(e) = self.gateway.cancel_order(order_id).await {
                tracing::warn!(order_id, "Cancel during abort failed: {}", e);
            }
        }

        if let Err(e) = self.flatten(quantity).await {
            tracing::error!(
                "🚨 FLATTEN FAILED after aborted entry, exchange may hold an unprotected position: {}",
                e
            );
        }
    }

    /// Cancel all open orders and close any long, sized from the exchange.
    ///
    /// Falls back to `quantity_hint` when the position amount cannot be
    /// read; the close is reduce-only so it can never open a short.
    async fn flatten(&self, quantity_hint: f64) -> Result<(), ExchangeError> {
        let mut first_error = None;

        if let Err(e) = self.gateway.cancel_all_orders().await {
            tracing::warn!("Cancel-all failed: {}", e);
            first_error = Some(e);
        }

        let amount = match self.gateway.get_position_amount().await {
            Ok(amount) => amount,
            Err(e) => {
                tracing::warn!(
                    "Position amount unavailable ({}), closing {} reduce-only",
                    e,
                    quantity_hint
                );
                quantity_hint
            }
        };

        if amount > FLAT_EPSILON {
            let quantity = round_to(amount, 3);
            match self.gateway.close_long_position(quantity).await {
                Ok(ack) => tracing::info!(order_id = ack.order_id, quantity, "Closed long position"),
                Err(e) => {
                    tracing::error!("Closing {} failed: {}", quantity, e);
                    first_error.get_or_insert(e);
                }
            }
        } else if amount < -FLAT_EPSILON {
            tracing::error!(amount, "Exchange holds a short position, leaving it untouched");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ========================================================================
    // IN_POSITION -> FLAT
    // ========================================================================

    /// Infer which exit order filled from the exchange's open orders.
    ///
    /// An order that is no longer open is taken as filled. Calling this
    /// while both orders are open changes nothing.
    pub async fn reconcile(&mut self) -> Result<ReconcileOutcome, ReconcileError> {
        if !self.position.in_trade {
            return Ok(ReconcileOutcome::NotInPosition);
        }

        let open = self.gateway.list_open_orders().await?;
        let stop_id = self.position.stop_loss_order_id;
        let target_id = self.position.target_order_id;
        let stop_open = stop_id.is_some_and(|id| open.contains(&id));
        let target_open = target_id.is_some_and(|id| open.contains(&id));

        let (outcome, reason) = match (stop_open, target_open) {
            (true, true) => {
                tracing::info!(
                    "📊 Position active: stop ${:.1}, target ${:.1}",
                    self.position.stop_loss_price,
                    self.position.target_price
                );
                return Ok(ReconcileOutcome::StillOpen);
            }
            (false, true) => {
                tracing::info!(
                    "🛑 Stop-loss hit at ~${:.1}, cancelling target",
                    self.position.stop_loss_price
                );
                let target_cancelled = self.cancel_sibling(target_id).await;
                (ReconcileOutcome::StopLossHit { target_cancelled }, ExitReason::StopLoss)
            }
            (true, false) => {
                tracing::info!(
                    "💰 Target hit at ~${:.1}, cancelling stop-loss",
                    self.position.target_price
                );
                let stop_cancelled = self.cancel_sibling(stop_id).await;
                (ReconcileOutcome::TargetHit { stop_cancelled }, ExitReason::TakeProfit)
            }
            (false, false) => {
                tracing::warn!(
                    stop_loss_order_id = ?stop_id,
                    target_order_id = ?target_id,
                    "⚠️ Both exit orders are gone; cannot tell whether stop or target filled. Marking FLAT"
                );
                (ReconcileOutcome::BothClosed, ExitReason::Ambiguous)
            }
        };

        let next = self.position.closed(reason);
        self.store.save(&next).await?;
        self.position = next;

        Ok(outcome)
    }

    /// Best-effort cancel; the order may have filled in the meantime
    async fn cancel_sibling(&self, order_id: Option<OrderId>) -> bool {
        let Some(order_id) = order_id else {
            return false;
        };
        match self.gateway.cancel_order(order_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(order_id, "Could not cancel remaining exit order: {}", e);
                false
            }
        }
    }

    /// Ratchet the stop up behind price when trailing is enabled.
    ///
    /// The new stop is placed and recorded before the old one is cancelled.
    /// It is a reduce-only stop for the position quantity, since a second
    /// close-position stop is refused while the first is live. If the old
    /// stop cannot be cancelled (it may have triggered) the new one is
    /// withdrawn and the previous record restored.
    pub async fn update_trailing_stop(&mut self) -> Result<Option<f64>, ReconcileError> {
        if !self.policy.use_trailing_stop || !self.position.in_trade {
            return Ok(None);
        }
        let Some(old_stop_id) = self.position.stop_loss_order_id else {
            return Ok(None);
        };

        let price = self.gateway.get_current_price().await?;
        let candidate = round_to(price - self.policy.stop_loss_points, 1);
        if !candidate.is_finite() || candidate <= self.position.stop_loss_price {
            return Ok(None);
        }

        let size = StopSize::ReduceOnly(self.position.quantity);
        let new_stop = self
            .gateway
            .submit_stop_order(OrderSide::Sell, candidate, size)
            .await?;

        let previous = self.position.clone();
        let trailed = Position {
            stop_loss_order_id: Some(new_stop.order_id),
            stop_loss_price: candidate,
            ..previous.clone()
        };

        if let Err(e) = self.store.save(&trailed).await {
            self.withdraw_stop(new_stop.order_id).await;
            return Err(e.into());
        }
        self.position = trailed;

        if let Err(e) = self.gateway.cancel_order(old_stop_id).await {
            tracing::warn!(order_id = old_stop_id, "Old stop could not be cancelled, keeping it: {}", e);
            self.withdraw_stop(new_stop.order_id).await;
            self.store.save(&previous).await?;
            self.position = previous;
            return Err(e.into());
        }

        tracing::info!(
            "📈 Trailing stop raised to ${:.1} (price ${:.1})",
            candidate,
            price
        );
        Ok(Some(candidate))
    }

    async fn withdraw_stop(&self, order_id: OrderId) {
        if let Err(e) = self.gateway.cancel_order(order_id).await {
            tracing::error!(order_id, "Could not cancel new trailing stop: {}", e);
        }
    }

    // ========================================================================
    // Operator actions
    // ========================================================================

    /// Cancel everything, close any long and persist FLAT
    pub async fn emergency_flatten(&mut self) -> Result<(), ReconcileError> {
        tracing::warn!("🚨 Emergency flatten requested");
        self.flatten(self.position.quantity).await?;

        let next = self.position.closed(ExitReason::Manual);
        self.store.save(&next).await?;
        self.position = next;
        self.entries_blocked = false;

        tracing::info!("Flattened, position record is FLAT");
        Ok(())
    }

    /// Compare the stored record with the exchange's actual position
    pub async fn check_exchange_consistency(&mut self) -> Result<StartupCheck, ExchangeError> {
        let amount = self.gateway.get_position_amount().await?;
        let exchange_open = amount.abs() > FLAT_EPSILON;

        let check = match (self.position.in_trade, exchange_open) {
            (false, true) => {
                tracing::error!(
                    amount,
                    "🚨 Exchange holds a position but the store is FLAT. New entries are blocked; \
                     close it manually or run `bandbot flatten`"
                );
                self.entries_blocked = true;
                StartupCheck::UntrackedExchangePosition { amount }
            }
            (true, false) => {
                tracing::warn!("Store says IN_POSITION but the exchange is flat; reconcile will resolve it");
                StartupCheck::ExchangeFlat
            }
            _ => {
                tracing::info!(amount, in_trade = self.position.in_trade, "Store matches exchange position");
                StartupCheck::Consistent
            }
        };

        Ok(check)
    }
}
