use thiserror::Error;

use crate::api::OrderGateway;

/// Exchange lot size for the traded contract
pub const MIN_QUANTITY: f64 = 0.001;

/// Quantity used when the current price cannot be read
pub const FALLBACK_QUANTITY: f64 = MIN_QUANTITY;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("quantity {0} is not a finite number")]
    NotFinite(f64),

    #[error("quantity {0} is not positive")]
    NonPositive(f64),

    #[error("quantity {quantity} is below the minimum lot size {min}")]
    BelowLotSize { quantity: f64, min: f64 },
}

/// Converts capital and leverage into an order quantity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSizer {
    pub trading_capital: f64,
    pub leverage: u32,
}

impl PositionSizer {
    pub fn new(trading_capital: f64, leverage: u32) -> Self {
        Self {
            trading_capital,
            leverage,
        }
    }

    /// Size against the gateway's current price.
    ///
    /// A failed price read falls back to [`FALLBACK_QUANTITY`]; the result
    /// still has to pass [`validate_quantity`] before any order goes out.
    pub async fn size(&self, gateway: &dyn OrderGateway) -> f64 {
        let price = match gateway.get_current_price().await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(
                    "Price unavailable for sizing ({}), using fallback quantity {}",
                    e,
                    FALLBACK_QUANTITY
                );
                return FALLBACK_QUANTITY;
            }
        };

        match calculate_quantity(self.trading_capital, self.leverage, price) {
            Some(quantity) => {
                tracing::info!(
                    capital = self.trading_capital,
                    leverage = self.leverage,
                    price,
                    quantity,
                    "Position sized"
                );
                quantity
            }
            None => {
                tracing::warn!(price, "Unusable price for sizing, using fallback quantity");
                FALLBACK_QUANTITY
            }
        }
    }
}

/// `round(capital * leverage / price, 3)`; `None` for a non-positive or non-finite price
pub fn calculate_quantity(trading_capital: f64, leverage: u32, price: f64) -> Option<f64> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    let raw = trading_capital * f64::from(leverage) / price;
    Some(round_to(raw, 3))
}

/// Hard gate before entering: anything not tradable is rejected
pub fn validate_quantity(quantity: f64) -> Result<f64, SizingError> {
    if !quantity.is_finite() {
        return Err(SizingError::NotFinite(quantity));
    }
    if quantity <= 0.0 {
        return Err(SizingError::NonPositive(quantity));
    }
    // Tolerate float noise from rounding
    if quantity + 1e-9 < MIN_QUANTITY {
        return Err(SizingError::BelowLotSize {
            quantity,
            min: MIN_QUANTITY,
        });
    }
    Ok(quantity)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockGateway;

    #[test]
    fn test_calculate_quantity() {
        assert_eq!(calculate_quantity(5000.0, 10, 50000.0), Some(1.0));
        assert_eq!(calculate_quantity(5000.0, 10, 64000.0), Some(0.781));
        assert_eq!(calculate_quantity(5000.0, 10, 0.0), None);
        assert_eq!(calculate_quantity(5000.0, 10, f64::NAN), None);
    }

    #[test]
    fn test_validate_quantity() {
        assert_eq!(validate_quantity(1.0), Ok(1.0));
        assert_eq!(validate_quantity(0.001), Ok(0.001));
        assert!(matches!(validate_quantity(0.0), Err(SizingError::NonPositive(_))));
        assert!(matches!(validate_quantity(-0.5), Err(SizingError::NonPositive(_))));
        assert!(matches!(validate_quantity(f64::INFINITY), Err(SizingError::NotFinite(_))));
        assert!(matches!(
            validate_quantity(0.0004),
            Err(SizingError::BelowLotSize { .. })
        ));
    }

    #[tokio::test]
    async fn test_size_from_gateway_price() {
        let gateway = MockGateway::new(50000.0);
        let sizer = PositionSizer::new(5000.0, 10);
        assert_eq!(sizer.size(&gateway).await, 1.0);
    }

    #[tokio::test]
    async fn test_size_falls_back_when_price_unavailable() {
        let gateway = MockGateway::new(50000.0);
        gateway.fail_price_reads();
        let sizer = PositionSizer::new(5000.0, 10);
        assert_eq!(sizer.size(&gateway).await, FALLBACK_QUANTITY);
    }
}
