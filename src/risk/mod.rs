// Position sizing and the pre-entry quantity gate
pub mod sizing;

pub use sizing::{
    calculate_quantity, validate_quantity, PositionSizer, SizingError, FALLBACK_QUANTITY,
    MIN_QUANTITY,
};
