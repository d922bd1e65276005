// Technical indicators module
// Rolling mean / deviation and Bollinger bands over candle closes

pub mod bollinger;
pub mod moving_average;

pub use bollinger::add_bollinger_bands;
pub use moving_average::{calculate_sample_std_dev, calculate_sma};
