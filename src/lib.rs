// Core modules
pub mod api;
pub mod config;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod strategy;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use api::{ExchangeError, MarketDataProvider, OrderGateway};
pub use models::*;
pub use strategy::Strategy;
