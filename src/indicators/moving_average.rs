/// Calculate Simple Moving Average (SMA) over the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Sample standard deviation (N-1 denominator) over the last `period` prices
///
/// Band-width thresholds are calibrated against the sample convention, so
/// this must not be swapped for the population formula.
pub fn calculate_sample_std_dev(prices: &[f64], period: usize) -> Option<f64> {
    if period < 2 || prices.len() < period {
        return None;
    }

    let mean = calculate_sma(prices, period)?;
    let sum_sq: f64 = prices
        .iter()
        .rev()
        .take(period)
        .map(|p| (p - mean).powi(2))
        .sum();

    Some((sum_sq / (period - 1) as f64).sqrt())
}
