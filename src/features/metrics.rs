//! Rolling microstructure metrics, as pure functions over swap samples.

/// Mean absolute price-to-price step over the series, as a percentage of
/// the mean price. Needs at least 3 prices and a positive mean.
pub fn atr_pct(prices: &[f64]) -> Option<f64> {
    if prices.len() < 3 {
        return None;
    }
    let mean_price = prices.iter().sum::<f64>() / prices.len() as f64;
    if mean_price <= 0.0 {
        return None;
    }
    let mean_step = prices
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .sum::<f64>()
        / (prices.len() - 1) as f64;
    Some(mean_step / mean_price * 100.0)
}

/// Volatility-compression ratio: short-window ATR% over long-window ATR%.
pub fn vc_ratio(atr_short: Option<f64>, atr_long: Option<f64>) -> Option<f64> {
    match (atr_short, atr_long) {
        (Some(short), Some(long)) if long > 0.0 => Some(short / long),
        _ => None,
    }
}

/// Slope of the cumulative signed base-volume series over its last five
/// observations: (cvd[last] - cvd[max(0, last-5)]) / 5.
pub fn cvd_slope(signed_volumes: &[f64]) -> Option<f64> {
    if signed_volumes.is_empty() {
        return None;
    }
    let mut cvd = Vec::with_capacity(signed_volumes.len());
    let mut running = 0.0;
    for v in signed_volumes {
        running += v;
        cvd.push(running);
    }
    let last = cvd.len() - 1;
    let start = last.saturating_sub(5);
    Some((cvd[last] - cvd[start]) / 5.0)
}
