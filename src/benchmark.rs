//! Movement of the benchmark asset since an asset's peak.

use crate::models::PriceSeries;
use chrono::{DateTime, Utc};

/// Percentage change from the first benchmark close at or after `peak_time`
/// to the benchmark's last close.
///
/// `None` when the benchmark has no candle at or after the peak, or its
/// reference close is not positive.
pub fn benchmark_change_pct(benchmark: &PriceSeries, peak_time: DateTime<Utc>) -> Option<f64> {
    let at_peak = benchmark.candles().iter().find(|c| c.time >= peak_time)?;
    let now = benchmark.last()?;

    if at_peak.close <= 0.0 {
        return None;
    }
    Some((now.close - at_peak.close) / at_peak.close * 100.0)
}
