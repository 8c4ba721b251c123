use ta::Next;
use ta::indicators::ExponentialMovingAverage;

pub const DEFAULT_RSI_PERIOD: usize = 14;

/// Wilder RSI for every close, aligned with the input.
///
/// Gains and losses are smoothed with an EMA of alpha `1/period`, seeded with
/// the first difference. The first `period` entries are `None`: index 0 has no
/// difference at all and the next ones are still dominated by the seed. From
/// index `period` on, every value is in `[0, 100]`; a window with no losses
/// reads 100.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || closes.is_empty() {
        return Vec::new();
    }

    // ta's EMA uses k = 2 / (n + 1); n = 2p - 1 gives Wilder's k = 1 / p.
    let smoothing = 2 * period - 1;
    let (Ok(mut avg_gain), Ok(mut avg_loss)) = (
        ExponentialMovingAverage::new(smoothing),
        ExponentialMovingAverage::new(smoothing),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(closes.len());
    out.push(None);

    for (i, pair) in closes.windows(2).enumerate() {
        let change = pair[1] - pair[0];
        let gain = avg_gain.next(change.max(0.0));
        let loss = avg_loss.next((-change).max(0.0));

        let value = if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        };

        // i + 1 is the index of the close this value belongs to.
        if i + 1 >= period {
            out.push(Some(value));
        } else {
            out.push(None);
        }
    }
    out
}

/// Latest RSI value, `None` while the series is shorter than `period + 1`.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).last().copied().flatten()
}
