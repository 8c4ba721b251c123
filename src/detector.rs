//! Peak-to-current drawdown detection over a short trailing window.

use crate::indicators::{DEFAULT_RSI_PERIOD, calculate_rsi};
use crate::models::{Candle, DrawdownObservation, PriceSeries};
use chrono::Duration;

/// Trailing window the peak is searched in. Unrelated to how many days of
/// history are fetched.
///
/// Series coarser than this window never fire: with a lookback above
/// [`FOUR_HOUR_CANDLES_MAX_DAYS`](crate::coin_gecko::FOUR_HOUR_CANDLES_MAX_DAYS)
/// CoinGecko returns 4-day candles, so the window holds a single candle.
pub const DRAWDOWN_WINDOW_DAYS: i64 = 3;

/// Reports a drawdown when the last close sits at least `threshold_pct` below
/// the highest high of the trailing `window_days`.
///
/// Returns `None` for an empty series, a window holding fewer than two
/// candles, or a non-positive peak.
pub fn detect_peak_drop(
    series: &PriceSeries,
    window_days: i64,
    threshold_pct: f64,
) -> Option<DrawdownObservation> {
    let last = series.last()?;
    let cutoff = last.time - Duration::days(window_days);

    let window: Vec<&Candle> = series
        .candles()
        .iter()
        .filter(|c| c.time >= cutoff)
        .collect();
    if window.len() < 2 {
        return None;
    }

    // Strict comparison keeps the earliest candle among equal highs.
    let peak = window
        .iter()
        .copied()
        .reduce(|best, c| if c.high > best.high { c } else { best })?;
    if peak.high <= 0.0 {
        return None;
    }

    let current = last.close;
    let drop_pct = (peak.high - current) / peak.high * 100.0;
    if !drop_pct.is_finite() || drop_pct < threshold_pct {
        return None;
    }

    Some(DrawdownObservation {
        peak_time: peak.time,
        peak_price: peak.high,
        current_price: current,
        drop_pct,
        rsi: calculate_rsi(&series.closes(), DEFAULT_RSI_PERIOD),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::{candle, t0};

    fn scenario(last_close: f64) -> PriceSeries {
        PriceSeries::from_candles(vec![
            candle(0, 90.0, 88.0),
            candle(6, 100.0, 97.0),
            candle(12, 95.0, 92.0),
            candle(18, 90.0, 85.0),
            candle(24, 86.0, last_close),
        ])
    }

    #[test]
    fn twenty_percent_drop_is_reported() {
        let obs = detect_peak_drop(&scenario(80.0), DRAWDOWN_WINDOW_DAYS, 15.0).unwrap();
        assert_eq!(obs.peak_price, 100.0);
        assert_eq!(obs.peak_time, t0() + Duration::hours(6));
        assert_eq!(obs.current_price, 80.0);
        assert!((obs.drop_pct - 20.0).abs() < 1e-9);
        assert!(obs.peak_price >= obs.current_price);
    }

    #[test]
    fn thirty_percent_drop_is_reported() {
        let obs = detect_peak_drop(&scenario(70.0), DRAWDOWN_WINDOW_DAYS, 15.0).unwrap();
        assert!((obs.drop_pct - 30.0).abs() < 1e-9);
    }

    #[test]
    fn below_threshold_is_quiet() {
        assert!(detect_peak_drop(&scenario(90.0), DRAWDOWN_WINDOW_DAYS, 15.0).is_none());
    }

    #[test]
    fn exactly_at_threshold_is_reported() {
        let obs = detect_peak_drop(&scenario(85.0), DRAWDOWN_WINDOW_DAYS, 15.0).unwrap();
        assert!((obs.drop_pct - 15.0).abs() < 1e-9);
    }

    #[test]
    fn drop_matches_formula_for_arbitrary_values() {
        for (peak, close) in [(250.0, 180.5), (0.0042, 0.0031), (61_234.5, 40_000.0)] {
            let series = PriceSeries::from_candles(vec![
                candle(0, peak * 0.9, peak * 0.85),
                candle(1, peak, peak * 0.95),
                candle(2, peak * 0.8, close),
            ]);
            let want = (peak - close) / peak * 100.0;
            let obs = detect_peak_drop(&series, DRAWDOWN_WINDOW_DAYS, 0.01).unwrap();
            assert!((obs.drop_pct - want).abs() < 1e-9);
        }
    }

    #[test]
    fn equal_highs_pick_the_earliest() {
        let series = PriceSeries::from_candles(vec![
            candle(0, 100.0, 95.0),
            candle(5, 100.0, 96.0),
            candle(10, 100.0, 94.0),
            candle(15, 80.0, 75.0),
        ]);
        for _ in 0..3 {
            let obs = detect_peak_drop(&series, DRAWDOWN_WINDOW_DAYS, 15.0).unwrap();
            assert_eq!(obs.peak_time, t0());
        }
    }

    #[test]
    fn peaks_before_the_window_are_ignored() {
        let series = PriceSeries::from_candles(vec![
            candle(0, 500.0, 480.0),
            candle(24 * 4, 100.0, 98.0),
            candle(24 * 5, 99.0, 90.0),
        ]);
        assert!(detect_peak_drop(&series, DRAWDOWN_WINDOW_DAYS, 15.0).is_none());

        let obs = detect_peak_drop(&series, 7, 15.0).unwrap();
        assert_eq!(obs.peak_price, 500.0);
    }

    #[test]
    fn four_day_candles_never_fill_the_window() {
        let series = PriceSeries::from_candles(vec![
            candle(0, 100.0, 95.0),
            candle(96, 100.0, 60.0),
            candle(192, 100.0, 40.0),
        ]);
        assert!(detect_peak_drop(&series, DRAWDOWN_WINDOW_DAYS, 15.0).is_none());
    }

    #[test]
    fn degenerate_series_are_quiet() {
        assert!(detect_peak_drop(&PriceSeries::default(), DRAWDOWN_WINDOW_DAYS, 15.0).is_none());

        let single = PriceSeries::from_candles(vec![candle(0, 100.0, 50.0)]);
        assert!(detect_peak_drop(&single, DRAWDOWN_WINDOW_DAYS, 15.0).is_none());
    }

    #[test]
    fn rsi_is_attached_once_history_allows() {
        let mut candles: Vec<_> = (0..20).map(|h| candle(h, 100.0 + h as f64, 99.0 + h as f64)).collect();
        candles.push(candle(20, 110.0, 80.0));
        let obs = detect_peak_drop(&PriceSeries::from_candles(candles), DRAWDOWN_WINDOW_DAYS, 15.0).unwrap();
        let rsi = obs.rsi.unwrap();
        assert!((0.0..=100.0).contains(&rsi));

        assert!(detect_peak_drop(&scenario(80.0), DRAWDOWN_WINDOW_DAYS, 15.0).unwrap().rsi.is_none());
    }
}
