//! Recursive indicators over full bar histories.
//!
//! Every function returns one value per input element and is a plain
//! left-to-right recursion, so identical `f64` inputs always produce
//! identical outputs. Signal thresholds are compared against these values
//! directly.

use momentum_core::Bar;

/// Exponential moving average with `alpha = 2 / (period + 1)`, seeded with
/// the first input value (no leading NaNs).
///
/// A period of 0 is treated as 1.
#[must_use]
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = values.first() else {
        return Vec::new();
    };
    let alpha = 2.0 / (period.max(1) as f64 + 1.0);

    let mut out = Vec::with_capacity(values.len());
    let mut prev = first;
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Relative strength index with gains and losses smoothed by
/// `alpha = 1 / period`.
///
/// The smoothing is seeded with the first observed gain/loss (0 at index
/// 0). A value is 50 wherever the smoothed loss is exactly zero, and the
/// whole series is 50 when fewer than two closes exist.
#[must_use]
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    if n < 2 {
        return vec![50.0; n];
    }
    let alpha = 1.0 / period.max(1) as f64;

    let mut out = Vec::with_capacity(n);
    let mut avg_gain = 0.0_f64;
    let mut avg_loss = 0.0_f64;
    out.push(50.0);

    for w in closes.windows(2) {
        let change = w[1] - w[0];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;

        if avg_loss == 0.0 {
            out.push(50.0);
        } else {
            out.push(100.0 - 100.0 / (1.0 + avg_gain / avg_loss));
        }
    }
    out
}

/// True range of `bar` given the previous close.
#[must_use]
pub fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

/// Average true range smoothed with `alpha = 1 / period`, seeded with the
/// first bar's high-low range. Fewer than two bars yield zeros.
#[must_use]
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let alpha = 1.0 / period.max(1) as f64;

    let mut out = Vec::with_capacity(n);
    let mut prev = bars[0].high - bars[0].low;
    out.push(prev);
    for w in bars.windows(2) {
        let tr = true_range(&w[1], w[0].close);
        prev = alpha * tr + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    fn bar(i: i64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            open_time: DateTime::from_timestamp(0, 0).unwrap() + Duration::minutes(5 * i),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_ema_known_values() {
        let out = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out, vec![1.0, 1.5, 2.25, 3.125, 4.0625]);
    }

    #[test]
    fn test_ema_length_and_seed() {
        let values: Vec<f64> = (0..37).map(|i| 100.0 + (f64::from(i) * 0.7).sin()).collect();
        for period in [1, 2, 9, 50, 200] {
            let out = ema(&values, period);
            assert_eq!(out.len(), values.len());
            assert_eq!(out[0], values[0]);
        }
        assert!(ema(&[], 10).is_empty());
    }

    #[test]
    fn test_ema_is_deterministic() {
        let values: Vec<f64> = (0..500).map(|i| 50.0 + f64::from(i % 17) * 0.31).collect();
        let a = ema(&values, 50);
        let b = ema(&values, 50);
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_rsi_known_values() {
        let out = rsi(&[10.0, 11.0, 10.5, 11.5, 11.0], 2);
        assert_eq!(out[0], 50.0);
        // no loss observed yet
        assert_eq!(out[1], 50.0);
        assert!((out[2] - 50.0).abs() < 1e-12);
        assert!((out[3] - 83.333_333_333_333_33).abs() < 1e-9);
        assert!((out[4] - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_neutral_cases() {
        assert!(rsi(&[], 14).is_empty());
        assert_eq!(rsi(&[42.0], 14), vec![50.0]);
        // strictly rising series never accumulates a loss
        let rising: Vec<f64> = (0..30).map(f64::from).collect();
        assert!(rsi(&rising, 14).iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_rsi_bounded() {
        let closes: Vec<f64> = (0..400)
            .map(|i| 100.0 + (f64::from(i) * 0.37).sin() * 5.0 + f64::from(i % 7))
            .collect();
        for v in rsi(&closes, 14) {
            assert!((0.0..=100.0).contains(&v), "rsi out of range: {v}");
        }
    }

    #[test]
    fn test_atr_known_values() {
        let bars = vec![
            bar(0, 10.0, 8.0, 9.0),
            bar(1, 11.0, 9.5, 10.5),
            bar(2, 10.0, 7.0, 8.0),
        ];
        assert_eq!(atr(&bars, 2), vec![2.0, 2.0, 2.75]);
    }

    #[test]
    fn test_atr_short_input_is_zero() {
        assert!(atr(&[], 14).is_empty());
        assert_eq!(atr(&[bar(0, 10.0, 8.0, 9.0)], 14), vec![0.0]);
    }

    #[test]
    fn test_true_range_uses_gap() {
        let b = bar(1, 105.0, 104.0, 104.5);
        assert_eq!(true_range(&b, 100.0), 5.0);
    }
}
