//! Volatility - Wilder-smoothed average true range, expressed as a
//! percentage of the latest close

use crate::grid::errors::{EngineError, EngineResult};
use crate::market::Candle;

pub const DEFAULT_PERIOD: usize = 14;

/// Smoothed true-range average as a percentage of the last close.
///
/// TR = max(high-low, |high-prev_close|, |low-prev_close|); smoothing is
/// Wilder's (alpha = 1/period), seeded with the simple mean of the first
/// `period` true ranges. Needs `period + 1` candles for a full TR window.
pub fn volatility_pct(candles: &[Candle], period: usize) -> EngineResult<f64> {
    let required = period + 1;
    if candles.len() < required {
        return Err(EngineError::InsufficientData {
            required,
            got: candles.len(),
        });
    }

    let tr: Vec<f64> = candles
        .windows(2)
        .map(|pair| pair[1].true_range(pair[0].close))
        .collect();

    let mut atr: f64 = tr[..period].iter().sum::<f64>() / period as f64;
    for &value in &tr[period..] {
        atr = (atr * (period - 1) as f64 + value) / period as f64;
    }

    let close = candles[candles.len() - 1].close;
    if close <= 0.0 {
        return Err(EngineError::InsufficientData {
            required,
            got: candles.len(),
        });
    }
    Ok(atr / close * 100.0)
}
