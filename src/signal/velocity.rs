//! Velocity - rate of change over N bars, with a panic threshold

use crate::grid::errors::{EngineError, EngineResult};
use crate::market::Candle;

pub const DEFAULT_LOOKBACK: usize = 10;
pub const DEFAULT_PANIC_THRESHOLD_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityReading {
    /// Percentage change of close vs `lookback` bars prior; signed
    pub change_pct: f64,
    pub is_panic: bool,
}

/// Percentage change of the last close against the close `lookback` bars
/// before it. Panic when the absolute change exceeds `panic_threshold_pct`.
pub fn compute(
    candles: &[Candle],
    lookback: usize,
    panic_threshold_pct: f64,
) -> EngineResult<VelocityReading> {
    let required = lookback + 1;
    if candles.len() < required {
        return Err(EngineError::InsufficientData {
            required,
            got: candles.len(),
        });
    }

    let last = candles.len() - 1;
    let reference = candles[last - lookback].close;
    if reference <= 0.0 {
        return Err(EngineError::InsufficientData {
            required,
            got: candles.len(),
        });
    }

    let change_pct = (candles[last].close - reference) / reference * 100.0;
    Ok(VelocityReading {
        change_pct,
        is_panic: change_pct.abs() > panic_threshold_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64) -> Candle {
        Candle {
            timestamp: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            funding_rate: None,
        }
    }

    #[test]
    fn test_insufficient_history() {
        let candles = vec![bar(100.0); 10];
        assert!(matches!(
            compute(&candles, 10, 5.0).unwrap_err(),
            EngineError::InsufficientData { required: 11, got: 10 }
        ));
    }

    #[test]
    fn test_crash_is_panic() {
        let mut candles = vec![bar(100.0); 11];
        candles[10] = bar(93.0);
        let reading = compute(&candles, 10, 5.0).unwrap();
        assert!((reading.change_pct + 7.0).abs() < 1e-9);
        assert!(reading.is_panic);
    }

    #[test]
    fn test_rally_is_panic_too() {
        let mut candles = vec![bar(100.0); 11];
        candles[10] = bar(106.0);
        let reading = compute(&candles, 10, 5.0).unwrap();
        assert!(reading.change_pct > 0.0);
        assert!(reading.is_panic);
    }

    #[test]
    fn test_drift_is_not_panic() {
        let mut candles = vec![bar(100.0); 11];
        candles[10] = bar(102.0);
        let reading = compute(&candles, 10, 5.0).unwrap();
        assert!(!reading.is_panic);
    }
}
