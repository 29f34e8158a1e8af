//! Trend direction and strength - accelerating stop-and-reverse tracker.
//!
//! Maintains an extreme point and an acceleration factor that grows on each
//! new extreme up to a cap; direction flips when price crosses the tracked
//! stop value.

use serde::{Deserialize, Serialize};

use crate::grid::errors::{EngineError, EngineResult};
use crate::market::Candle;

/// At least two bars to seed direction, plus a few to let the tracker settle
pub const MIN_HISTORY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
}

/// Tracker parameters: starting acceleration, growth step, cap
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendParams {
    #[serde(default = "default_af_start")]
    pub af_start: f64,
    #[serde(default = "default_af_step")]
    pub af_step: f64,
    #[serde(default = "default_af_max")]
    pub af_max: f64,
}

fn default_af_start() -> f64 {
    0.02
}

fn default_af_step() -> f64 {
    0.02
}

fn default_af_max() -> f64 {
    0.20
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            af_start: default_af_start(),
            af_step: default_af_step(),
            af_max: default_af_max(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendReading {
    /// Current stop value tracked below (up) or above (down) price
    pub value: f64,
    pub direction: TrendDirection,
    /// Current acceleration factor; higher means a longer-running trend
    pub acceleration_factor: f64,
}

impl TrendReading {
    /// Trend strength in [0, 1]: how far the acceleration factor has grown
    /// toward its cap
    pub fn strength(&self, params: &TrendParams) -> f64 {
        if params.af_max <= 0.0 {
            return 0.0;
        }
        (self.acceleration_factor / params.af_max).clamp(0.0, 1.0)
    }
}

/// Run the tracker over the full history and return the latest reading.
///
/// Sequential by nature: direction, extreme point and acceleration factor
/// carry forward bar to bar.
pub fn compute(candles: &[Candle], params: &TrendParams) -> EngineResult<TrendReading> {
    if candles.len() < MIN_HISTORY {
        return Err(EngineError::InsufficientData {
            required: MIN_HISTORY,
            got: candles.len(),
        });
    }

    let mut is_up = candles[1].close >= candles[0].close;
    let mut af = params.af_start;
    let mut ep;
    let mut stop;

    if is_up {
        stop = candles[0].low;
        ep = candles[1].high;
    } else {
        stop = candles[0].high;
        ep = candles[1].low;
    }

    for i in 2..candles.len() {
        let bar = &candles[i];
        let mut new_stop = stop + af * (ep - stop);

        if is_up {
            // The stop may never rise above the two previous lows
            new_stop = new_stop.min(candles[i - 1].low).min(candles[i - 2].low);
            if bar.low < new_stop {
                is_up = false;
                new_stop = ep;
                ep = bar.low;
                af = params.af_start;
            } else if bar.high > ep {
                ep = bar.high;
                af = (af + params.af_step).min(params.af_max);
            }
        } else {
            // The stop may never fall below the two previous highs
            new_stop = new_stop.max(candles[i - 1].high).max(candles[i - 2].high);
            if bar.high > new_stop {
                is_up = true;
                new_stop = ep;
                ep = bar.high;
                af = params.af_start;
            } else if bar.low < ep {
                ep = bar.low;
                af = (af + params.af_step).min(params.af_max);
            }
        }

        stop = new_stop;
    }

    Ok(TrendReading {
        value: stop,
        direction: if is_up {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        },
        acceleration_factor: af,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: 0,
            open,
            high,
            low,
            close,
            volume: 1.0,
            funding_rate: None,
        }
    }

    fn rising(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                bar(base, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect()
    }

    #[test]
    fn test_insufficient_history() {
        let candles = rising(3);
        let err = compute(&candles, &TrendParams::default()).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { required: 5, got: 3 }));
    }

    #[test]
    fn test_uptrend_detected_with_growing_af() {
        let candles = rising(30);
        let reading = compute(&candles, &TrendParams::default()).unwrap();
        assert_eq!(reading.direction, TrendDirection::Up);
        // Every bar made a new high, so the factor is capped
        assert!((reading.acceleration_factor - 0.20).abs() < 1e-9);
        assert!((reading.strength(&TrendParams::default()) - 1.0).abs() < 1e-9);
        // Stop trails below price in an uptrend
        assert!(reading.value < candles.last().unwrap().close);
    }

    #[test]
    fn test_reversal_flips_direction_and_resets_af() {
        let mut candles = rising(20);
        // Hard crash through the trailing stop
        for i in 0..10 {
            let base = 119.0 - 5.0 * i as f64;
            candles.push(bar(base, base + 1.0, base - 1.0, base - 0.5));
        }
        let reading = compute(&candles, &TrendParams::default()).unwrap();
        assert_eq!(reading.direction, TrendDirection::Down);
        assert!(reading.value > candles.last().unwrap().close);
    }

    #[test]
    fn test_deterministic() {
        let candles = rising(50);
        let a = compute(&candles, &TrendParams::default()).unwrap();
        let b = compute(&candles, &TrendParams::default()).unwrap();
        assert_eq!(a, b);
    }
}
