//! Volume anomaly - current bar volume against its trailing average

use crate::grid::errors::{EngineError, EngineResult};
use crate::market::Candle;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_ANOMALY_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeReading {
    /// Current volume / trailing average volume
    pub ratio: f64,
    pub is_anomalous: bool,
}

/// Ratio of the last bar's volume to the rolling average of the `period`
/// bars before it. Anomalous when the ratio exceeds `multiplier`.
pub fn compute(candles: &[Candle], period: usize, multiplier: f64) -> EngineResult<VolumeReading> {
    let required = period + 1;
    if candles.len() < required {
        return Err(EngineError::InsufficientData {
            required,
            got: candles.len(),
        });
    }

    let last = candles.len() - 1;
    let trailing = &candles[last - period..last];
    let average: f64 = trailing.iter().map(|c| c.volume).sum::<f64>() / period as f64;

    let ratio = if average > 0.0 {
        candles[last].volume / average
    } else {
        0.0
    };

    Ok(VolumeReading {
        ratio,
        is_anomalous: ratio > multiplier,
    })
}
