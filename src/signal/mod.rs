//! Signal library - independent indicator calculators consumed by the
//! decision hierarchy. Pure functions over candle slices.

pub mod trend;
pub mod velocity;
pub mod volatility;
pub mod volume;

use serde::{Deserialize, Serialize};

use crate::grid::errors::EngineResult;
use crate::market::Candle;

pub use trend::{TrendDirection, TrendParams, TrendReading};
pub use velocity::VelocityReading;
pub use volume::VolumeReading;

/// Parameters for all indicators in one place
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(default)]
    pub trend: TrendParams,
    #[serde(default = "default_volatility_period")]
    pub volatility_period: usize,
    #[serde(default = "default_volume_period")]
    pub volume_period: usize,
    #[serde(default = "default_volume_anomaly_multiplier")]
    pub volume_anomaly_multiplier: f64,
    #[serde(default = "default_velocity_lookback")]
    pub velocity_lookback: usize,
    #[serde(default = "default_panic_threshold_pct")]
    pub panic_threshold_pct: f64,
}

fn default_volatility_period() -> usize {
    volatility::DEFAULT_PERIOD
}

fn default_volume_period() -> usize {
    volume::DEFAULT_PERIOD
}

fn default_volume_anomaly_multiplier() -> f64 {
    volume::DEFAULT_ANOMALY_MULTIPLIER
}

fn default_velocity_lookback() -> usize {
    velocity::DEFAULT_LOOKBACK
}

fn default_panic_threshold_pct() -> f64 {
    velocity::DEFAULT_PANIC_THRESHOLD_PCT
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            trend: TrendParams::default(),
            volatility_period: default_volatility_period(),
            volume_period: default_volume_period(),
            volume_anomaly_multiplier: default_volume_anomaly_multiplier(),
            velocity_lookback: default_velocity_lookback(),
            panic_threshold_pct: default_panic_threshold_pct(),
        }
    }
}

impl SignalConfig {
    /// Smallest history every indicator can be computed from
    pub fn min_history(&self) -> usize {
        trend::MIN_HISTORY
            .max(self.volatility_period + 1)
            .max(self.volume_period + 1)
            .max(self.velocity_lookback + 1)
    }
}

/// Per-evaluation bundle of every indicator output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub trend_direction: TrendDirection,
    /// Trend strength in [0, 1]
    pub trend_strength: f64,
    /// Smoothed true range, percent of close
    pub volatility_pct: f64,
    /// Volume / trailing average; 0 when below the anomaly multiplier's reach
    pub volume_anomaly_strength: f64,
    /// Signed rate of change, percent
    pub velocity_pct: f64,
    pub is_panic: bool,
}

/// Compute every indicator over the same history. Fails with
/// `InsufficientData` if any indicator lacks history; the caller skips the
/// evaluation until enough candles accumulate.
pub fn compute_snapshot(candles: &[Candle], config: &SignalConfig) -> EngineResult<SignalSnapshot> {
    let trend = trend::compute(candles, &config.trend)?;
    let volatility_pct = volatility::volatility_pct(candles, config.volatility_period)?;
    let volume = volume::compute(
        candles,
        config.volume_period,
        config.volume_anomaly_multiplier,
    )?;
    let velocity = velocity::compute(
        candles,
        config.velocity_lookback,
        config.panic_threshold_pct,
    )?;

    Ok(SignalSnapshot {
        trend_direction: trend.direction,
        trend_strength: trend.strength(&config.trend),
        volatility_pct,
        volume_anomaly_strength: if volume.is_anomalous { volume.ratio } else { 0.0 },
        velocity_pct: velocity.change_pct,
        is_panic: velocity.is_panic,
    })
}
