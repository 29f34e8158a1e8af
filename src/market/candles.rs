//! Candle data model and the historical data provider contract

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::grid::errors::{EngineError, EngineResult};

/// A single OHLCV candle. Timestamps are milliseconds since epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Funding rate in effect over this candle, when the venue reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_rate: Option<f64>,
}

impl Candle {
    /// True range against the previous close
    pub fn true_range(&self, prev_close: f64) -> f64 {
        (self.high - self.low)
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }
}

/// Historical data provider. Gaps are the caller's problem; candles are
/// returned ordered by timestamp.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn load_candles(
        &self,
        symbol: &str,
        start_time: i64,
        end_time: i64,
    ) -> EngineResult<Vec<Candle>>;
}

/// Candle source backed by per-symbol JSON files (`<dir>/<SYMBOL>.json`,
/// an array of candles). Used by the backtest binary.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl CandleSource for JsonFileSource {
    async fn load_candles(
        &self,
        symbol: &str,
        start_time: i64,
        end_time: i64,
    ) -> EngineResult<Vec<Candle>> {
        let path = self.dir.join(format!("{symbol}.json"));
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            EngineError::StatePersistence(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut candles: Vec<Candle> = serde_json::from_str(&content)?;
        candles.retain(|c| c.timestamp >= start_time && c.timestamp <= end_time);
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_range_uses_gap_from_prev_close() {
        let candle = Candle {
            timestamp: 0,
            open: 105.0,
            high: 106.0,
            low: 104.0,
            close: 105.0,
            volume: 1.0,
            funding_rate: None,
        };
        // Gapped up from a close of 100: range is 6, not high-low of 2
        assert!((candle.true_range(100.0) - 6.0).abs() < 1e-9);
        assert!((candle.true_range(105.0) - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_json_file_source_filters_and_sorts() {
        let dir = std::env::temp_dir().join(format!("gridkit-candles-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let candles = vec![
            Candle {
                timestamp: 3_000,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
                funding_rate: None,
            },
            Candle {
                timestamp: 1_000,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
                funding_rate: Some(0.0001),
            },
            Candle {
                timestamp: 9_000,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
                funding_rate: None,
            },
        ];
        std::fs::write(
            dir.join("BTC.json"),
            serde_json::to_string(&candles).unwrap(),
        )
        .unwrap();

        let source = JsonFileSource::new(&dir);
        let loaded = source.load_candles("BTC", 0, 5_000).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].timestamp, 1_000);
        assert_eq!(loaded[1].timestamp, 3_000);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
