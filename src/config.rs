//! Application-level settings: run mode, data paths, per-symbol grids.
//!
//! Loaded from a config file with `APP_`-prefixed environment overrides,
//! e.g. `APP_LOG__LEVEL=debug` or `APP_DATA_DIR=/data/candles`.

use config::{Config, File};
pub use config::ConfigError;
use serde::Deserialize;

use crate::engine::OracleSettings;
use crate::grid::config::{FeeModel, GridConfig};
use crate::risk::RiskLimits;
use crate::signal::SignalConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Live,
    Backtest,
}

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub mode: RunMode,
    /// Directory of per-symbol candle JSON files (backtest mode)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Directory backtest results and ledger snapshots are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// One grid per symbol; each runs on its own engine
    pub grids: Vec<GridConfig>,
    #[serde(default)]
    pub fees: FeeModel,
    #[serde(default)]
    pub risk: RiskLimits,
    #[serde(default)]
    pub signals: SignalConfig,
    #[serde(default)]
    pub oracle: OracleSettings,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_output_dir() -> String {
    "output".to_string()
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from a configuration file, with environment overrides
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            // Environment variables override the file,
            // e.g. APP_LOG__LEVEL=debug
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_json_file() {
        let dir = std::env::temp_dir().join(format!("gridkit-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "mode": "backtest",
                "grids": [{
                    "symbol": "BTC",
                    "center_price": 50000.0,
                    "level_count": 10,
                    "spacing_pct": 1.0,
                    "total_capital": 10000.0,
                    "leverage": 5
                }]
            }"#,
        )
        .unwrap();

        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.mode, RunMode::Backtest);
        assert_eq!(settings.grids.len(), 1);
        assert_eq!(settings.grids[0].symbol, "BTC");
        // Defaults fill in everything unspecified
        assert_eq!(settings.data_dir, "data");
        assert_eq!(settings.log.level, "info");
        assert!((settings.fees.taker_fee_rate - 0.0005).abs() < 1e-12);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
