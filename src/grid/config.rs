//! Strategy configuration for a single symbol's grid

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{EngineError, EngineResult};

/// Configuration keys that existed in earlier revisions and are no longer
/// honored. Loading a config that still carries one of these fails instead of
/// silently ignoring it.
const DEPRECATED_KEYS: &[&str] = &["aggressiveness", "aggressiveness_level", "ai_mode"];

/// Fee and slippage model applied to every simulated fill
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeModel {
    /// Taker fee rate per fill (e.g. 0.0005 = 0.05%)
    #[serde(default = "default_taker_fee_rate")]
    pub taker_fee_rate: f64,
    /// Slippage per fill in basis points
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: f64,
}

fn default_taker_fee_rate() -> f64 {
    0.0005
}

fn default_slippage_bps() -> f64 {
    1.0
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            taker_fee_rate: default_taker_fee_rate(),
            slippage_bps: default_slippage_bps(),
        }
    }
}

impl FeeModel {
    /// Full round-trip cost (entry + exit fee and slippage) as a percentage
    pub fn round_trip_cost_pct(&self) -> f64 {
        self.taker_fee_rate * 2.0 * 100.0 + self.slippage_bps * 2.0 / 100.0
    }

    /// Fee charged on a fill of the given notional
    pub fn fee_for(&self, notional: f64) -> f64 {
        notional * self.taker_fee_rate
    }

    /// Adjust a fill price for slippage. Buys fill worse (higher), sells
    /// fill worse (lower).
    pub fn slip(&self, price: f64, is_buy: bool) -> f64 {
        let factor = self.slippage_bps / 10_000.0;
        if is_buy {
            price * (1.0 + factor)
        } else {
            price * (1.0 - factor)
        }
    }
}

/// Grid strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    /// Symbol to trade (e.g. "BTC", "ETH")
    pub symbol: String,

    /// Price the ladder is centered on
    pub center_price: f64,

    /// Total number of grid levels (long + short)
    pub level_count: u32,

    /// Spacing between adjacent levels, percent of the previous level
    pub spacing_pct: f64,

    /// Capital allocated to the whole grid, in quote currency
    pub total_capital: f64,

    /// Leverage applied to every level
    pub leverage: u32,

    /// Lower bound of the real-position window
    #[serde(default = "default_min_real")]
    pub min_real_positions: u32,

    /// Upper bound of the real-position window
    #[serde(default = "default_max_real")]
    pub max_real_positions: u32,

    /// Price drift from center (percent) that triggers a rebalance
    #[serde(default = "default_rebalance_threshold")]
    pub rebalance_threshold_pct: f64,

    /// Required margin of grid spacing over round-trip costs, percent
    #[serde(default = "default_min_profit")]
    pub min_profit_after_fees_pct: f64,

    /// Decimal places for level prices
    #[serde(default = "default_price_decimals")]
    pub price_decimals: u32,

    /// Scale stop/take-profit distances with volatility
    #[serde(default)]
    pub use_dynamic_sltp: bool,

    /// Stop-loss distance from entry, percent
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,

    /// Take-profit distance from entry, percent
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
}

fn default_min_real() -> u32 {
    2
}

fn default_max_real() -> u32 {
    4
}

fn default_rebalance_threshold() -> f64 {
    5.0
}

fn default_min_profit() -> f64 {
    0.05
}

fn default_price_decimals() -> u32 {
    2
}

fn default_stop_loss_pct() -> f64 {
    3.0
}

fn default_take_profit_pct() -> f64 {
    3.0
}

impl GridConfig {
    /// Create a configuration with required parameters and defaults elsewhere
    pub fn new(
        symbol: impl Into<String>,
        center_price: f64,
        level_count: u32,
        spacing_pct: f64,
        total_capital: f64,
        leverage: u32,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            center_price,
            level_count,
            spacing_pct,
            total_capital,
            leverage,
            min_real_positions: default_min_real(),
            max_real_positions: default_max_real(),
            rebalance_threshold_pct: default_rebalance_threshold(),
            min_profit_after_fees_pct: default_min_profit(),
            price_decimals: default_price_decimals(),
            use_dynamic_sltp: false,
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
        }
    }

    /// Builder: set the real-position window
    pub fn with_real_window(mut self, min: u32, max: u32) -> Self {
        self.min_real_positions = min;
        self.max_real_positions = max;
        self
    }

    /// Builder: set the rebalance drift threshold
    pub fn with_rebalance_threshold(mut self, pct: f64) -> Self {
        self.rebalance_threshold_pct = pct;
        self
    }

    /// Builder: set stop-loss / take-profit distances
    pub fn with_sltp(mut self, stop_loss_pct: f64, take_profit_pct: f64) -> Self {
        self.stop_loss_pct = stop_loss_pct;
        self.take_profit_pct = take_profit_pct;
        self
    }

    /// Builder: enable volatility-scaled stop/take-profit distances
    pub fn with_dynamic_sltp(mut self) -> Self {
        self.use_dynamic_sltp = true;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.symbol.is_empty() {
            return Err(EngineError::InvalidConfig("symbol cannot be empty".into()));
        }
        if self.center_price <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "center_price must be positive".into(),
            ));
        }
        if self.level_count < 2 {
            return Err(EngineError::InvalidConfig(
                "level_count must be at least 2".into(),
            ));
        }
        if self.spacing_pct <= 0.0 || self.spacing_pct >= 100.0 {
            return Err(EngineError::InvalidConfig(
                "spacing_pct must be in (0, 100)".into(),
            ));
        }
        if self.total_capital <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "total_capital must be positive".into(),
            ));
        }
        if self.leverage == 0 || self.leverage > 100 {
            return Err(EngineError::InvalidConfig(
                "leverage must be between 1 and 100".into(),
            ));
        }
        if self.min_real_positions < 2 {
            return Err(EngineError::InvalidConfig(
                "min_real_positions must be at least 2".into(),
            ));
        }
        if self.max_real_positions < self.min_real_positions || self.max_real_positions > 4 {
            return Err(EngineError::InvalidConfig(
                "max_real_positions must be within [min_real_positions, 4]".into(),
            ));
        }
        if self.level_count < self.min_real_positions {
            return Err(EngineError::InvalidConfig(
                "level_count must cover min_real_positions".into(),
            ));
        }
        if self.stop_loss_pct <= 0.0 || self.take_profit_pct <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "stop_loss_pct and take_profit_pct must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Notional allocated per level, fixed at grid-build time
    pub fn notional_per_level(&self) -> f64 {
        self.total_capital / self.level_count as f64 * self.leverage as f64
    }

    /// Round a price to the configured precision
    pub fn round_price(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.price_decimals as i32);
        (price * factor).round() / factor
    }

    /// Deserialize from a JSON value, rejecting deprecated or unknown keys.
    ///
    /// Earlier revisions of the strategy carried ad-hoc tuning fields; a
    /// config file still containing them is stale and must be migrated by the
    /// operator, not silently reinterpreted.
    pub fn from_json_value(value: Value) -> EngineResult<Self> {
        if let Value::Object(ref map) = value {
            for key in DEPRECATED_KEYS {
                if map.contains_key(*key) {
                    return Err(EngineError::InvalidConfig(format!(
                        "deprecated config key '{key}': remove it before loading"
                    )));
                }
            }
        }
        // deny_unknown_fields covers keys we never knew about
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a JSON file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        Self::from_json_value(value)
    }

    /// Save config to a JSON file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> EngineResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
