//! Risk gate - validates every proposed state transition before the ledger
//! applies it

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::config::{FeeModel, GridConfig};
use crate::grid::types::Side;

/// Why the risk gate rejected an action
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("leverage {requested}x exceeds tier cap {cap}x for {symbol}")]
    LeverageExceedsTier {
        symbol: String,
        requested: u32,
        cap: u32,
    },

    #[error("capital utilization {utilization:.1}% would exceed {max:.1}%")]
    CapitalUtilization { utilization: f64, max: f64 },

    #[error("position bias {bias:.1}% would exceed {max:.1}%")]
    PositionBias { bias: f64, max: f64 },

    #[error("notional {notional:.2} below minimum {min:.2}")]
    BelowMinimumSize { notional: f64, min: f64 },

    #[error("spacing {spacing:.3}% does not clear round-trip cost {required:.3}%")]
    UnprofitableSpacing { spacing: f64, required: f64 },
}

lazy_static! {
    /// Symbol-tiered leverage caps. Symbols not listed fall back to
    /// `DEFAULT_LEVERAGE_CAP`.
    static ref LEVERAGE_TIERS: HashMap<&'static str, u32> = {
        let mut m = HashMap::new();
        m.insert("BTC", 50);
        m.insert("ETH", 50);
        m.insert("SOL", 25);
        m.insert("AVAX", 25);
        m.insert("DOGE", 20);
        m
    };
}

const DEFAULT_LEVERAGE_CAP: u32 = 10;

/// Maximum leverage allowed for a symbol
pub fn max_leverage_for(symbol: &str) -> u32 {
    LEVERAGE_TIERS
        .get(symbol)
        .copied()
        .unwrap_or(DEFAULT_LEVERAGE_CAP)
}

/// Portfolio-level risk limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum share of capital that may be deployed (active notional /
    /// total capital / leverage)
    #[serde(default = "default_max_utilization")]
    pub max_capital_utilization: f64,
    /// Maximum long/short notional imbalance, percent of gross exposure
    #[serde(default = "default_max_bias")]
    pub max_position_bias_pct: f64,
    /// Smallest position notional worth opening, quote currency
    #[serde(default = "default_min_notional")]
    pub min_position_notional: f64,
}

fn default_max_utilization() -> f64 {
    0.95
}

fn default_max_bias() -> f64 {
    60.0
}

fn default_min_notional() -> f64 {
    10.0
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_capital_utilization: default_max_utilization(),
            max_position_bias_pct: default_max_bias(),
            min_position_notional: default_min_notional(),
        }
    }
}

/// Exposure snapshot the gate evaluates against, derived from the ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct ExposureView {
    /// Sum of open long notionals
    pub long_notional: f64,
    /// Sum of open short notionals
    pub short_notional: f64,
}

impl ExposureView {
    pub fn gross(&self) -> f64 {
        self.long_notional + self.short_notional
    }

    /// Long/short imbalance as a percentage of gross exposure
    pub fn bias_pct(&self) -> f64 {
        let gross = self.gross();
        if gross <= 0.0 {
            return 0.0;
        }
        (self.long_notional - self.short_notional).abs() / gross * 100.0
    }

    fn with_added(&self, side: Side, notional: f64) -> Self {
        match side {
            Side::Long => Self {
                long_notional: self.long_notional + notional,
                ..*self
            },
            Side::Short => Self {
                short_notional: self.short_notional + notional,
                ..*self
            },
        }
    }
}

/// Risk gate. Stateless; every check reads the exposure view passed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskGate {
    pub limits: RiskLimits,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    /// Validate opening a new position of `notional` on `side`.
    ///
    /// Rules run in order; the first failing rule wins.
    pub fn validate_open(
        &self,
        config: &GridConfig,
        exposure: &ExposureView,
        side: Side,
        notional: f64,
        trend_justified: bool,
    ) -> Result<(), RejectReason> {
        let cap = max_leverage_for(&config.symbol);
        if config.leverage > cap {
            return Err(RejectReason::LeverageExceedsTier {
                symbol: config.symbol.clone(),
                requested: config.leverage,
                cap,
            });
        }

        let after = exposure.with_added(side, notional);
        let deployed_capital = after.gross() / config.leverage as f64;
        let utilization = deployed_capital / config.total_capital;
        if utilization > self.limits.max_capital_utilization {
            return Err(RejectReason::CapitalUtilization {
                utilization: utilization * 100.0,
                max: self.limits.max_capital_utilization * 100.0,
            });
        }

        // Bias only applies once there is prior exposure; a lone position is
        // always 100% biased
        if exposure.gross() > 0.0 {
            let bias = after.bias_pct();
            if bias > self.limits.max_position_bias_pct && !trend_justified {
                return Err(RejectReason::PositionBias {
                    bias,
                    max: self.limits.max_position_bias_pct,
                });
            }
        }

        if notional < self.limits.min_position_notional {
            return Err(RejectReason::BelowMinimumSize {
                notional,
                min: self.limits.min_position_notional,
            });
        }

        Ok(())
    }

    /// Fee-adjusted profitability check, run at grid-build and rebalance time
    /// only. The projected spacing must clear round-trip fee + slippage cost
    /// by at least `min_profit_after_fees_pct`.
    pub fn validate_spacing(
        &self,
        config: &GridConfig,
        fees: &FeeModel,
    ) -> Result<(), RejectReason> {
        let required = fees.round_trip_cost_pct() + config.min_profit_after_fees_pct;
        if config.spacing_pct < required {
            return Err(RejectReason::UnprofitableSpacing {
                spacing: config.spacing_pct,
                required,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GridConfig {
        GridConfig::new("BTC", 50_000.0, 10, 1.0, 10_000.0, 5)
    }

    #[test]
    fn test_leverage_tiers() {
        assert_eq!(max_leverage_for("BTC"), 50);
        assert_eq!(max_leverage_for("SOL"), 25);
        assert_eq!(max_leverage_for("UNLISTED"), DEFAULT_LEVERAGE_CAP);
    }

    #[test]
    fn test_leverage_cap_rejected_first() {
        let gate = RiskGate::default();
        let mut config = config();
        config.symbol = "PEPE".into(); // unlisted, cap 10
        config.leverage = 25;

        let err = gate
            .validate_open(&config, &ExposureView::default(), Side::Long, 5.0, false)
            .unwrap_err();
        // Leverage rule fires before the (also failing) minimum-size rule
        assert!(matches!(err, RejectReason::LeverageExceedsTier { .. }));
    }

    #[test]
    fn test_capital_utilization() {
        let gate = RiskGate::default();
        let config = config();
        // 10_000 capital at 5x: deployed capital cap is 9_500
        let exposure = ExposureView {
            long_notional: 45_000.0,
            short_notional: 0.0,
        };
        // adding 5_000 notional -> 50_000 gross -> 10_000 deployed > 9_500 cap
        let err = gate
            .validate_open(&config, &exposure, Side::Long, 5_000.0, true)
            .unwrap_err();
        assert!(matches!(err, RejectReason::CapitalUtilization { .. }));
    }

    #[test]
    fn test_bias_rejected_unless_trend_justified() {
        let gate = RiskGate::default();
        let config = config();
        let exposure = ExposureView {
            long_notional: 9_000.0,
            short_notional: 1_000.0,
        };
        let err = gate
            .validate_open(&config, &exposure, Side::Long, 1_000.0, false)
            .unwrap_err();
        assert!(matches!(err, RejectReason::PositionBias { .. }));

        // Same action passes when the decision engine marked it trend-justified
        assert!(gate
            .validate_open(&config, &exposure, Side::Long, 1_000.0, true)
            .is_ok());
    }

    #[test]
    fn test_first_position_exempt_from_bias() {
        let gate = RiskGate::default();
        // No prior exposure: a single 100%-biased position is allowed
        assert!(gate
            .validate_open(&config(), &ExposureView::default(), Side::Long, 5_000.0, false)
            .is_ok());
    }

    #[test]
    fn test_minimum_size() {
        let gate = RiskGate::default();
        let err = gate
            .validate_open(&config(), &ExposureView::default(), Side::Long, 5.0, false)
            .unwrap_err();
        assert!(matches!(err, RejectReason::BelowMinimumSize { .. }));
    }

    #[test]
    fn test_unprofitable_spacing() {
        let gate = RiskGate::default();
        let mut config = config();
        config.spacing_pct = 0.1;
        config.min_profit_after_fees_pct = 0.0;
        // 0.05% taker + 1bp slippage per side = 0.12% round trip > 0.1% spacing
        let fees = FeeModel {
            taker_fee_rate: 0.0005,
            slippage_bps: 1.0,
        };
        let err = gate.validate_spacing(&config, &fees).unwrap_err();
        assert!(matches!(err, RejectReason::UnprofitableSpacing { .. }));

        config.spacing_pct = 0.2;
        assert!(gate.validate_spacing(&config, &fees).is_ok());
    }
}
