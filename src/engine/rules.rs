//! Decision hierarchy as an explicit ordered rule list.
//!
//! Each rule is a pure predicate-to-action function over the evaluation
//! context; the first rule that fires wins. The order is the contract:
//! panic, then volume anomaly, then trend-biased level activation, then
//! drift-triggered rebuild with volatility-scaled spacing.

use crate::grid::config::GridConfig;
use crate::grid::types::Side;
use crate::signal::{SignalSnapshot, TrendDirection};

/// Action proposed by one evaluation pass
#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// Reduce to the minimum real positions, biased toward the panic direction
    FlattenOrCluster { bias: Side },
    /// Shrink stop distances and refuse new positions this cycle
    TightenRisk,
    /// Open the position at a touched, real, pending level
    ActivateLevel { level_id: u32, trend_justified: bool },
    /// Regenerate the pending ladder around the current price
    Rebuild { spacing_pct: f64 },
    Hold,
}

/// A real pending level whose price the current candle crossed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchedLevel {
    pub level_id: u32,
    pub side: Side,
    /// |level price - current price|
    pub distance: f64,
}

/// Everything a rule may read. Borrowed from the engine for one pass.
#[derive(Debug)]
pub struct RuleCtx<'a> {
    pub signals: &'a SignalSnapshot,
    pub config: &'a GridConfig,
    pub price: f64,
    /// |price - grid center| as a percentage of the center
    pub drift_pct: f64,
    pub touched: &'a [TouchedLevel],
    /// Levels still pending or open; closed levels are spent
    pub selectable_levels: usize,
}

/// Named rule: predicate and action in one function
pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&RuleCtx) -> Option<EngineAction>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

fn trend_side(direction: TrendDirection) -> Side {
    match direction {
        TrendDirection::Up => Side::Long,
        TrendDirection::Down => Side::Short,
    }
}

fn panic_rule(ctx: &RuleCtx) -> Option<EngineAction> {
    if !ctx.signals.is_panic {
        return None;
    }
    // Cluster toward the direction of the move: in a crash keep shorts
    let bias = if ctx.signals.velocity_pct < 0.0 {
        Side::Short
    } else {
        Side::Long
    };
    Some(EngineAction::FlattenOrCluster { bias })
}

fn volume_anomaly_rule(ctx: &RuleCtx) -> Option<EngineAction> {
    if ctx.signals.volume_anomaly_strength > 0.0 {
        Some(EngineAction::TightenRisk)
    } else {
        None
    }
}

/// Activate the closest touched armed level; when two candidates are equally
/// close, prefer the one aligned with the trend direction.
fn activation_rule(ctx: &RuleCtx) -> Option<EngineAction> {
    let preferred = trend_side(ctx.signals.trend_direction);
    let best = ctx.touched.iter().min_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| (b.side == preferred).cmp(&(a.side == preferred)))
            .then(a.level_id.cmp(&b.level_id))
    })?;
    Some(EngineAction::ActivateLevel {
        level_id: best.level_id,
        trend_justified: best.side == preferred,
    })
}

/// Drift beyond the threshold triggers a rebuild; the new spacing widens
/// proportionally with volatility, up to 3x the configured base.
fn drift_rebuild_rule(ctx: &RuleCtx) -> Option<EngineAction> {
    if ctx.drift_pct <= ctx.config.rebalance_threshold_pct {
        return None;
    }
    let scale = (ctx.signals.volatility_pct / 1.0).clamp(1.0, 3.0);
    Some(EngineAction::Rebuild {
        spacing_pct: ctx.config.spacing_pct * scale,
    })
}

/// Most of the ladder has been spent (levels fill and retire); regenerate
/// around the current price so the real-position window stays satisfiable.
fn ladder_depleted_rule(ctx: &RuleCtx) -> Option<EngineAction> {
    if ctx.selectable_levels > ctx.config.max_real_positions as usize {
        return None;
    }
    Some(EngineAction::Rebuild {
        spacing_pct: ctx.config.spacing_pct,
    })
}

/// The fixed hierarchy, highest priority first
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "velocity_panic",
            applies: panic_rule,
        },
        Rule {
            name: "volume_anomaly",
            applies: volume_anomaly_rule,
        },
        Rule {
            name: "trend_biased_activation",
            applies: activation_rule,
        },
        Rule {
            name: "drift_rebuild",
            applies: drift_rebuild_rule,
        },
        Rule {
            name: "ladder_depleted",
            applies: ladder_depleted_rule,
        },
    ]
}

/// First match wins; no match is a Hold
pub fn decide(rules: &[Rule], ctx: &RuleCtx) -> (&'static str, EngineAction) {
    for rule in rules {
        if let Some(action) = (rule.applies)(ctx) {
            return (rule.name, action);
        }
    }
    ("hold", EngineAction::Hold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_signals() -> SignalSnapshot {
        SignalSnapshot {
            trend_direction: TrendDirection::Up,
            trend_strength: 0.3,
            volatility_pct: 1.0,
            volume_anomaly_strength: 0.0,
            velocity_pct: 0.2,
            is_panic: false,
        }
    }

    fn config() -> GridConfig {
        GridConfig::new("BTC", 50_000.0, 10, 1.0, 10_000.0, 5)
    }

    fn ctx<'a>(
        signals: &'a SignalSnapshot,
        config: &'a GridConfig,
        drift_pct: f64,
        touched: &'a [TouchedLevel],
    ) -> RuleCtx<'a> {
        RuleCtx {
            signals,
            config,
            price: 50_000.0,
            drift_pct,
            touched,
            selectable_levels: 10,
        }
    }

    #[test]
    fn test_hold_when_nothing_fires() {
        let signals = quiet_signals();
        let config = config();
        let (name, action) = decide(&default_rules(), &ctx(&signals, &config, 0.1, &[]));
        assert_eq!(name, "hold");
        assert_eq!(action, EngineAction::Hold);
    }

    #[test]
    fn test_panic_overrides_everything() {
        let mut signals = quiet_signals();
        signals.is_panic = true;
        signals.velocity_pct = -7.0;
        signals.volume_anomaly_strength = 3.0;
        let config = config();
        let touched = [TouchedLevel {
            level_id: 4,
            side: Side::Long,
            distance: 10.0,
        }];

        let (name, action) = decide(&default_rules(), &ctx(&signals, &config, 8.0, &touched));
        assert_eq!(name, "velocity_panic");
        assert_eq!(action, EngineAction::FlattenOrCluster { bias: Side::Short });
    }

    #[test]
    fn test_panic_bias_follows_move_direction() {
        let mut signals = quiet_signals();
        signals.is_panic = true;
        signals.velocity_pct = 6.0;
        let config = config();
        let (_, action) = decide(&default_rules(), &ctx(&signals, &config, 0.0, &[]));
        assert_eq!(action, EngineAction::FlattenOrCluster { bias: Side::Long });
    }

    #[test]
    fn test_volume_anomaly_beats_activation() {
        let mut signals = quiet_signals();
        signals.volume_anomaly_strength = 2.5;
        let config = config();
        let touched = [TouchedLevel {
            level_id: 4,
            side: Side::Long,
            distance: 10.0,
        }];

        let (name, action) = decide(&default_rules(), &ctx(&signals, &config, 0.0, &touched));
        assert_eq!(name, "volume_anomaly");
        assert_eq!(action, EngineAction::TightenRisk);
    }

    #[test]
    fn test_activation_prefers_trend_side_on_tie() {
        let signals = quiet_signals(); // trend up
        let config = config();
        let touched = [
            TouchedLevel {
                level_id: 3,
                side: Side::Short,
                distance: 50.0,
            },
            TouchedLevel {
                level_id: 6,
                side: Side::Long,
                distance: 50.0,
            },
        ];

        let (_, action) = decide(&default_rules(), &ctx(&signals, &config, 0.0, &touched));
        assert_eq!(
            action,
            EngineAction::ActivateLevel {
                level_id: 6,
                trend_justified: true
            }
        );
    }

    #[test]
    fn test_activation_closest_wins_regardless_of_trend() {
        let signals = quiet_signals(); // trend up
        let config = config();
        let touched = [
            TouchedLevel {
                level_id: 3,
                side: Side::Short,
                distance: 20.0,
            },
            TouchedLevel {
                level_id: 6,
                side: Side::Long,
                distance: 50.0,
            },
        ];

        let (_, action) = decide(&default_rules(), &ctx(&signals, &config, 0.0, &touched));
        assert_eq!(
            action,
            EngineAction::ActivateLevel {
                level_id: 3,
                trend_justified: false
            }
        );
    }

    #[test]
    fn test_drift_rebuild_scales_spacing_with_volatility() {
        let mut signals = quiet_signals();
        signals.volatility_pct = 2.0;
        let config = config();

        let (name, action) = decide(&default_rules(), &ctx(&signals, &config, 6.0, &[]));
        assert_eq!(name, "drift_rebuild");
        assert_eq!(action, EngineAction::Rebuild { spacing_pct: 2.0 });

        // Scale is capped at 3x
        signals.volatility_pct = 10.0;
        let (_, action) = decide(&default_rules(), &ctx(&signals, &config, 6.0, &[]));
        assert_eq!(action, EngineAction::Rebuild { spacing_pct: 3.0 });
    }

    #[test]
    fn test_no_rebuild_below_threshold() {
        let signals = quiet_signals();
        let config = config();
        let (_, action) = decide(&default_rules(), &ctx(&signals, &config, 4.9, &[]));
        assert_eq!(action, EngineAction::Hold);
    }

    #[test]
    fn test_depleted_ladder_regenerates() {
        let signals = quiet_signals();
        let config = config();
        let mut context = ctx(&signals, &config, 0.0, &[]);
        context.selectable_levels = 4;

        let (name, action) = decide(&default_rules(), &context);
        assert_eq!(name, "ladder_depleted");
        assert_eq!(action, EngineAction::Rebuild { spacing_pct: 1.0 });
    }
}
