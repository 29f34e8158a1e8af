//! Grid builder - expands a configuration into the full ladder of price levels

use log::info;

use crate::risk::RiskGate;

use super::config::{FeeModel, GridConfig};
use super::errors::{EngineError, EngineResult};
use super::types::{GridLevel, Side};

/// Build the full ladder for a configuration.
///
/// Long levels compound downward from the center, short levels compound
/// upward: `center * (1 -/+ spacing/100)^i`. Deterministic for identical
/// input. Fails with `RiskRejected(UnprofitableSpacing)` when the spacing
/// cannot clear round-trip costs.
pub fn build(
    config: &GridConfig,
    fees: &FeeModel,
    gate: &RiskGate,
    now: i64,
) -> EngineResult<Vec<GridLevel>> {
    build_starting_at(config, fees, gate, now, 0)
}

/// Build a ladder whose level ids start at `first_id`. Used on rebalance so
/// new levels never collide with ids carried forward from the old ladder.
pub fn build_starting_at(
    config: &GridConfig,
    fees: &FeeModel,
    gate: &RiskGate,
    now: i64,
    first_id: u32,
) -> EngineResult<Vec<GridLevel>> {
    config.validate()?;
    gate.validate_spacing(config, fees)
        .map_err(EngineError::RiskRejected)?;

    let long_count = config.level_count / 2;
    let short_count = config.level_count - long_count;
    let notional = config.notional_per_level();
    let step = config.spacing_pct / 100.0;

    let mut levels = Vec::with_capacity(config.level_count as usize);

    for i in 1..=long_count {
        let price = config.round_price(config.center_price * (1.0 - step).powi(i as i32));
        levels.push((price, Side::Long));
    }
    for i in 1..=short_count {
        let price = config.round_price(config.center_price * (1.0 + step).powi(i as i32));
        levels.push((price, Side::Short));
    }

    // Present highest price first; ids follow presentation order
    levels.sort_by(|a, b| b.0.total_cmp(&a.0));

    let levels: Vec<GridLevel> = levels
        .into_iter()
        .enumerate()
        .map(|(i, (price, side))| GridLevel::new(first_id + i as u32, price, side, notional, now))
        .collect();

    info!(
        "built {} levels around {} ({} long / {} short, {:.2} notional each)",
        levels.len(),
        config.center_price,
        long_count,
        short_count,
        notional
    );

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_default(config: &GridConfig) -> EngineResult<Vec<GridLevel>> {
        build(config, &FeeModel::default(), &RiskGate::default(), 0)
    }

    #[test]
    fn test_level_count_and_split() {
        let config = GridConfig::new("BTC", 50_000.0, 10, 1.0, 10_000.0, 5);
        let levels = build_default(&config).unwrap();

        assert_eq!(levels.len(), 10);
        let longs = levels.iter().filter(|l| l.side == Side::Long).count();
        let shorts = levels.iter().filter(|l| l.side == Side::Short).count();
        assert_eq!(longs, 5);
        assert_eq!(shorts, 5);
    }

    #[test]
    fn test_odd_count_remainder_goes_short() {
        let config = GridConfig::new("BTC", 50_000.0, 5, 1.0, 10_000.0, 5);
        let levels = build_default(&config).unwrap();

        assert_eq!(levels.len(), 5);
        assert_eq!(levels.iter().filter(|l| l.side == Side::Long).count(), 2);
        assert_eq!(levels.iter().filter(|l| l.side == Side::Short).count(), 3);
    }

    #[test]
    fn test_compounded_prices() {
        // Spec scenario: center 50000, 4 levels, 1% spacing
        let config = GridConfig::new("BTC", 50_000.0, 4, 1.0, 10_000.0, 5);
        let levels = build_default(&config).unwrap();

        let prices: Vec<f64> = levels.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![51_005.0, 50_500.0, 49_500.0, 49_005.0]);

        assert_eq!(levels[0].side, Side::Short);
        assert_eq!(levels[1].side, Side::Short);
        assert_eq!(levels[2].side, Side::Long);
        assert_eq!(levels[3].side, Side::Long);
    }

    #[test]
    fn test_sorted_descending_with_sequential_ids() {
        let config = GridConfig::new("BTC", 50_000.0, 8, 0.5, 10_000.0, 5);
        let levels = build_default(&config).unwrap();

        for pair in levels.windows(2) {
            assert!(pair[0].price > pair[1].price);
        }
        for (i, level) in levels.iter().enumerate() {
            assert_eq!(level.id, i as u32);
        }
    }

    #[test]
    fn test_distance_from_center_monotone_in_index() {
        let config = GridConfig::new("BTC", 50_000.0, 12, 1.0, 12_000.0, 5);
        let levels = build_default(&config).unwrap();

        for side in [Side::Long, Side::Short] {
            let distances: Vec<f64> = levels
                .iter()
                .filter(|l| l.side == side)
                .map(|l| l.distance_from(config.center_price))
                .collect();
            let mut sorted = distances.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            // Per side: further index = further from center, no duplicates
            assert_eq!(distances.len(), sorted.len());
            for pair in sorted.windows(2) {
                assert!(pair[0] < pair[1]);
            }
        }
    }

    #[test]
    fn test_fixed_notional_per_level() {
        let config = GridConfig::new("BTC", 50_000.0, 10, 1.0, 10_000.0, 5);
        let levels = build_default(&config).unwrap();
        for level in &levels {
            assert!((level.size_notional - 5_000.0).abs() < 1e-9);
            assert!((level.size_base - 5_000.0 / level.price).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unprofitable_spacing_rejected() {
        let mut config = GridConfig::new("BTC", 50_000.0, 10, 0.1, 10_000.0, 5);
        config.min_profit_after_fees_pct = 0.0;
        let fees = FeeModel {
            taker_fee_rate: 0.0005,
            slippage_bps: 1.0,
        };
        let err = build(&config, &fees, &RiskGate::default(), 0).unwrap_err();
        assert!(matches!(err, EngineError::RiskRejected(_)));
    }

    #[test]
    fn test_deterministic() {
        let config = GridConfig::new("BTC", 50_000.0, 10, 1.0, 10_000.0, 5);
        let a = build_default(&config).unwrap();
        let b = build_default(&config).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_first_id_offset() {
        let config = GridConfig::new("BTC", 50_000.0, 4, 1.0, 10_000.0, 5);
        let levels =
            build_starting_at(&config, &FeeModel::default(), &RiskGate::default(), 0, 100).unwrap();
        assert_eq!(levels[0].id, 100);
        assert_eq!(levels[3].id, 103);
    }
}
