//! Position ledger - authoritative state for all levels and positions,
//! with JSON persistence

use std::path::Path;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::risk::{ExposureView, RiskGate};

use super::builder;
use super::config::{FeeModel, GridConfig};
use super::errors::{EngineError, EngineResult};
use super::types::{ClosedTrade, ExitReason, GridLevel, LevelStatus, Position, Side};

/// Authoritative state of a single symbol's grid.
///
/// The ledger owns every level and position and is the only place state
/// transitions are applied. It enforces the real-position window: at all
/// times between `min_real_positions` and `max_real_positions` levels are
/// capital-backed, and they are exactly the closest selectable levels to the
/// current price, split as evenly as possible between sides. Ties on
/// distance break toward the lowest level id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    symbol: String,
    total_capital: f64,
    min_real: u32,
    max_real: u32,
    center_price: f64,
    levels: Vec<GridLevel>,
    open_positions: Vec<Position>,
    closed_trades: Vec<ClosedTrade>,
    realized_pnl: f64,
    total_fees: f64,
    next_level_id: u32,
    #[serde(default)]
    next_position_seq: u64,
}

impl Ledger {
    /// Create a ledger from a config and a freshly built ladder
    pub fn new(config: &GridConfig, levels: Vec<GridLevel>) -> Self {
        let next_level_id = levels.iter().map(|l| l.id + 1).max().unwrap_or(0);
        Self {
            symbol: config.symbol.clone(),
            total_capital: config.total_capital,
            min_real: config.min_real_positions,
            max_real: config.max_real_positions,
            center_price: config.center_price,
            levels,
            open_positions: Vec::new(),
            closed_trades: Vec::new(),
            realized_pnl: 0.0,
            total_fees: 0.0,
            next_level_id,
            next_position_seq: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn center_price(&self) -> f64 {
        self.center_price
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open_positions
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    pub fn real_level_count(&self) -> usize {
        self.levels.iter().filter(|l| l.is_real).count()
    }

    /// Levels still eligible for selection (pending or open)
    pub fn selectable_count(&self) -> usize {
        self.levels.iter().filter(|l| l.is_selectable()).count()
    }

    /// Real, still-pending levels: the candidates for activation
    pub fn armed_levels(&self) -> impl Iterator<Item = &GridLevel> {
        self.levels
            .iter()
            .filter(|l| l.is_real && l.status == LevelStatus::Pending)
    }

    pub fn find_level(&self, level_id: u32) -> Option<&GridLevel> {
        self.levels.iter().find(|l| l.id == level_id)
    }

    fn find_level_mut(&mut self, level_id: u32) -> Option<&mut GridLevel> {
        self.levels.iter_mut().find(|l| l.id == level_id)
    }

    /// Recompute which levels are real (capital-backed) for the given price.
    ///
    /// Selection: per side, every level holding an open position is kept
    /// (never demoted while open), then the closest pending levels fill the
    /// side quota of `max_real / 2`. If one side cannot fill its quota the
    /// other side's next-closest candidates pad the total up to `min_real`.
    /// If the result would leave the window unsatisfiable the recompute is
    /// rejected and no flags change.
    pub fn recompute_real_status(&mut self, current_price: f64) -> EngineResult<()> {
        let per_side = (self.max_real / 2).max(1) as usize;

        let mut sorted: Vec<(f64, u32, Side, bool)> = self
            .levels
            .iter()
            .filter(|l| l.is_selectable())
            .map(|l| {
                (
                    l.distance_from(current_price),
                    l.id,
                    l.side,
                    l.status == LevelStatus::Open,
                )
            })
            .collect();
        // Deterministic tie-break: closest first, then lowest id
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut selected: Vec<u32> = Vec::with_capacity(self.max_real as usize);
        for side in [Side::Long, Side::Short] {
            // Open levels are forced in, regardless of distance
            let mut taken = 0;
            for &(_, id, s, open) in &sorted {
                if s == side && open {
                    selected.push(id);
                    taken += 1;
                }
            }
            for &(_, id, s, open) in &sorted {
                if taken >= per_side {
                    break;
                }
                if s == side && !open {
                    selected.push(id);
                    taken += 1;
                }
            }
        }

        // Pad from either side when one side ran out of candidates
        if selected.len() < self.min_real as usize {
            for &(_, id, _, _) in &sorted {
                if selected.len() >= self.min_real as usize {
                    break;
                }
                if !selected.contains(&id) {
                    selected.push(id);
                }
            }
        }

        let count = selected.len();
        if count < self.min_real as usize || count > self.max_real as usize {
            error!(
                "real-status recompute rejected for {}: {} candidates cannot satisfy window [{}, {}]",
                self.symbol, count, self.min_real, self.max_real
            );
            return Err(EngineError::Integrity(format!(
                "cannot select between {} and {} real levels (got {count})",
                self.min_real, self.max_real
            )));
        }

        for level in &mut self.levels {
            level.is_real = selected.contains(&level.id);
        }
        Ok(())
    }

    /// Open a position at a level. Only a real, pending level can open.
    #[allow(clippy::too_many_arguments)]
    pub fn open_level(
        &mut self,
        level_id: u32,
        fill_price: f64,
        stop_loss: f64,
        take_profit: f64,
        leverage: u32,
        now: i64,
    ) -> EngineResult<Position> {
        let symbol = self.symbol.clone();
        let level = self
            .find_level_mut(level_id)
            .ok_or(EngineError::LevelNotFound(level_id))?;

        if !level.status.can_advance_to(LevelStatus::Open) {
            return Err(EngineError::InvalidTransition(format!(
                "level {level_id} cannot open from {:?}",
                level.status
            )));
        }
        if !level.is_real {
            return Err(EngineError::InvalidTransition(format!(
                "level {level_id} is virtual and cannot be filled"
            )));
        }

        level.status = LevelStatus::Open;
        let side = level.side;
        let size = level.size_base;

        // Sequence-derived ids keep replays reproducible; random ids would
        // leak into serialized results
        self.next_position_seq += 1;
        let position = Position {
            id: Uuid::from_u128(self.next_position_seq as u128),
            symbol,
            side,
            entry_price: fill_price,
            size,
            leverage,
            stop_loss,
            take_profit,
            level_id,
            opened_at: now,
            closed_at: None,
            realized_pnl: None,
        };

        info!(
            "opened {} {:.6} @ {:.2} at level {} (sl {:.2} / tp {:.2})",
            position.side.as_str(),
            position.size,
            fill_price,
            level_id,
            stop_loss,
            take_profit
        );

        self.open_positions.push(position.clone());
        Ok(position)
    }

    /// Close an open position and retire its level
    pub fn close_position(
        &mut self,
        position_id: Uuid,
        exit_price: f64,
        reason: ExitReason,
        now: i64,
    ) -> EngineResult<ClosedTrade> {
        let idx = self
            .open_positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or(EngineError::PositionNotFound(position_id))?;

        let mut position = self.open_positions.remove(idx);
        let pnl = position.pnl_at(exit_price);
        position.closed_at = Some(now);
        position.realized_pnl = Some(pnl);

        let level_id = position.level_id;
        if let Some(level) = self.find_level_mut(level_id) {
            if level.status.can_advance_to(LevelStatus::Closed) {
                level.status = LevelStatus::Closed;
            } else {
                warn!(
                    "level {level_id} was {:?} while closing position {position_id}",
                    level.status
                );
            }
        }

        self.realized_pnl += pnl;
        let trade = ClosedTrade {
            position,
            exit_price,
            exit_reason: reason,
        };

        info!(
            "closed position {} @ {:.2} ({:?}, pnl {:+.2})",
            position_id, exit_price, reason, pnl
        );

        self.closed_trades.push(trade.clone());
        Ok(trade)
    }

    /// Record a fee charged by the clock (entry or exit fill)
    pub fn record_fee(&mut self, fee: f64) {
        self.total_fees += fee;
    }

    /// Shrink the stop distance of every open position by `factor` (0 < f < 1).
    /// Take-profit targets are left alone.
    pub fn tighten_stops(&mut self, factor: f64) {
        for position in &mut self.open_positions {
            let distance = (position.entry_price - position.stop_loss) * factor;
            position.stop_loss = position.entry_price - distance;
        }
    }

    /// Rebuild the pending tier of the ladder around a new center price.
    ///
    /// Open positions (and their levels) are carried forward untouched;
    /// prior pending levels are discarded. Returns the number of carried
    /// positions.
    pub fn rebalance(
        &mut self,
        config: &GridConfig,
        fees: &FeeModel,
        gate: &RiskGate,
        new_center: f64,
        now: i64,
    ) -> EngineResult<usize> {
        let mut recentred = config.clone();
        recentred.center_price = new_center;

        let fresh = builder::build_starting_at(&recentred, fees, gate, now, self.next_level_id)?;
        self.next_level_id += fresh.len() as u32;

        let old_center = self.center_price;
        self.levels.retain(|l| l.status == LevelStatus::Open);
        let carried = self.levels.len();
        self.levels.extend(fresh);
        self.center_price = new_center;

        self.recompute_real_status(new_center)?;

        info!(
            "rebalanced {} from {:.2} to {:.2}, carried {} open positions",
            self.symbol, old_center, new_center, carried
        );

        Ok(carried)
    }

    /// Sum of unrealized PnL over open positions at the given price
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.open_positions.iter().map(|p| p.pnl_at(price)).sum()
    }

    /// Account equity: capital plus realized results net of fees, plus
    /// open-position mark-to-market
    pub fn equity(&self, price: f64) -> f64 {
        self.total_capital + self.realized_pnl - self.total_fees + self.unrealized_pnl(price)
    }

    /// Current exposure for the risk gate
    pub fn exposure(&self) -> ExposureView {
        let mut view = ExposureView::default();
        for p in &self.open_positions {
            match p.side {
                Side::Long => view.long_notional += p.notional(),
                Side::Short => view.short_notional += p.notional(),
            }
        }
        view
    }

    /// Cross-check the running PnL accumulator against the trade history.
    /// A mismatch means a transition was applied outside the ledger.
    pub fn check_integrity(&self) -> EngineResult<()> {
        let from_trades: f64 = self.closed_trades.iter().map(|t| t.pnl()).sum();
        if (from_trades - self.realized_pnl).abs() > 1e-6 {
            return Err(EngineError::Integrity(format!(
                "realized pnl accumulator {:.6} != trade history sum {:.6}",
                self.realized_pnl, from_trades
            )));
        }
        Ok(())
    }

    /// Validate a reloaded ledger against the config it will run with
    pub fn validate_against_config(&self, config: &GridConfig) -> EngineResult<()> {
        if self.symbol != config.symbol {
            return Err(EngineError::InvalidConfig(format!(
                "ledger symbol '{}' does not match config symbol '{}'",
                self.symbol, config.symbol
            )));
        }
        if (self.total_capital - config.total_capital).abs() > 1e-6 {
            return Err(EngineError::InvalidConfig(
                "ledger capital does not match config".into(),
            ));
        }
        Ok(())
    }

    /// Load a ledger snapshot from a file
    pub fn load_from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let ledger: Self = serde_json::from_str(&content)?;
        Ok(ledger)
    }

    /// Save the ledger atomically (write to temp, then rename)
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let temp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}
