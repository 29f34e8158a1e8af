//! Decision engine - consumes signals and ledger state, applies the fixed
//! priority hierarchy, and vets every proposed action through the risk gate.
//! The same code path drives live evaluation and backtest replay.

pub mod oracle;
pub mod rules;

use log::{debug, warn};

use crate::grid::builder;
use crate::grid::config::{FeeModel, GridConfig};
use crate::grid::errors::{EngineError, EngineResult};
use crate::grid::ledger::Ledger;
use crate::grid::types::{ClosedTrade, EventSink, ExitReason, GridEvent, Position, Side};
use crate::market::Candle;
use crate::risk::RiskGate;
use crate::signal::{self, SignalConfig, SignalSnapshot};

pub use oracle::{DecisionOracle, MarketReport, OracleAction, OracleAdvice, OracleSettings};
pub use rules::{EngineAction, Rule, RuleCtx, TouchedLevel};

/// Stop distances shrink to half on a volume anomaly
const TIGHTEN_FACTOR: f64 = 0.5;

/// Outcome of one evaluation pass, before fills are applied
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Name of the rule that fired, or "hold"
    pub rule: &'static str,
    pub action: EngineAction,
    /// None while history is still too short for the signal library
    pub signals: Option<SignalSnapshot>,
}

impl Decision {
    fn hold(rule: &'static str, signals: Option<SignalSnapshot>) -> Self {
        Self {
            rule,
            action: EngineAction::Hold,
            signals,
        }
    }
}

/// One symbol's engine: config, ledger, rules and risk gate wired together.
/// Engines share nothing; parallel symbols each own one.
pub struct Engine {
    config: GridConfig,
    fees: FeeModel,
    gate: RiskGate,
    signal_config: SignalConfig,
    rules: Vec<Rule>,
    ledger: Ledger,
    sink: Box<dyn EventSink>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Build a fresh engine: expand the ladder and select the initial real set
    pub fn new(
        config: GridConfig,
        fees: FeeModel,
        gate: RiskGate,
        signal_config: SignalConfig,
        sink: Box<dyn EventSink>,
    ) -> EngineResult<Self> {
        let levels = builder::build(&config, &fees, &gate, 0)?;
        let mut ledger = Ledger::new(&config, levels);
        ledger.recompute_real_status(config.center_price)?;
        Ok(Self {
            config,
            fees,
            gate,
            signal_config,
            rules: rules::default_rules(),
            ledger,
            sink,
        })
    }

    /// Resume from a persisted ledger instead of building a fresh ladder
    pub fn resume(
        config: GridConfig,
        fees: FeeModel,
        gate: RiskGate,
        signal_config: SignalConfig,
        sink: Box<dyn EventSink>,
        ledger: Ledger,
    ) -> EngineResult<Self> {
        ledger.validate_against_config(&config)?;
        Ok(Self {
            config,
            fees,
            gate,
            signal_config,
            rules: rules::default_rules(),
            ledger,
            sink,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn fees(&self) -> &FeeModel {
        &self.fees
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn equity(&self, price: f64) -> f64 {
        self.ledger.equity(price)
    }

    /// Market context for the decision oracle
    pub fn report(&self, price: f64, signals: SignalSnapshot) -> MarketReport {
        MarketReport {
            symbol: self.config.symbol.clone(),
            price,
            equity: self.ledger.equity(price),
            open_position_count: self.ledger.open_positions().len(),
            signals,
        }
    }

    /// One evaluation pass: integrity check, real/virtual reselection,
    /// signals, rule hierarchy, risk gate. Returns the vetted decision;
    /// the caller (backtest or live runner) applies fills.
    pub fn decide(&mut self, candles: &[Candle], now: i64) -> EngineResult<Decision> {
        let candle = candles.last().ok_or(EngineError::InsufficientData {
            required: 1,
            got: 0,
        })?;
        let price = candle.close;

        self.ledger.check_integrity()?;
        self.ledger.recompute_real_status(price)?;

        let signals = match signal::compute_snapshot(candles, &self.signal_config) {
            Ok(snapshot) => snapshot,
            Err(EngineError::InsufficientData { required, got }) => {
                debug!(
                    "{}: {got}/{required} candles, skipping evaluation",
                    self.config.symbol
                );
                return Ok(Decision::hold("insufficient_data", None));
            }
            Err(err) => return Err(err),
        };

        let touched: Vec<TouchedLevel> = self
            .ledger
            .armed_levels()
            .filter(|l| l.price >= candle.low && l.price <= candle.high)
            .map(|l| TouchedLevel {
                level_id: l.id,
                side: l.side,
                distance: l.distance_from(price),
            })
            .collect();

        let center = self.ledger.center_price();
        let ctx = RuleCtx {
            signals: &signals,
            config: &self.config,
            price,
            drift_pct: (price - center).abs() / center * 100.0,
            touched: &touched,
            selectable_levels: self.ledger.selectable_count(),
        };
        let (rule, action) = rules::decide(&self.rules, &ctx);

        let action = self.vet(rule, action, now);
        Ok(Decision {
            rule,
            action,
            signals: Some(signals),
        })
    }

    /// Risk-gate a proposed action. A rejection degrades to Hold, emits a
    /// `RiskRejected` event and logs a warning; it is never silent.
    fn vet(&mut self, rule: &'static str, action: EngineAction, now: i64) -> EngineAction {
        let rejection = match &action {
            EngineAction::ActivateLevel {
                level_id,
                trend_justified,
            } => match self.ledger.find_level(*level_id) {
                Some(level) => self
                    .gate
                    .validate_open(
                        &self.config,
                        &self.ledger.exposure(),
                        level.side,
                        level.size_notional,
                        *trend_justified,
                    )
                    .err(),
                None => None,
            },
            EngineAction::Rebuild { spacing_pct } => {
                let mut widened = self.config.clone();
                widened.spacing_pct = *spacing_pct;
                self.gate.validate_spacing(&widened, &self.fees).err()
            }
            _ => None,
        };

        match rejection {
            None => action,
            Some(reason) => {
                warn!("{}: {rule} rejected: {reason}", self.config.symbol);
                self.sink.emit(&GridEvent::RiskRejected {
                    action: format!("{action:?}"),
                    reason: reason.to_string(),
                    timestamp: now,
                });
                EngineAction::Hold
            }
        }
    }

    /// Stop/take-profit multiplier for new positions. With dynamic SLTP the
    /// distances widen with volatility (1% smoothed range = 1x), clamped.
    pub fn sltp_scale(&self, signals: Option<&SignalSnapshot>) -> f64 {
        if !self.config.use_dynamic_sltp {
            return 1.0;
        }
        match signals {
            Some(s) => (s.volatility_pct / 1.0).clamp(0.5, 3.0),
            None => 1.0,
        }
    }

    /// Apply a confirmed fill for an activated level
    pub fn apply_activate(
        &mut self,
        level_id: u32,
        fill_price: f64,
        sltp_scale: f64,
        now: i64,
    ) -> EngineResult<Position> {
        let level = self
            .ledger
            .find_level(level_id)
            .ok_or(EngineError::LevelNotFound(level_id))?;

        let stop_distance = self.config.stop_loss_pct / 100.0 * sltp_scale;
        let profit_distance = self.config.take_profit_pct / 100.0 * sltp_scale;
        let (stop_loss, take_profit) = match level.side {
            Side::Long => (
                fill_price * (1.0 - stop_distance),
                fill_price * (1.0 + profit_distance),
            ),
            Side::Short => (
                fill_price * (1.0 + stop_distance),
                fill_price * (1.0 - profit_distance),
            ),
        };

        let position = self.ledger.open_level(
            level_id,
            fill_price,
            stop_loss,
            take_profit,
            self.config.leverage,
            now,
        )?;
        self.sink.emit(&GridEvent::LevelFilled {
            level_id,
            side: position.side,
            fill_price,
            size: position.size,
            timestamp: now,
        });
        Ok(position)
    }

    /// Apply a confirmed close for an open position
    pub fn apply_close(
        &mut self,
        position_id: uuid::Uuid,
        exit_price: f64,
        reason: ExitReason,
        now: i64,
    ) -> EngineResult<ClosedTrade> {
        let trade = self
            .ledger
            .close_position(position_id, exit_price, reason, now)?;
        self.sink.emit(&GridEvent::LevelClosed {
            level_id: trade.position.level_id,
            exit_price,
            pnl: trade.pnl(),
            reason,
            timestamp: now,
        });
        Ok(trade)
    }

    /// Panic response: close every open position fighting the panic
    /// direction. Positions aligned with the move are kept.
    pub fn apply_flatten(
        &mut self,
        bias: Side,
        exit_price: f64,
        now: i64,
    ) -> EngineResult<Vec<ClosedTrade>> {
        let to_close: Vec<uuid::Uuid> = self
            .ledger
            .open_positions()
            .iter()
            .filter(|p| p.side != bias)
            .map(|p| p.id)
            .collect();

        let mut trades = Vec::with_capacity(to_close.len());
        for id in to_close {
            trades.push(self.apply_close(id, exit_price, ExitReason::Panic, now)?);
        }
        Ok(trades)
    }

    /// Volume-anomaly response: shrink stop distances on open positions
    pub fn apply_tighten(&mut self) {
        self.ledger.tighten_stops(TIGHTEN_FACTOR);
    }

    /// Rebuild the pending ladder around `new_center` with the given spacing
    /// (this rebuild only; the configured base spacing is kept for the next).
    pub fn apply_rebuild(
        &mut self,
        spacing_pct: f64,
        new_center: f64,
        now: i64,
    ) -> EngineResult<()> {
        let old_center = self.ledger.center_price();
        let mut widened = self.config.clone();
        widened.spacing_pct = spacing_pct;
        let carried = self
            .ledger
            .rebalance(&widened, &self.fees, &self.gate, new_center, now)?;
        self.config.center_price = new_center;
        self.sink.emit(&GridEvent::Rebalanced {
            old_center,
            new_center,
            carried_positions: carried,
            timestamp: now,
        });
        Ok(())
    }

    /// Record a fill fee against equity
    pub fn record_fee(&mut self, fee: f64) {
        self.ledger.record_fee(fee);
    }

    /// Persist the ledger for resume-across-restart
    pub fn save_state(&self, path: impl AsRef<std::path::Path>) -> EngineResult<()> {
        self.ledger.save_to_file(path)
    }
}
