//! Backtest driver - candle-by-candle replay of the identical decision
//! logic used live, with simulated fills, fees and slippage.
//!
//! Deterministic: no wall clock, no unseeded randomness. Running the same
//! config over the same candles twice produces identical results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, EngineAction};
use crate::grid::config::FeeModel;
use crate::grid::errors::EngineResult;
use crate::grid::types::{ClosedTrade, ExitReason, Side};
use crate::market::Candle;
use crate::metrics::{EquityPoint, PerformanceMetrics};

/// JSON-serializable record of a full backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<ClosedTrade>,
    pub metrics: PerformanceMetrics,
    pub total_fees: f64,
    /// True when the run was cancelled between candles; the curve and
    /// trades cover everything up to the abort point
    pub aborted: bool,
}

/// Replays candles through an engine. One backtester per symbol; instances
/// share nothing and may run in parallel.
pub struct Backtester {
    engine: Engine,
    cancel: Arc<AtomicBool>,
}

impl Backtester {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for aborting the run from another task. The abort takes
    /// effect at the next candle boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the full replay and consume the backtester
    pub fn run(mut self, candles: &[Candle]) -> EngineResult<BacktestResult> {
        let symbol = self.engine.config().symbol.clone();
        let initial_capital = self.engine.config().total_capital;
        let fees = *self.engine.fees();

        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(candles.len());
        let mut aborted = false;

        for (i, candle) in candles.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                warn!("{symbol}: backtest aborted at candle {i}, returning partial results");
                aborted = true;
                break;
            }
            let now = candle.timestamp;

            self.apply_funding(candle);
            self.sweep_exits(&fees, candle)?;

            let decision = self.engine.decide(&candles[..=i], now)?;
            match decision.action {
                EngineAction::ActivateLevel { level_id, .. } => {
                    if let Some((price, side)) = self.level_fill_terms(level_id) {
                        let fill = fees.slip(price, side == Side::Long);
                        let scale = self.engine.sltp_scale(decision.signals.as_ref());
                        let position = self.engine.apply_activate(level_id, fill, scale, now)?;
                        self.engine.record_fee(fees.fee_for(position.notional()));
                    }
                }
                EngineAction::FlattenOrCluster { bias } => {
                    // Every position being closed is on the side opposite
                    // the bias, so one slipped exit price covers them all
                    let closing_buys = bias.opposite() == Side::Short;
                    let exit = fees.slip(candle.close, closing_buys);
                    let trades = self.engine.apply_flatten(bias, exit, now)?;
                    for trade in &trades {
                        self.engine
                            .record_fee(fees.fee_for(trade.exit_price * trade.position.size));
                    }
                }
                EngineAction::TightenRisk => self.engine.apply_tighten(),
                EngineAction::Rebuild { spacing_pct } => {
                    self.engine.apply_rebuild(spacing_pct, candle.close, now)?;
                }
                EngineAction::Hold => {}
            }

            equity_curve.push(EquityPoint {
                timestamp: now,
                equity: self.engine.equity(candle.close),
            });
        }

        // Realize whatever is still open at the final close so metrics
        // reflect the whole run
        if !aborted {
            if let Some(last) = candles.last() {
                self.close_remaining(&fees, last)?;
                if let Some(point) = equity_curve.last_mut() {
                    point.equity = self.engine.equity(last.close);
                }
            }
        }

        let trades = self.engine.ledger().closed_trades().to_vec();
        let total_fees = self.engine.ledger().total_fees();
        let metrics = PerformanceMetrics::compute(initial_capital, &equity_curve, &trades, total_fees);

        info!(
            "{symbol}: backtest finished, {} trades, return {:.2}%, fees {:.2}",
            trades.len(),
            metrics.total_return_pct,
            total_fees
        );

        Ok(BacktestResult {
            symbol,
            equity_curve,
            trades,
            metrics,
            total_fees,
            aborted,
        })
    }

    fn level_fill_terms(&self, level_id: u32) -> Option<(f64, Side)> {
        self.engine
            .ledger()
            .find_level(level_id)
            .map(|l| (l.price, l.side))
    }

    /// Charge funding on open positions when the candle carries a rate.
    /// Longs pay positive funding, shorts receive it.
    fn apply_funding(&mut self, candle: &Candle) {
        let rate = match candle.funding_rate {
            Some(rate) if rate != 0.0 => rate,
            _ => return,
        };
        let funding: f64 = self
            .engine
            .ledger()
            .open_positions()
            .iter()
            .map(|p| match p.side {
                Side::Long => p.notional() * rate,
                Side::Short => -p.notional() * rate,
            })
            .sum();
        if funding != 0.0 {
            self.engine.record_fee(funding);
        }
    }

    /// Close positions whose stop or target the candle range touched.
    /// The stop check runs first: if both are touched in one candle the
    /// position exits at the stop.
    fn sweep_exits(&mut self, fees: &FeeModel, candle: &Candle) -> EngineResult<()> {
        let open: Vec<_> = self.engine.ledger().open_positions().to_vec();
        for position in open {
            let closing_buys = position.side == Side::Short;
            if position.stop_hit(candle.high, candle.low) {
                let exit = fees.slip(position.stop_loss, closing_buys);
                self.engine
                    .apply_close(position.id, exit, ExitReason::StopLoss, candle.timestamp)?;
                self.engine.record_fee(fees.fee_for(exit * position.size));
            } else if position.take_profit_hit(candle.high, candle.low) {
                let exit = fees.slip(position.take_profit, closing_buys);
                self.engine
                    .apply_close(position.id, exit, ExitReason::TakeProfit, candle.timestamp)?;
                self.engine.record_fee(fees.fee_for(exit * position.size));
            }
        }
        Ok(())
    }

    fn close_remaining(&mut self, fees: &FeeModel, last: &Candle) -> EngineResult<()> {
        let open: Vec<_> = self.engine.ledger().open_positions().to_vec();
        for position in open {
            let closing_buys = position.side == Side::Short;
            let exit = fees.slip(last.close, closing_buys);
            self.engine
                .apply_close(position.id, exit, ExitReason::EndOfData, last.timestamp)?;
            self.engine.record_fee(fees.fee_for(exit * position.size));
        }
        Ok(())
    }
}
