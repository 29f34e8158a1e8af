//! Live runner - one evaluation pass per external trigger, with fills
//! confirmed through the exchange before the ledger records them.

use std::path::PathBuf;
use std::sync::Arc;

use log::warn;

use crate::engine::{
    oracle, Decision, DecisionOracle, Engine, EngineAction, OracleAction, OracleSettings,
};
use crate::grid::errors::{EngineError, EngineResult};
use crate::grid::types::{ExitReason, Side};
use crate::market::{Candle, ExchangeOrders};

/// Single-owner live driver for one symbol. Passes never overlap: the
/// caller triggers `tick` at a fixed interval and awaits completion.
pub struct LiveRunner {
    engine: Engine,
    exchange: Arc<dyn ExchangeOrders>,
    oracle: Option<Arc<dyn DecisionOracle>>,
    oracle_settings: OracleSettings,
    state_path: Option<PathBuf>,
}

impl LiveRunner {
    pub fn new(engine: Engine, exchange: Arc<dyn ExchangeOrders>) -> Self {
        Self {
            engine,
            exchange,
            oracle: None,
            oracle_settings: OracleSettings::default(),
            state_path: None,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn DecisionOracle>, settings: OracleSettings) -> Self {
        self.oracle = Some(oracle);
        self.oracle_settings = settings;
        self
    }

    /// Persist the ledger after every pass for resume-across-restart
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// One full evaluation pass: signals, rules, risk gate, exchange fills,
    /// state save. A rejected exchange order leaves the level pending and
    /// the pass continues; it is retried naturally on a later tick.
    pub async fn tick(&mut self, candles: &[Candle], now: i64) -> EngineResult<Decision> {
        let price = candles
            .last()
            .map(|c| c.close)
            .ok_or(EngineError::InsufficientData {
                required: 1,
                got: 0,
            })?;

        let decision = self.engine.decide(candles, now)?;
        match decision.action.clone() {
            EngineAction::ActivateLevel { level_id, .. } => {
                self.fill_level(level_id, &decision, now).await;
            }
            EngineAction::FlattenOrCluster { bias } => {
                self.close_opposing(bias, now).await;
            }
            EngineAction::TightenRisk => self.engine.apply_tighten(),
            EngineAction::Rebuild { spacing_pct } => {
                self.engine.apply_rebuild(spacing_pct, price, now)?;
            }
            EngineAction::Hold => {
                if let Some(signals) = decision.signals {
                    self.consult_oracle(price, signals, now).await?;
                }
            }
        }

        if let Some(path) = &self.state_path {
            self.engine.save_state(path)?;
        }
        Ok(decision)
    }

    /// Place the entry order; the level stays pending unless the venue
    /// confirms a fill.
    async fn fill_level(&mut self, level_id: u32, decision: &Decision, now: i64) {
        let (symbol, side, size) = {
            let level = match self.engine.ledger().find_level(level_id) {
                Some(level) => level,
                None => return,
            };
            (
                self.engine.config().symbol.clone(),
                level.side,
                level.size_base,
            )
        };
        let leverage = self.engine.config().leverage;

        match self
            .exchange
            .place_market_order(&symbol, side, size, leverage)
            .await
        {
            Ok(fill_price) => {
                let scale = self.engine.sltp_scale(decision.signals.as_ref());
                if let Err(err) = self.engine.apply_activate(level_id, fill_price, scale, now) {
                    warn!("{symbol}: confirmed fill could not be recorded: {err}");
                } else {
                    let fee = self.engine.fees().fee_for(fill_price * size);
                    self.engine.record_fee(fee);
                }
            }
            Err(err) => {
                warn!("{symbol}: entry order for level {level_id} failed, staying pending: {err}");
            }
        }
    }

    async fn close_opposing(&mut self, bias: Side, now: i64) {
        let to_close: Vec<_> = self
            .engine
            .ledger()
            .open_positions()
            .iter()
            .filter(|p| p.side != bias)
            .map(|p| (p.id, p.symbol.clone(), p.side, p.size))
            .collect();

        for (id, symbol, side, size) in to_close {
            match self.exchange.close_position(&symbol, side, size).await {
                Ok(fill_price) => {
                    if let Err(err) = self.engine.apply_close(id, fill_price, ExitReason::Panic, now)
                    {
                        warn!("{symbol}: close fill could not be recorded: {err}");
                    }
                }
                Err(err) => {
                    warn!("{symbol}: close order for {id} failed, retrying next tick: {err}");
                }
            }
        }
    }

    /// With no rule firing, give the oracle a chance to act
    async fn consult_oracle(
        &mut self,
        price: f64,
        signals: crate::signal::SignalSnapshot,
        now: i64,
    ) -> EngineResult<()> {
        let oracle_ref = match &self.oracle {
            Some(oracle_ref) => Arc::clone(oracle_ref),
            None => return Ok(()),
        };

        let report = self.engine.report(price, signals);
        let action = oracle::consult(oracle_ref.as_ref(), &report, &self.oracle_settings).await;
        match action {
            OracleAction::Hold => {}
            OracleAction::ClosePosition { position_id } => {
                if let Some((symbol, side, size)) = self
                    .engine
                    .ledger()
                    .open_positions()
                    .iter()
                    .find(|p| p.id == position_id)
                    .map(|p| (p.symbol.clone(), p.side, p.size))
                {
                    match self.exchange.close_position(&symbol, side, size).await {
                        Ok(fill_price) => {
                            self.engine
                                .apply_close(position_id, fill_price, ExitReason::OracleClose, now)?;
                        }
                        Err(err) => warn!("{symbol}: oracle close failed: {err}"),
                    }
                }
            }
            OracleAction::CloseAll => {
                let to_close: Vec<_> = self
                    .engine
                    .ledger()
                    .open_positions()
                    .iter()
                    .map(|p| (p.id, p.symbol.clone(), p.side, p.size))
                    .collect();
                for (id, symbol, side, size) in to_close {
                    match self.exchange.close_position(&symbol, side, size).await {
                        Ok(fill_price) => {
                            self.engine
                                .apply_close(id, fill_price, ExitReason::OracleClose, now)?;
                        }
                        Err(err) => warn!("{symbol}: oracle close failed: {err}"),
                    }
                }
            }
            OracleAction::Rebalance => {
                let spacing = self.engine.config().spacing_pct;
                self.engine.apply_rebuild(spacing, price, now)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MarketReport, OracleAdvice};
    use crate::grid::config::{FeeModel, GridConfig};
    use crate::grid::types::{LevelStatus, LogSink};
    use crate::risk::RiskGate;
    use crate::signal::SignalConfig;
    use async_trait::async_trait;
    use crate::market::exchange::mock::MockExchange;

    fn bar(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: ts,
            open,
            high,
            low,
            close,
            volume: 5.0,
            funding_rate: None,
        }
    }

    fn history_touching_long_level() -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..25)
            .map(|i| {
                bar(
                    i as i64 * 60_000,
                    50_000.0,
                    50_050.0,
                    49_950.0,
                    50_000.0,
                )
            })
            .collect();
        candles.push(bar(25 * 60_000, 50_000.0, 50_050.0, 49_450.0, 49_600.0));
        candles
    }

    fn engine() -> Engine {
        Engine::new(
            GridConfig::new("BTC", 50_000.0, 10, 1.0, 10_000.0, 5),
            FeeModel::default(),
            RiskGate::default(),
            SignalConfig::default(),
            Box::new(LogSink),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_confirmed_fill_opens_position() {
        let exchange = Arc::new(MockExchange::new(49_510.0));
        let mut runner = LiveRunner::new(engine(), exchange.clone());

        let candles = history_touching_long_level();
        let decision = runner.tick(&candles, 25 * 60_000).await.unwrap();
        assert!(matches!(
            decision.action,
            EngineAction::ActivateLevel { .. }
        ));

        let positions = runner.engine().ledger().open_positions();
        assert_eq!(positions.len(), 1);
        // Ledger records the venue's confirmed price, not the level price
        assert!((positions[0].entry_price - 49_510.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_order_leaves_level_pending() {
        let exchange = Arc::new(MockExchange::new(49_510.0));
        exchange.set_should_fail(true).await;
        let mut runner = LiveRunner::new(engine(), exchange);

        let candles = history_touching_long_level();
        let decision = runner.tick(&candles, 25 * 60_000).await.unwrap();
        let level_id = match decision.action {
            EngineAction::ActivateLevel { level_id, .. } => level_id,
            other => panic!("expected activation, got {other:?}"),
        };

        assert!(runner.engine().ledger().open_positions().is_empty());
        assert_eq!(
            runner.engine().ledger().find_level(level_id).unwrap().status,
            LevelStatus::Pending
        );
    }

    struct CloseAllOracle;

    #[async_trait]
    impl DecisionOracle for CloseAllOracle {
        async fn propose(&self, _report: &MarketReport) -> Result<OracleAdvice, EngineError> {
            Ok(OracleAdvice {
                action: OracleAction::CloseAll,
                confidence: 0.95,
                reasoning: "test".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_oracle_close_all_on_hold() {
        let exchange = Arc::new(MockExchange::new(49_510.0));
        let mut runner = LiveRunner::new(engine(), exchange.clone())
            .with_oracle(Arc::new(CloseAllOracle), OracleSettings::default());

        // First tick opens the touched level
        let mut candles = history_touching_long_level();
        runner.tick(&candles, 25 * 60_000).await.unwrap();
        assert_eq!(runner.engine().ledger().open_positions().len(), 1);

        // Quiet candle: rules hold, the oracle says close everything
        candles.push(bar(26 * 60_000, 49_600.0, 49_610.0, 49_590.0, 49_600.0));
        runner.tick(&candles, 26 * 60_000).await.unwrap();
        assert!(runner.engine().ledger().open_positions().is_empty());
        assert_eq!(
            runner.engine().ledger().closed_trades()[0].exit_reason,
            ExitReason::OracleClose
        );
    }

    #[tokio::test]
    async fn test_state_saved_after_tick() {
        let dir = std::env::temp_dir().join(format!("gridkit-runner-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("BTC.json");

        let exchange = Arc::new(MockExchange::new(49_510.0));
        let mut runner = LiveRunner::new(engine(), exchange).with_state_path(&path);
        let candles = history_touching_long_level();
        runner.tick(&candles, 25 * 60_000).await.unwrap();

        let reloaded = crate::grid::Ledger::load_from_file(&path).unwrap();
        assert_eq!(reloaded.open_positions().len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
