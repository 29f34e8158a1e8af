//! Backtest CLI: load settings, replay every configured grid against its
//! candle file, and write one result JSON per symbol.

use std::path::Path;

use log::{error, info};
use tokio::task::JoinSet;

use gridkit::config::{RunMode, Settings};
use gridkit::grid::types::LogSink;
use gridkit::market::{CandleSource, JsonFileSource};
use gridkit::{Backtester, Engine, EngineError, RiskGate};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/backtest".to_string());

    let settings = match Settings::new(&config_path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load settings from '{config_path}': {err}");
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&settings.log.level),
    )
    .init();

    if settings.mode != RunMode::Backtest {
        error!("settings mode is not 'backtest', refusing to run");
        std::process::exit(1);
    }
    if let Err(err) = std::fs::create_dir_all(&settings.output_dir) {
        error!("cannot create output dir {}: {err}", settings.output_dir);
        std::process::exit(1);
    }

    let source = JsonFileSource::new(&settings.data_dir);
    let mut tasks = JoinSet::new();

    // Symbols share nothing; each grid runs on its own engine in parallel
    for grid in settings.grids {
        let source = source.clone();
        let fees = settings.fees;
        let limits = settings.risk;
        let signals = settings.signals;
        tasks.spawn(async move {
            let symbol = grid.symbol.clone();
            let result = run_one(grid, source, fees, limits, signals).await;
            (symbol, result)
        });
    }

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        let (symbol, result) = match joined {
            Ok(pair) => pair,
            Err(err) => {
                error!("backtest task panicked: {err}");
                failures += 1;
                continue;
            }
        };
        match result {
            Ok(result) => {
                let path = Path::new(&settings.output_dir).join(format!("{symbol}_backtest.json"));
                match serde_json::to_string_pretty(&result)
                    .map_err(EngineError::from)
                    .and_then(|json| std::fs::write(&path, json).map_err(EngineError::from))
                {
                    Ok(()) => info!(
                        "{symbol}: return {:.2}%, max drawdown {:.2}%, {} trades -> {}",
                        result.metrics.total_return_pct,
                        result.metrics.max_drawdown_pct,
                        result.metrics.trade_count,
                        path.display()
                    ),
                    Err(err) => {
                        error!("{symbol}: could not write result: {err}");
                        failures += 1;
                    }
                }
            }
            Err(err) => {
                error!("{symbol}: backtest failed: {err}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
}

async fn run_one(
    grid: gridkit::GridConfig,
    source: JsonFileSource,
    fees: gridkit::FeeModel,
    limits: gridkit::RiskLimits,
    signals: gridkit::SignalConfig,
) -> Result<gridkit::BacktestResult, EngineError> {
    let candles = source.load_candles(&grid.symbol, 0, i64::MAX).await?;
    if candles.is_empty() {
        return Err(EngineError::InsufficientData {
            required: 1,
            got: 0,
        });
    }
    let engine = Engine::new(
        grid,
        fees,
        RiskGate::new(limits),
        signals,
        Box::new(LogSink),
    )?;
    Backtester::new(engine).run(&candles)
}
