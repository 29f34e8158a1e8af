//! Grid position-management engine with deterministic backtest replay.
//!
//! A ladder of long/short levels is maintained around a moving center
//! price; at any time only the 2-4 levels closest to price are real
//! (capital-backed), the rest are tracked virtually. A fixed signal
//! hierarchy decides opens, closes and rebalances, and the identical
//! decision path replays over historical candles to produce performance
//! metrics.

#![deny(unreachable_pub)]

pub mod backtest;
pub mod config;
pub mod engine;
pub mod grid;
pub mod market;
pub mod metrics;
pub mod risk;
pub mod runner;
pub mod signal;

pub use backtest::{BacktestResult, Backtester};
pub use config::{RunMode, Settings};
pub use engine::{Decision, Engine, EngineAction};
pub use grid::{EngineError, EngineResult, FeeModel, GridConfig, Ledger};
pub use metrics::{EquityPoint, PerformanceMetrics};
pub use risk::{RiskGate, RiskLimits};
pub use runner::LiveRunner;
pub use signal::{SignalConfig, SignalSnapshot};
