//! Performance metrics - pure functions that compute strategy statistics
//! from the equity curve and trade list produced by a run.

use serde::{Deserialize, Serialize};

use crate::grid::types::ClosedTrade;

const MS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0 * 1000.0;

/// One point of the equity curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub equity: f64,
}

/// Aggregate performance statistics for a single run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown_pct: f64,
    pub win_rate: f64,
    /// `f64::INFINITY` when there are no losing trades (serializes as null)
    pub profit_factor: f64,
    pub trade_count: usize,
    pub total_fees: f64,
}

impl PerformanceMetrics {
    pub fn compute(
        initial_capital: f64,
        equity_curve: &[EquityPoint],
        trades: &[ClosedTrade],
        total_fees: f64,
    ) -> Self {
        let periods_per_year = periods_per_year(equity_curve);
        Self {
            total_return_pct: total_return_pct(initial_capital, equity_curve),
            sharpe_ratio: sharpe_ratio(equity_curve, periods_per_year),
            sortino_ratio: sortino_ratio(equity_curve, periods_per_year),
            max_drawdown_pct: max_drawdown_pct(equity_curve),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
            total_fees,
        }
    }
}

/// Annualization factor inferred from the median spacing of the curve
pub fn periods_per_year(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let mut deltas: Vec<i64> = equity_curve
        .windows(2)
        .map(|pair| pair[1].timestamp - pair[0].timestamp)
        .filter(|&d| d > 0)
        .collect();
    if deltas.is_empty() {
        return 0.0;
    }
    deltas.sort_unstable();
    let median = deltas[deltas.len() / 2] as f64;
    MS_PER_YEAR / median
}

/// `(final - initial) / initial * 100`
pub fn total_return_pct(initial_capital: f64, equity_curve: &[EquityPoint]) -> f64 {
    if initial_capital <= 0.0 {
        return 0.0;
    }
    match equity_curve.last() {
        Some(point) => (point.equity - initial_capital) / initial_capital * 100.0,
        None => 0.0,
    }
}

fn periodic_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|pair| pair[0].equity > 0.0)
        .map(|pair| (pair[1].equity - pair[0].equity) / pair[0].equity)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Annualized Sharpe ratio over periodic returns, zero risk-free rate.
/// Returns 0.0 when variance is zero or the curve is too short.
pub fn sharpe_ratio(equity_curve: &[EquityPoint], periods_per_year: f64) -> f64 {
    let returns = periodic_returns(equity_curve);
    if returns.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean(&returns) / std * periods_per_year.sqrt()
}

/// Annualized Sortino ratio (downside deviation only)
pub fn sortino_ratio(equity_curve: &[EquityPoint], periods_per_year: f64) -> f64 {
    let returns = periodic_returns(equity_curve);
    if returns.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let downside_sq: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).collect();
    if downside_sq.is_empty() {
        return 0.0;
    }
    let downside_std = (downside_sq.iter().sum::<f64>() / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean(&returns) / downside_std * periods_per_year.sqrt()
}

/// Largest peak-to-trough decline, percent (non-negative)
pub fn max_drawdown_pct(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0f64;
    for point in equity_curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            worst = worst.max((peak - point.equity) / peak * 100.0);
        }
    }
    worst
}

/// Winning trades / total trades; 0.0 with no trades
pub fn win_rate(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades.iter().filter(|t| t.pnl() > 0.0).count();
    wins as f64 / trades.len() as f64
}

/// Gross wins / |gross losses|. `f64::INFINITY` when there are winners and
/// no losers, 0.0 when there are no trades at all.
pub fn profit_factor(trades: &[ClosedTrade]) -> f64 {
    let gross_win: f64 = trades.iter().map(|t| t.pnl()).filter(|p| *p > 0.0).sum();
    let gross_loss: f64 = trades.iter().map(|t| t.pnl()).filter(|p| *p < 0.0).sum();
    if gross_loss == 0.0 {
        if gross_win > 0.0 {
            return f64::INFINITY;
        }
        return 0.0;
    }
    gross_win / gross_loss.abs()
}
