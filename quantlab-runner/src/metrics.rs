//! Performance metrics — pure functions over the sealed snapshot sequence.
//!
//! Every metric derives from the snapshots alone; nothing here re-reads
//! price or factor data.

use quantlab_core::domain::PortfolioSnapshot;
use serde::{Deserialize, Serialize};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// How per-period returns are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    #[default]
    Simple,
    Log,
}

/// Aggregate performance metrics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub turnover: f64,
    pub trading_days: usize,
}

impl RunMetrics {
    /// Compute all metrics from the snapshot sequence.
    pub fn compute(
        snapshots: &[PortfolioSnapshot],
        initial_cash: f64,
        kind: ReturnKind,
    ) -> Self {
        let curve = equity_curve(snapshots, initial_cash);
        let returns = period_returns(&curve, kind);
        let vol = std_dev(&returns) * TRADING_DAYS_PER_YEAR.sqrt();
        Self {
            total_return: total_return(&curve),
            annualized_return: annualized_return(&curve, snapshots.len()),
            annualized_volatility: vol,
            sharpe: sharpe_ratio(&returns),
            max_drawdown: max_drawdown(&curve),
            turnover: turnover(snapshots),
            trading_days: snapshots.len(),
        }
    }
}

/// The equity curve: initial cash followed by each day's equity.
pub fn equity_curve(snapshots: &[PortfolioSnapshot], initial_cash: f64) -> Vec<f64> {
    let mut curve = Vec::with_capacity(snapshots.len() + 1);
    curve.push(initial_cash);
    curve.extend(snapshots.iter().map(|s| s.equity));
    curve
}

/// Per-period returns along the equity curve.
pub fn period_returns(curve: &[f64], kind: ReturnKind) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| {
            if w[0] <= 0.0 {
                return 0.0;
            }
            match kind {
                ReturnKind::Simple => (w[1] - w[0]) / w[0],
                ReturnKind::Log => (w[1] / w[0]).ln(),
            }
        })
        .collect()
}

/// Total return as a fraction of initial equity.
pub fn total_return(curve: &[f64]) -> f64 {
    if curve.len() < 2 || curve[0] <= 0.0 {
        return 0.0;
    }
    (curve[curve.len() - 1] - curve[0]) / curve[0]
}

/// Annualized growth rate assuming 252 trading days per year.
pub fn annualized_return(curve: &[f64], trading_days: usize) -> f64 {
    if curve.len() < 2 || trading_days < 2 {
        return 0.0;
    }
    let initial = curve[0];
    let last = curve[curve.len() - 1];
    if initial <= 0.0 || last <= 0.0 {
        return 0.0;
    }
    let years = trading_days as f64 / TRADING_DAYS_PER_YEAR;
    (last / initial).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio from per-period returns (zero risk-free rate).
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(returns);
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Maximum drawdown as a negative fraction (peak to trough).
pub fn max_drawdown(curve: &[f64]) -> f64 {
    if curve.len() < 2 {
        return 0.0;
    }
    let mut peak = curve[0];
    let mut max_dd = 0.0_f64;
    for &eq in curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Turnover: Σ |traded notional| / average equity.
pub fn turnover(snapshots: &[PortfolioSnapshot]) -> f64 {
    if snapshots.is_empty() {
        return 0.0;
    }
    let traded: f64 = snapshots.iter().map(|s| s.traded_notional).sum();
    let avg_equity = snapshots.iter().map(|s| s.equity).sum::<f64>() / snapshots.len() as f64;
    if avg_equity <= 0.0 {
        return 0.0;
    }
    traded / avg_equity
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
