//! Per-day portfolio snapshots and the sealed run aggregate.
//!
//! One immutable `PortfolioSnapshot` is appended per simulated day; the
//! ordered sequence is the sole input to the metrics layer. All maps are
//! `BTreeMap` so serialization is byte-deterministic, which makes the
//! BLAKE3 digest a usable identity for determinism checks.

use super::bar::BarAnomaly;
use super::ids::RunId;
use super::symbol::Symbol;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of a single simulated day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Ok,
    /// The strategy failed this day and the skip policy held positions.
    Skipped,
}

/// Valuation of one position inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub quantity: f64,
    pub avg_cost: f64,
    pub mark_price: f64,
    pub market_value: f64,
}

/// End-of-day portfolio record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    pub positions: BTreeMap<Symbol, PositionSnapshot>,
    pub equity: f64,
    /// Σ |traded notional| this day; lets turnover be computed from
    /// snapshots alone.
    pub traded_notional: f64,
    /// Held symbols with no bar this day, marked at the last valid close.
    pub stale: BTreeSet<Symbol>,
    pub status: DayStatus,
}

/// A strategy failure recorded on a skipped day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayIssue {
    pub date: NaiveDate,
    pub message: String,
}

/// The sealed result of one backtest run.
///
/// Append-only while the loop runs; immutable once sealed. `digest` is the
/// BLAKE3 hash of the serialized snapshot sequence — two runs with the same
/// configuration must produce the same digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    pub run_id: RunId,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub issues: Vec<DayIssue>,
    pub anomalies: Vec<BarAnomaly>,
    pub digest: String,
}

impl BacktestRun {
    pub fn seal(
        run_id: RunId,
        snapshots: Vec<PortfolioSnapshot>,
        issues: Vec<DayIssue>,
        anomalies: Vec<BarAnomaly>,
    ) -> Self {
        let digest = snapshot_digest(&snapshots);
        Self {
            run_id,
            snapshots,
            issues,
            anomalies,
            digest,
        }
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.snapshots.last().map(|s| s.equity)
    }
}

/// BLAKE3 digest of a snapshot sequence's canonical JSON.
pub fn snapshot_digest(snapshots: &[PortfolioSnapshot]) -> String {
    let json = serde_json::to_vec(snapshots).expect("snapshots must serialize");
    blake3::hash(&json).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(date: NaiveDate, equity: f64) -> PortfolioSnapshot {
        PortfolioSnapshot {
            date,
            cash: equity,
            positions: BTreeMap::new(),
            equity,
            traded_notional: 0.0,
            stale: BTreeSet::new(),
            status: DayStatus::Ok,
        }
    }

    #[test]
    fn digest_is_deterministic() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let a = vec![snapshot(d, 100.0), snapshot(d.succ_opt().unwrap(), 101.0)];
        let b = a.clone();
        assert_eq!(snapshot_digest(&a), snapshot_digest(&b));
    }

    #[test]
    fn digest_sensitive_to_any_field() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let a = vec![snapshot(d, 100.0)];
        let mut b = a.clone();
        b[0].equity = 100.000001;
        assert_ne!(snapshot_digest(&a), snapshot_digest(&b));
    }
}
