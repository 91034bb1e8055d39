//! Run configuration and validation.

use crate::calendar::Calendar;
use crate::domain::{RunId, Symbol};
use crate::engine::EngineError;
use crate::strategy::StrategyKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which price of the decision day fills execute at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPrice {
    Open,
    Close,
}

/// What to do when the strategy fails on a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayErrorPolicy {
    /// Record the failure, hold positions unchanged, continue.
    Skip,
    /// Fail the whole run; snapshots before the failing day are retained.
    Abort,
}

/// Slippage model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlippageSpec {
    /// Fixed adverse basis points per fill.
    Fixed { bps: f64 },
    /// Adverse basis points drawn uniformly from
    /// `[mean - spread, mean + spread]` using the run's seeded RNG.
    Jitter { mean_bps: f64, spread_bps: f64 },
}

/// Trading cost parameters.
///
/// Defaults follow A-share conventions: commission in basis points with a
/// per-fill minimum, stamp duty charged on sells only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParams {
    pub commission_bps: f64,
    pub min_commission: f64,
    pub stamp_duty_bps: f64,
    pub slippage: SlippageSpec,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            commission_bps: 2.5,
            min_commission: 5.0,
            stamp_duty_bps: 5.0,
            slippage: SlippageSpec::Fixed { bps: 2.0 },
        }
    }
}

impl CostParams {
    /// No commission, duty, or slippage.
    pub fn frictionless() -> Self {
        Self {
            commission_bps: 0.0,
            min_commission: 0.0,
            stamp_duty_bps: 0.0,
            slippage: SlippageSpec::Fixed { bps: 0.0 },
        }
    }
}

/// Complete configuration of one backtest run.
///
/// The canonical JSON serialization of this struct (including the seed)
/// derives the run id, so any change to any field yields a new identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub universe: Vec<Symbol>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_cash: f64,
    pub strategy: StrategyKind,
    pub costs: CostParams,
    pub fill_price: FillPrice,
    pub on_day_error: DayErrorPolicy,
    pub seed: u64,
}

impl RunConfig {
    /// Deterministic run identity from the canonical serialization.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("RunConfig must serialize");
        RunId::from_canonical_config(&json)
    }

    /// Input validation for the `Created → Loading` transition.
    pub fn validate(&self, calendar: &Calendar) -> Result<(), EngineError> {
        if self.universe.is_empty() {
            return Err(EngineError::InvalidConfig(
                "symbol universe is empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for symbol in &self.universe {
            if !seen.insert(symbol) {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate symbol in universe: {symbol}"
                )));
            }
        }
        if self.start > self.end {
            return Err(EngineError::InvalidConfig(format!(
                "start {} after end {}",
                self.start, self.end
            )));
        }
        if !(self.initial_cash > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "initial cash must be positive, got {}",
                self.initial_cash
            )));
        }
        let (first, last) = calendar.coverage();
        for date in [self.start, self.end] {
            if !calendar.contains(date) {
                return Err(EngineError::InvalidConfig(format!(
                    "{date} outside known calendar coverage {first}..={last}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn config() -> RunConfig {
        RunConfig {
            universe: vec![Symbol::parse("000001.SZ").unwrap()],
            start: date(2),
            end: date(5),
            initial_cash: 100_000.0,
            strategy: StrategyKind::BuyAndHold {
                symbol: Symbol::parse("000001.SZ").unwrap(),
                quantity: 100.0,
            },
            costs: CostParams::frictionless(),
            fill_price: FillPrice::Open,
            on_day_error: DayErrorPolicy::Skip,
            seed: 42,
        }
    }

    #[test]
    fn run_id_changes_with_seed() {
        let a = config();
        let mut b = config();
        b.seed = 43;
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn run_id_stable_for_same_config() {
        assert_eq!(config().run_id(), config().run_id());
    }

    #[test]
    fn default_costs_are_ashare_shaped() {
        let costs = CostParams::default();
        assert!(costs.min_commission > 0.0);
        assert!(costs.stamp_duty_bps > 0.0);
    }
}
