//! TOML run specification.
//!
//! The file format the CLI (and the web layer's request translator) feeds
//! into the service:
//!
//! ```toml
//! [run]
//! name = "momentum-demo"
//! universe = ["000001.SZ", "600519.SH"]
//! start_date = "2024-01-02"
//! end_date = "2024-06-28"
//! initial_cash = 1000000.0
//! seed = 42
//!
//! [strategy]
//! type = "factor_top_n"
//! factor = "momentum_20"
//! top_n = 2
//! rebalance_every = 5
//!
//! [costs]
//! commission_bps = 2.5
//! min_commission = 5.0
//! stamp_duty_bps = 5.0
//! slippage = { kind = "fixed", bps = 2.0 }
//!
//! [policy]
//! on_day_error = "skip"
//! fill_price = "open"
//! return_kind = "simple"
//! ```

use crate::metrics::ReturnKind;
use crate::service::RunRequest;
use chrono::NaiveDate;
use quantlab_core::domain::{Symbol, SymbolError};
use quantlab_core::engine::{CostParams, DayErrorPolicy, FillPrice, RunConfig};
use quantlab_core::strategy::StrategyKind;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    Date(String),

    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunSpec {
    pub run: RunSection,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub costs: CostParams,
    #[serde(default)]
    pub policy: PolicySection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    pub name: Option<String>,
    pub universe: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    pub initial_cash: f64,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub on_day_error: DayErrorPolicy,
    pub fill_price: FillPrice,
    pub return_kind: ReturnKind,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            on_day_error: DayErrorPolicy::Skip,
            fill_price: FillPrice::Open,
            return_kind: ReturnKind::Simple,
        }
    }
}

impl RunSpec {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the spec into a service request.
    pub fn to_request(&self) -> Result<RunRequest, ConfigError> {
        let parse_date = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| ConfigError::Date(s.to_string()))
        };
        let universe = self
            .run
            .universe
            .iter()
            .map(|s| Symbol::parse(s))
            .collect::<Result<Vec<_>, _>>()?;

        let config = RunConfig {
            universe,
            start: parse_date(&self.run.start_date)?,
            end: parse_date(&self.run.end_date)?,
            initial_cash: self.run.initial_cash,
            strategy: self.strategy.clone(),
            costs: self.costs.clone(),
            fill_price: self.policy.fill_price,
            on_day_error: self.policy.on_day_error,
            seed: self.run.seed,
        };
        Ok(RunRequest {
            name: self.run.name.clone(),
            config,
            return_kind: self.policy.return_kind,
        })
    }
}
