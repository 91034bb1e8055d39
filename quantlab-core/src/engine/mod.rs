//! The day-stepped backtest engine.
//!
//! Lifecycle: `Created → Loading → Running → Completed`, with `Failed`
//! reachable from any state. All data for a run is batch-loaded before the
//! first simulated day; nothing inside the day loop touches storage.

pub mod config;
pub mod cost;
pub mod runner;
pub mod state;
pub mod view;

pub use config::{CostParams, DayErrorPolicy, FillPrice, RunConfig, SlippageSpec};
pub use cost::{CostModel, CostedFill};
pub use runner::{run_backtest, Providers};
pub use state::{CancelToken, RunFailure, Stage};
pub use view::AsOfView;

use crate::calendar::CalendarError;
use crate::data::{DataError, FactorError};
use crate::strategy::StrategyError;
use chrono::NaiveDate;
use thiserror::Error;

/// Everything that can fail a run. Variants carry enough context (date,
/// symbol, factor, strategy) to reproduce the failing step in isolation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input; surfaced immediately, never retried.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Factor(#[from] FactorError),

    #[error("strategy '{strategy}' failed on {date}: {source}")]
    StrategyStep {
        strategy: String,
        date: NaiveDate,
        #[source]
        source: StrategyError,
    },

    #[error("run cancelled after {completed_days} trading days")]
    Cancelled { completed_days: usize },
}
