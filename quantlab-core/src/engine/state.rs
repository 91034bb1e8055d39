//! Engine lifecycle types: stages, failures, cancellation.

use crate::domain::{PortfolioSnapshot, RunId};
use crate::engine::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Lifecycle stage of a run. Failures carry the stage they occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Loading,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Created => "Created",
            Stage::Loading => "Loading",
            Stage::Running => "Running",
            Stage::Completed => "Completed",
            Stage::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

/// A failed run: the originating error with stage context, plus the sealed
/// snapshot prefix up to the last fully-applied day.
#[derive(Debug, Error)]
#[error("run {run_id} failed during {stage}: {error}")]
pub struct RunFailure {
    pub run_id: RunId,
    pub stage: Stage,
    #[source]
    pub error: EngineError,
    pub snapshots: Vec<PortfolioSnapshot>,
}

/// Cooperative cancellation flag, checked between day-steps only — a run
/// is never interrupted mid-step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
