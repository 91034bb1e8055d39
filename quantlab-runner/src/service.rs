//! The backtest service — the surface the web/API layer calls into.
//!
//! Owns the calendar provider, the storage backends, and the shared factor
//! cache. Independent requests may execute in parallel; they share the
//! cache, whose merge path is safe under concurrent access.

use crate::metrics::{ReturnKind, RunMetrics};
use quantlab_core::calendar::{CalendarStore, TradingCalendar};
use quantlab_core::data::{FactorCache, FactorStore, PriceStore};
use quantlab_core::domain::{BacktestRun, RunId};
use quantlab_core::engine::{run_backtest, CancelToken, Providers, RunConfig, RunFailure};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

/// A run request as submitted by the inbound API layer.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub name: Option<String>,
    pub config: RunConfig,
    pub return_kind: ReturnKind,
}

impl RunRequest {
    pub fn new(config: RunConfig) -> Self {
        Self {
            name: None,
            config,
            return_kind: ReturnKind::Simple,
        }
    }
}

/// Completed run: the sealed snapshot sequence plus aggregated metrics.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub name: Option<String>,
    pub run: BacktestRun,
    pub metrics: RunMetrics,
}

pub struct BacktestService {
    calendar: TradingCalendar,
    prices: Arc<dyn PriceStore>,
    factors: Arc<dyn FactorStore>,
    factor_cache: FactorCache,
}

impl BacktestService {
    pub fn new(
        calendar_store: Box<dyn CalendarStore>,
        prices: Arc<dyn PriceStore>,
        factors: Arc<dyn FactorStore>,
    ) -> Self {
        Self {
            calendar: TradingCalendar::new(calendar_store),
            prices,
            factors,
            factor_cache: FactorCache::new(),
        }
    }

    /// Execute one run to completion.
    pub fn execute(&self, request: &RunRequest) -> Result<RunReport, Box<RunFailure>> {
        self.execute_with_cancel(request, &CancelToken::new())
    }

    /// Execute one run with an external cancellation handle.
    pub fn execute_with_cancel(
        &self,
        request: &RunRequest,
        cancel: &CancelToken,
    ) -> Result<RunReport, Box<RunFailure>> {
        let providers = Providers {
            calendar: &self.calendar,
            prices: self.prices.as_ref(),
            factors: self.factors.as_ref(),
            factor_cache: &self.factor_cache,
        };
        let run = run_backtest(&request.config, &providers, cancel)?;
        let metrics = RunMetrics::compute(
            &run.snapshots,
            request.config.initial_cash,
            request.return_kind,
        );
        tracing::info!(
            run_id = %run.run_id.short(),
            name = request.name.as_deref().unwrap_or("-"),
            total_return = metrics.total_return,
            max_drawdown = metrics.max_drawdown,
            "run report ready"
        );
        Ok(RunReport {
            run_id: run.run_id.clone(),
            name: request.name.clone(),
            run,
            metrics,
        })
    }

    /// Execute independent requests in parallel against the shared cache.
    pub fn execute_many(
        &self,
        requests: &[RunRequest],
    ) -> Vec<Result<RunReport, Box<RunFailure>>> {
        requests.par_iter().map(|r| self.execute(r)).collect()
    }

    pub fn factor_cache(&self) -> &FactorCache {
        &self.factor_cache
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// Explicitly drop the calendar and factor caches; running requests
    /// keep the snapshots they already pinned.
    pub fn invalidate_caches(&self) {
        self.calendar.invalidate();
        self.factor_cache.invalidate();
    }
}
