//! The simulation loop.
//!
//! One pass per trading day: build the as-of view, ask the strategy for
//! target positions, translate the diff into fills through the cost model,
//! mark to market at the last available close, append a snapshot. The loop
//! is strictly sequential; price and factor batch loads run concurrently
//! before it starts, and nothing inside it performs I/O.

use super::config::{DayErrorPolicy, FillPrice, RunConfig};
use super::cost::CostModel;
use super::state::{CancelToken, RunFailure, Stage};
use super::view::AsOfView;
use super::EngineError;
use crate::calendar::TradingCalendar;
use crate::data::{FactorCache, FactorStore, PriceStore, PriceTable};
use crate::domain::{
    BacktestRun, DayIssue, DayStatus, Fill, Ledger, PortfolioSnapshot, PositionSnapshot, RunId,
    Symbol,
};
use crate::rng::SeedHierarchy;
use crate::strategy::{build_strategy, TargetPosition};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const QTY_EPS: f64 = 1e-9;

/// The external collaborators a run reads through.
///
/// Caches are explicit process-scoped objects passed in by reference, so
/// cross-run sharing is visible at the call site and invalidation is an
/// explicit operation on the owner.
pub struct Providers<'a> {
    pub calendar: &'a TradingCalendar,
    pub prices: &'a dyn PriceStore,
    pub factors: &'a dyn FactorStore,
    pub factor_cache: &'a FactorCache,
}

/// Execute one backtest run to completion.
///
/// Re-running the same configuration produces a byte-identical snapshot
/// sequence: the loop admits no wall-clock or unseeded random state.
pub fn run_backtest(
    config: &RunConfig,
    providers: &Providers,
    cancel: &CancelToken,
) -> Result<BacktestRun, Box<RunFailure>> {
    let run_id = config.run_id();

    // ── Created: validate inputs against the pinned calendar ──
    let calendar = providers
        .calendar
        .snapshot()
        .map_err(|e| failure(&run_id, Stage::Loading, e.into(), Vec::new()))?;
    config
        .validate(&calendar)
        .map_err(|e| failure(&run_id, Stage::Created, e, Vec::new()))?;
    let mut strategy = build_strategy(&config.strategy).map_err(|e| {
        failure(
            &run_id,
            Stage::Created,
            EngineError::InvalidConfig(e.to_string()),
            Vec::new(),
        )
    })?;
    let days: Vec<_> = calendar
        .trading_days(config.start, config.end)
        .map_err(|e| failure(&run_id, Stage::Created, e.into(), Vec::new()))?
        .to_vec();
    if days.is_empty() {
        return Err(failure(
            &run_id,
            Stage::Created,
            EngineError::InvalidConfig(format!(
                "no trading days between {} and {}",
                config.start, config.end
            )),
            Vec::new(),
        ));
    }

    tracing::info!(
        run_id = %run_id.short(),
        strategy = strategy.name(),
        universe = config.universe.len(),
        days = days.len(),
        "backtest loading"
    );

    // ── Loading: price batch and stored-factor prefetch in parallel ──
    let wanted = strategy.required_factors();
    let (price_result, prefetch_result) = rayon::join(
        || PriceTable::load_batch(providers.prices, &config.universe, config.start, config.end),
        || providers.factor_cache.load_stored(providers.factors, &config.universe, &days, &wanted),
    );
    let price_table =
        price_result.map_err(|e| failure(&run_id, Stage::Loading, e.into(), Vec::new()))?;
    prefetch_result.map_err(|e| failure(&run_id, Stage::Loading, e.into(), Vec::new()))?;
    // Derived factors need the price table; the stored subset is already
    // cached, so this resolves without another store round trip.
    let factor_table = providers
        .factor_cache
        .load_or_compute(
            providers.factors,
            &price_table,
            &days,
            &config.universe,
            &wanted,
        )
        .map_err(|e| failure(&run_id, Stage::Loading, e.into(), Vec::new()))?;

    // ── Running ──
    let mut ledger = Ledger::new(config.initial_cash);
    let cost_model = CostModel::new(config.costs.clone());
    let mut rng = SeedHierarchy::new(config.seed).rng_for(run_id.as_str(), "cost-model");
    let strategy_name = strategy.name().to_string();

    let mut snapshots: Vec<PortfolioSnapshot> = Vec::with_capacity(days.len());
    let mut issues: Vec<DayIssue> = Vec::new();
    let mut last_close: HashMap<Symbol, f64> = HashMap::new();

    for (i, &day) in days.iter().enumerate() {
        // Cancellation is cooperative and lands between day-steps, leaving
        // the ledger at the last fully-applied day.
        if cancel.is_cancelled() {
            return Err(failure(
                &run_id,
                Stage::Running,
                EngineError::Cancelled { completed_days: i },
                snapshots,
            ));
        }

        let view = AsOfView::new(&days, i, &price_table, &factor_table);
        let mut traded_notional = 0.0;
        let mut status = DayStatus::Ok;

        match strategy.on_day(&view, &ledger) {
            Ok(targets) => {
                for (symbol, delta) in diff_targets(&targets, &ledger) {
                    let Some(bar) = price_table.get(&symbol, day) else {
                        // Suspended: the order cannot fill today; the
                        // position is held and the diff retries tomorrow.
                        tracing::debug!(%symbol, %day, "no bar, order skipped");
                        continue;
                    };
                    let raw_price = match config.fill_price {
                        FillPrice::Open => bar.open,
                        FillPrice::Close => bar.close,
                    };
                    let costed = cost_model.fill(raw_price, delta, &mut rng);
                    let fill = Fill {
                        symbol: symbol.clone(),
                        date: day,
                        quantity: delta,
                        price: costed.price,
                        commission: costed.commission,
                        stamp_duty: costed.stamp_duty,
                        slippage: costed.slippage,
                    };
                    traded_notional += fill.notional();
                    ledger.apply_fill(&fill);
                }
            }
            Err(err) => match config.on_day_error {
                DayErrorPolicy::Abort => {
                    return Err(failure(
                        &run_id,
                        Stage::Running,
                        EngineError::StrategyStep {
                            strategy: strategy_name,
                            date: day,
                            source: err,
                        },
                        snapshots,
                    ));
                }
                DayErrorPolicy::Skip => {
                    tracing::warn!(%day, error = %err, "strategy step failed, day skipped");
                    issues.push(DayIssue {
                        date: day,
                        message: err.to_string(),
                    });
                    status = DayStatus::Skipped;
                }
            },
        }

        // ── Mark to market ──
        // Suspended symbols carry the last valid close forward; marking
        // never changes cash.
        for symbol in &config.universe {
            if let Some(close) = price_table.close(symbol, day) {
                last_close.insert(symbol.clone(), close);
            }
        }
        let mut stale: BTreeSet<Symbol> = BTreeSet::new();
        let mut marks: HashMap<Symbol, f64> = HashMap::new();
        for pos in ledger.positions() {
            if let Some(&price) = last_close.get(&pos.symbol) {
                marks.insert(pos.symbol.clone(), price);
            }
            if price_table.get(&pos.symbol, day).is_none() {
                stale.insert(pos.symbol.clone());
            }
        }
        let equity = ledger.equity(&marks);

        let positions: BTreeMap<Symbol, PositionSnapshot> = ledger
            .positions()
            .map(|p| {
                let mark_price = marks.get(&p.symbol).copied().unwrap_or(p.avg_cost);
                (
                    p.symbol.clone(),
                    PositionSnapshot {
                        quantity: p.quantity,
                        avg_cost: p.avg_cost,
                        mark_price,
                        market_value: p.market_value(mark_price),
                    },
                )
            })
            .collect();

        debug_assert!(
            (ledger.cash + positions.values().map(|p| p.market_value).sum::<f64>() - equity)
                .abs()
                < 1e-6,
            "equity identity violated on {day}"
        );

        snapshots.push(PortfolioSnapshot {
            date: day,
            cash: ledger.cash,
            positions,
            equity,
            traded_notional,
            stale,
            status,
        });
    }

    // ── Completed: seal ──
    let run = BacktestRun::seal(
        run_id.clone(),
        snapshots,
        issues,
        price_table.anomalies().to_vec(),
    );
    tracing::info!(
        run_id = %run_id.short(),
        final_equity = run.final_equity(),
        skipped_days = run.issues.len(),
        "backtest completed"
    );
    Ok(run)
}

/// Diff desired targets against the ledger into signed order quantities,
/// in symbol order. Held symbols omitted from the targets are closed.
fn diff_targets(targets: &[TargetPosition], ledger: &Ledger) -> Vec<(Symbol, f64)> {
    let mut desired: BTreeMap<Symbol, f64> = BTreeMap::new();
    for target in targets {
        desired.insert(target.symbol.clone(), target.quantity);
    }

    let mut deltas: Vec<(Symbol, f64)> = Vec::new();
    for (symbol, &target) in &desired {
        let delta = target - ledger.quantity(symbol);
        if delta.abs() > QTY_EPS {
            deltas.push((symbol.clone(), delta));
        }
    }
    for pos in ledger.positions() {
        if !desired.contains_key(&pos.symbol) {
            deltas.push((pos.symbol.clone(), -pos.quantity));
        }
    }
    deltas.sort_by(|a, b| a.0.cmp(&b.0));
    deltas
}

fn failure(
    run_id: &RunId,
    stage: Stage,
    error: EngineError,
    snapshots: Vec<PortfolioSnapshot>,
) -> Box<RunFailure> {
    tracing::error!(run_id = %run_id.short(), %stage, %error, "backtest failed");
    Box::new(RunFailure {
        run_id: run_id.clone(),
        stage,
        error,
        snapshots,
    })
}
