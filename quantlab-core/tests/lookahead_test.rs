//! Look-ahead contamination tests.
//!
//! Invariant: nothing recorded at day N may depend on data from day N+1 or
//! later. Method: run once on the full dataset and once with every bar
//! strictly after a cutoff day perturbed beyond recognition; the snapshot
//! prefix up to the cutoff must be byte-identical.

use chrono::NaiveDate;
use quantlab_core::calendar::TradingCalendar;
use quantlab_core::data::price::SymbolBar;
use quantlab_core::data::{
    FactorCache, FactorId, MemoryFactorStore, MemoryPriceStore, StaticCalendarStore,
};
use quantlab_core::domain::{snapshot_digest, Ledger, PriceBar, Symbol};
use quantlab_core::engine::{
    run_backtest, AsOfView, CancelToken, CostParams, DayErrorPolicy, FillPrice, Providers,
    RunConfig,
};
use quantlab_core::strategy::{Strategy, StrategyError, StrategyKind, TargetPosition};

fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

/// Deterministic pseudo-random walk bars over the given dates (simple LCG,
/// no RNG dependency).
fn walk_bars(symbol_salt: u64, dates: &[NaiveDate]) -> Vec<PriceBar> {
    let mut price = 50.0;
    dates
        .iter()
        .enumerate()
        .map(|(i, &date)| {
            let seed = (i as u64 + symbol_salt)
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1);
            let change = ((seed % 200) as f64 - 100.0) * 0.02; // -2.0 to +2.0
            price = (price + change).max(5.0);

            let open = price - 0.2;
            let close = price + 0.1;
            PriceBar {
                date,
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume: 10_000 + i as u64,
                adj_factor: 1.0,
            }
        })
        .collect()
}

fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    use quantlab_core::calendar::CalendarStore;
    StaticCalendarStore::weekdays(start, end)
        .fetch_calendar()
        .unwrap()
        .into_iter()
        .filter(|d| d.is_open)
        .map(|d| d.date)
        .collect()
}

struct World {
    calendar: TradingCalendar,
    prices: MemoryPriceStore,
    factors: MemoryFactorStore,
    cache: FactorCache,
}

impl World {
    fn new(start: NaiveDate, end: NaiveDate, rows: Vec<SymbolBar>) -> Self {
        Self {
            calendar: TradingCalendar::new(Box::new(StaticCalendarStore::weekdays(start, end))),
            prices: MemoryPriceStore::new(rows),
            factors: MemoryFactorStore::new(Vec::new()),
            cache: FactorCache::new(),
        }
    }

    fn providers(&self) -> Providers<'_> {
        Providers {
            calendar: &self.calendar,
            prices: &self.prices,
            factors: &self.factors,
            factor_cache: &self.cache,
        }
    }
}

#[test]
fn future_perturbation_leaves_past_snapshots_unchanged() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 2, 9).unwrap();
    let a = sym("000001.SZ");
    let b = sym("600519.SH");

    let open_days = weekdays(start, end);
    assert!(open_days.len() >= 20);
    let cutoff_index = 12;
    let cutoff = open_days[cutoff_index];

    let make_rows = |perturb: bool| {
        let mut rows = Vec::new();
        for (salt, symbol) in [(3u64, a.clone()), (11u64, b.clone())] {
            for mut bar in walk_bars(salt, &open_days) {
                if perturb && bar.date > cutoff {
                    // Scramble everything after the cutoff.
                    bar.open *= 10.0;
                    bar.high *= 10.0;
                    bar.low *= 10.0;
                    bar.close *= 10.0;
                    bar.volume = 1;
                }
                rows.push(SymbolBar {
                    symbol: symbol.clone(),
                    bar,
                });
            }
        }
        rows
    };

    let config = RunConfig {
        universe: vec![a.clone(), b.clone()],
        start,
        end,
        initial_cash: 1_000_000.0,
        strategy: StrategyKind::FactorTopN {
            factor: "momentum_3".to_string(),
            top_n: 1,
            rebalance_every: 2,
        },
        costs: CostParams::default(),
        fill_price: FillPrice::Open,
        on_day_error: DayErrorPolicy::Skip,
        seed: 21,
    };

    let clean = World::new(start, end, make_rows(false));
    let perturbed = World::new(start, end, make_rows(true));

    let run_clean = run_backtest(&config, &clean.providers(), &CancelToken::new()).unwrap();
    let run_perturbed =
        run_backtest(&config, &perturbed.providers(), &CancelToken::new()).unwrap();

    // The runs diverge after the cutoff...
    assert_ne!(run_clean.digest, run_perturbed.digest);
    // ...but the prefix through the cutoff day is byte-identical.
    let prefix_clean = snapshot_digest(&run_clean.snapshots[..=cutoff_index]);
    let prefix_perturbed = snapshot_digest(&run_perturbed.snapshots[..=cutoff_index]);
    assert_eq!(prefix_clean, prefix_perturbed);
}

/// A probe strategy that tries to read every future date through the view
/// on every day and records whether anything leaked.
struct FutureProbe {
    symbol: Symbol,
    all_days: Vec<NaiveDate>,
    leaks: usize,
}

impl Strategy for FutureProbe {
    fn name(&self) -> &str {
        "future_probe"
    }

    fn on_day(
        &mut self,
        view: &AsOfView,
        _ledger: &Ledger,
    ) -> Result<Vec<TargetPosition>, StrategyError> {
        for &day in &self.all_days {
            if day > view.date() {
                if view.bar(&self.symbol, day).is_some() {
                    self.leaks += 1;
                }
                if view
                    .factor_on(&self.symbol, &FactorId::Momentum { window: 1 }, day)
                    .is_some()
                {
                    self.leaks += 1;
                }
            }
        }
        Ok(Vec::new())
    }
}

#[test]
fn view_exposes_no_future_dates() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();
    let a = sym("000001.SZ");
    let open_days = weekdays(start, end);

    let world = World::new(
        start,
        end,
        walk_bars(5, &open_days)
            .into_iter()
            .map(|bar| SymbolBar {
                symbol: a.clone(),
                bar,
            })
            .collect(),
    );

    let prices = quantlab_core::data::PriceTable::load_batch(
        &world.prices,
        &[a.clone()],
        start,
        end,
    )
    .unwrap();
    let factors = world
        .cache
        .load_or_compute(
            &world.factors,
            &prices,
            &open_days,
            &[a.clone()],
            &[FactorId::Momentum { window: 1 }],
        )
        .unwrap();

    let mut probe = FutureProbe {
        symbol: a.clone(),
        all_days: open_days.clone(),
        leaks: 0,
    };
    let ledger = Ledger::new(1_000.0);
    for i in 0..open_days.len() {
        let view = AsOfView::new(&open_days, i, &prices, &factors);
        probe.on_day(&view, &ledger).unwrap();
    }
    assert_eq!(probe.leaks, 0);
}
