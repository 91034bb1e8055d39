//! Service-level tests: end-to-end runs through the TOML spec, parallel
//! execution against the shared factor cache, and report determinism.

use chrono::NaiveDate;
use quantlab_core::data::price::SymbolBar;
use quantlab_core::data::{
    FactorRow, MemoryFactorStore, MemoryPriceStore, StaticCalendarStore,
};
use quantlab_core::domain::{PriceBar, Symbol};
use quantlab_runner::{BacktestService, RunSpec};
use std::sync::Arc;

fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

fn weekday_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    use quantlab_core::calendar::CalendarStore;
    StaticCalendarStore::weekdays(start, end)
        .fetch_calendar()
        .unwrap()
        .into_iter()
        .filter(|d| d.is_open)
        .map(|d| d.date)
        .collect()
}

fn trending_bars(days: &[NaiveDate], start_price: f64, drift: f64) -> Vec<PriceBar> {
    days.iter()
        .enumerate()
        .map(|(i, &d)| {
            let close = start_price + drift * i as f64;
            PriceBar {
                date: d,
                open: close - 0.1,
                high: close + 0.3,
                low: close - 0.3,
                close,
                volume: 50_000,
                adj_factor: 1.0,
            }
        })
        .collect()
}

fn service() -> (BacktestService, Arc<MemoryFactorStore>, Arc<MemoryPriceStore>) {
    let start = date(1, 1);
    let end = date(3, 29);
    let days = weekday_dates(start, end);

    let a = sym("000001.SZ");
    let b = sym("600519.SH");
    let mut price_rows = Vec::new();
    for bar in trending_bars(&days, 10.0, 0.05) {
        price_rows.push(SymbolBar {
            symbol: a.clone(),
            bar,
        });
    }
    for bar in trending_bars(&days, 50.0, -0.02) {
        price_rows.push(SymbolBar {
            symbol: b.clone(),
            bar,
        });
    }

    let mut factor_rows = Vec::new();
    for (i, &d) in days.iter().enumerate() {
        for (symbol, base) in [(a.clone(), 2.0), (b.clone(), 1.0)] {
            factor_rows.push(FactorRow {
                symbol,
                date: d,
                name: "turnover_rate".to_string(),
                value: base + (i % 7) as f64 * 0.1,
            });
        }
    }

    let prices = Arc::new(MemoryPriceStore::new(price_rows));
    let factors = Arc::new(MemoryFactorStore::new(factor_rows));
    let prices_dyn: Arc<dyn quantlab_core::data::PriceStore> = prices.clone();
    let factors_dyn: Arc<dyn quantlab_core::data::FactorStore> = factors.clone();
    let svc = BacktestService::new(
        Box::new(StaticCalendarStore::weekdays(start, end)),
        prices_dyn,
        factors_dyn,
    );
    (svc, factors, prices)
}

const SPEC: &str = r#"
[run]
name = "turnover-top1"
universe = ["000001.SZ", "600519.SH"]
start_date = "2024-01-02"
end_date = "2024-03-29"
initial_cash = 1000000.0
seed = 11

[strategy]
type = "factor_top_n"
factor = "turnover_rate"
top_n = 1
rebalance_every = 5
"#;

#[test]
fn spec_to_report_end_to_end() {
    let (svc, _factors, prices) = service();
    let request = RunSpec::from_toml(SPEC).unwrap().to_request().unwrap();

    let report = svc.execute(&request).unwrap();
    assert_eq!(report.name.as_deref(), Some("turnover-top1"));
    assert!(!report.run.snapshots.is_empty());
    assert!(report.metrics.trading_days > 0);
    assert!(report.metrics.turnover > 0.0);
    // The whole run cost one price round trip.
    assert_eq!(prices.fetch_count(), 1);

    // Report serializes for the API layer.
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"run_id\""));
}

#[test]
fn repeated_execution_reuses_the_factor_cache() {
    let (svc, factors, _prices) = service();
    let request = RunSpec::from_toml(SPEC).unwrap().to_request().unwrap();

    let first = svc.execute(&request).unwrap();
    let fetches_after_first = factors.fetch_count();
    assert!(fetches_after_first >= 1);

    let second = svc.execute(&request).unwrap();
    // Identical keyset: served entirely from the cache.
    assert_eq!(factors.fetch_count(), fetches_after_first);
    assert_eq!(first.run.digest, second.run.digest);
}

#[test]
fn parallel_runs_share_the_cache_and_stay_deterministic() {
    let (svc, _factors, _prices) = service();
    let base = RunSpec::from_toml(SPEC).unwrap().to_request().unwrap();

    let mut requests = Vec::new();
    for seed in 0..6u64 {
        let mut request = base.clone();
        request.config.seed = seed;
        request.name = Some(format!("seed-{seed}"));
        requests.push(request);
    }

    let reports: Vec<_> = svc
        .execute_many(&requests)
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // Re-running the same batch reproduces every digest.
    let again: Vec<_> = svc
        .execute_many(&requests)
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    for (a, b) in reports.iter().zip(&again) {
        assert_eq!(a.run.digest, b.run.digest);
        assert_eq!(a.run_id, b.run_id);
    }

    // Fixed-bps slippage and identical data: seeds agree on the sequence.
    assert!(svc.factor_cache().len() > 0);
}

#[test]
fn cache_invalidation_forces_reload() {
    let (svc, factors, _prices) = service();
    let request = RunSpec::from_toml(SPEC).unwrap().to_request().unwrap();

    svc.execute(&request).unwrap();
    let before = factors.fetch_count();

    svc.invalidate_caches();
    assert_eq!(svc.factor_cache().len(), 0);

    svc.execute(&request).unwrap();
    assert!(factors.fetch_count() > before);
}
