//! Factor cache behavior: subset reuse, single-flight under concurrency,
//! and failure isolation.

use chrono::NaiveDate;
use quantlab_core::data::price::SymbolBar;
use quantlab_core::data::{
    FactorCache, FactorError, FactorId, FactorRow, MemoryFactorStore, NullFactorStore, PriceTable,
};
use quantlab_core::domain::{PriceBar, Symbol};
use std::sync::Arc;

fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn days(range: std::ops::RangeInclusive<u32>) -> Vec<NaiveDate> {
    range.map(date).collect()
}

fn price_table(symbol: &Symbol, day_list: &[NaiveDate]) -> PriceTable {
    let rows: Vec<SymbolBar> = day_list
        .iter()
        .enumerate()
        .map(|(i, &d)| SymbolBar {
            symbol: symbol.clone(),
            bar: PriceBar {
                date: d,
                open: 10.0 + i as f64,
                high: 10.6 + i as f64,
                low: 9.6 + i as f64,
                close: 10.2 + i as f64,
                volume: 1000,
                adj_factor: 1.0,
            },
        })
        .collect();
    PriceTable::from_rows(
        std::slice::from_ref(symbol),
        rows,
        day_list[0],
        *day_list.last().unwrap(),
    )
}

fn turnover_rows(symbol: &Symbol, day_list: &[NaiveDate]) -> Vec<FactorRow> {
    day_list
        .iter()
        .enumerate()
        .map(|(i, &d)| FactorRow {
            symbol: symbol.clone(),
            date: d,
            name: "turnover_rate".to_string(),
            value: 1.0 + i as f64 * 0.1,
        })
        .collect()
}

#[test]
fn subset_request_after_superset_hits_cache_entirely() {
    let a = sym("000001.SZ");
    let all_days = days(2..=6);
    let prices = price_table(&a, &all_days);
    let store = MemoryFactorStore::new(turnover_rows(&a, &all_days));
    let cache = FactorCache::new();
    let factor = FactorId::parse("turnover_rate").unwrap();

    let table = cache
        .load_or_compute(&store, &prices, &all_days, &[a.clone()], &[factor.clone()])
        .unwrap();
    assert_eq!(table.len(), 5);
    assert_eq!(store.fetch_count(), 1);

    // A strict subset of the cached keyset: zero further round trips.
    let subset = days(3..=5);
    let table = cache
        .load_or_compute(&store, &prices, &subset, &[a.clone()], &[factor.clone()])
        .unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(store.fetch_count(), 1);
}

#[test]
fn known_missing_values_are_not_refetched() {
    let a = sym("000001.SZ");
    let all_days = days(2..=4);
    let prices = price_table(&a, &all_days);
    // Store has a value only for the first day.
    let store = MemoryFactorStore::new(turnover_rows(&a, &all_days[..1]));
    let cache = FactorCache::new();
    let factor = FactorId::parse("turnover_rate").unwrap();

    let table = cache
        .load_or_compute(&store, &prices, &all_days, &[a.clone()], &[factor.clone()])
        .unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(store.fetch_count(), 1);

    // The gaps are cached as known-missing; asking again fetches nothing.
    cache
        .load_or_compute(&store, &prices, &all_days, &[a.clone()], &[factor.clone()])
        .unwrap();
    assert_eq!(store.fetch_count(), 1);
}

#[test]
fn concurrent_identical_requests_fetch_once() {
    let a = sym("000001.SZ");
    let all_days = days(2..=6);
    let prices = Arc::new(price_table(&a, &all_days));
    let store = Arc::new(MemoryFactorStore::new(turnover_rows(&a, &all_days)));
    let cache = Arc::new(FactorCache::new());
    let factor = FactorId::parse("turnover_rate").unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let prices = Arc::clone(&prices);
        let store = Arc::clone(&store);
        let cache = Arc::clone(&cache);
        let symbol = a.clone();
        let day_list = all_days.clone();
        let factor = factor.clone();
        handles.push(std::thread::spawn(move || {
            cache
                .load_or_compute(store.as_ref(), &prices, &day_list, &[symbol], &[factor])
                .unwrap()
                .len()
        }));
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 5);
    }
    // The compute gate serializes misses; the overlap resolves exactly once.
    assert_eq!(store.fetch_count(), 1);
}

#[test]
fn store_failure_does_not_invalidate_cached_entries() {
    let a = sym("000001.SZ");
    let all_days = days(2..=6);
    let prices = price_table(&a, &all_days);
    let cache = FactorCache::new();
    let momentum = FactorId::parse("momentum_2").unwrap();

    // Prime the cache with a derived factor.
    cache
        .load_or_compute(
            &NullFactorStore,
            &prices,
            &all_days,
            &[a.clone()],
            &[momentum.clone()],
        )
        .unwrap();
    let primed = cache.len();
    assert!(primed > 0);

    // A failing store aborts the stored-factor fetch...
    let failing = MemoryFactorStore::failing();
    let err = cache
        .load_or_compute(
            &failing,
            &prices,
            &all_days,
            &[a.clone()],
            &[momentum.clone(), FactorId::parse("turnover_rate").unwrap()],
        )
        .unwrap_err();
    assert!(matches!(err, FactorError::StoreUnavailable(_)));

    // ...but the primed entries survive and keep serving.
    assert_eq!(cache.len(), primed);
    let table = cache
        .load_or_compute(&NullFactorStore, &prices, &all_days, &[a.clone()], &[momentum])
        .unwrap();
    assert_eq!(table.len(), 3); // momentum_2 defined from the third day on
}
