//! Factor batch provider and the process-wide factor cache.
//!
//! Factor values are deterministic functions of historical data up to their
//! date, so they are safe to reuse across runs. The cache is keyed by
//! (symbol, date, factor id) and stores `Option<f64>` — known-missing
//! values are cached too, so a suspension gap is not re-fetched on every
//! run. `load_or_compute` performs a set-difference against the cache and
//! resolves only the missing subset: stored factors in one batch fetch,
//! derived factors from the already-loaded price table. A compute gate
//! serializes overlapping concurrent requests so the overlap is never
//! resolved twice.

use super::price::PriceTable;
use crate::domain::Symbol;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FactorError {
    #[error("factor store unreachable: {0}")]
    StoreUnavailable(String),

    #[error("factor batch fetch failed: {0}")]
    FetchFailed(String),

    #[error("unrecognized factor id '{0}'")]
    UnknownFactor(String),

    #[error("factor '{factor}' failed for {symbol} on {date}: {reason}")]
    Compute {
        factor: String,
        symbol: Symbol,
        date: NaiveDate,
        reason: String,
    },
}

/// Parsed factor identifier.
///
/// Stored factors are fetched from the factor store by name; derived
/// factors are computed from the price history. The textual form round
/// trips through `parse`/`Display` (`momentum_20`, `volatility_20`,
/// `turnover_rate`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FactorId {
    /// Fetched from the factor store under this name.
    Stored(String),
    /// `close[t] / close[t - window] - 1` over trading days.
    Momentum { window: usize },
    /// Sample standard deviation of the last `window` daily returns.
    Volatility { window: usize },
}

impl FactorId {
    pub fn parse(input: &str) -> Result<Self, FactorError> {
        let s = input.trim();
        if let Some(rest) = s.strip_prefix("momentum_") {
            let window: usize = rest
                .parse()
                .map_err(|_| FactorError::UnknownFactor(input.to_string()))?;
            if window == 0 {
                return Err(FactorError::UnknownFactor(input.to_string()));
            }
            return Ok(FactorId::Momentum { window });
        }
        if let Some(rest) = s.strip_prefix("volatility_") {
            let window: usize = rest
                .parse()
                .map_err(|_| FactorError::UnknownFactor(input.to_string()))?;
            if window == 0 {
                return Err(FactorError::UnknownFactor(input.to_string()));
            }
            return Ok(FactorId::Volatility { window });
        }
        let valid = !s.is_empty()
            && s.bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
        if !valid {
            return Err(FactorError::UnknownFactor(input.to_string()));
        }
        Ok(FactorId::Stored(s.to_string()))
    }

    fn stored_name(&self) -> Option<&str> {
        match self {
            FactorId::Stored(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorId::Stored(name) => write!(f, "{name}"),
            FactorId::Momentum { window } => write!(f, "momentum_{window}"),
            FactorId::Volatility { window } => write!(f, "volatility_{window}"),
        }
    }
}

/// One row returned by a factor store.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorRow {
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub name: String,
    pub value: f64,
}

/// Read-only batch source of stored factor values.
pub trait FactorStore: Send + Sync {
    /// Fetch all values for (symbols × dates × names) in one round trip.
    /// Absent combinations are simply not returned.
    fn fetch_values(
        &self,
        symbols: &[Symbol],
        dates: &[NaiveDate],
        names: &[String],
    ) -> Result<Vec<FactorRow>, FactorError>;
}

/// A factor store with no data; for runs using only derived factors.
pub struct NullFactorStore;

impl FactorStore for NullFactorStore {
    fn fetch_values(
        &self,
        _symbols: &[Symbol],
        _dates: &[NaiveDate],
        _names: &[String],
    ) -> Result<Vec<FactorRow>, FactorError> {
        Ok(Vec::new())
    }
}

type FactorKey = (Symbol, NaiveDate, FactorId);

/// Resolved factor values for one run, restricted to the request keyset.
#[derive(Debug, Default)]
pub struct FactorTable {
    values: HashMap<FactorKey, f64>,
}

impl FactorTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &Symbol, date: NaiveDate, factor: &FactorId) -> Option<f64> {
        self.values
            .get(&(symbol.clone(), date, factor.clone()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Process-wide factor cache, shared across concurrent runs.
#[derive(Default)]
pub struct FactorCache {
    /// `None` marks a known-missing value so gaps are not re-resolved.
    values: RwLock<HashMap<FactorKey, Option<f64>>>,
    /// Serializes resolution of cache misses; overlapping concurrent
    /// requests re-check the cache under this gate and only resolve what
    /// is still missing.
    compute_gate: Mutex<()>,
}

impl FactorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().expect("factor cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        self.values
            .write()
            .expect("factor cache lock poisoned")
            .clear();
        tracing::info!("factor cache invalidated");
    }

    /// Prefetch stored factors into the cache without assembling a table.
    ///
    /// Lets the engine run the store fetch concurrently with the price
    /// batch load; the later `load_or_compute` call then hits the cache
    /// for the stored subset.
    pub fn load_stored(
        &self,
        store: &dyn FactorStore,
        symbols: &[Symbol],
        dates: &[NaiveDate],
        factors: &[FactorId],
    ) -> Result<(), FactorError> {
        let stored: Vec<FactorId> = factors
            .iter()
            .filter(|f| f.stored_name().is_some())
            .cloned()
            .collect();
        if stored.is_empty() {
            return Ok(());
        }
        let keys = request_keys(symbols, dates, &stored);
        let missing = self.missing_of(&keys);
        if missing.is_empty() {
            return Ok(());
        }

        let _gate = self.compute_gate.lock().expect("factor gate poisoned");
        let missing = self.missing_of(&missing);
        if missing.is_empty() {
            return Ok(());
        }
        let resolved = fetch_stored(store, &missing)?;
        self.merge(resolved);
        Ok(())
    }

    /// Resolve factor values for the full request keyset, reusing every
    /// cached entry and resolving only the missing subset.
    pub fn load_or_compute(
        &self,
        store: &dyn FactorStore,
        prices: &PriceTable,
        days: &[NaiveDate],
        symbols: &[Symbol],
        factors: &[FactorId],
    ) -> Result<FactorTable, FactorError> {
        let keys = request_keys(symbols, days, factors);
        let mut found: HashMap<FactorKey, f64> = HashMap::new();
        let mut missing: Vec<FactorKey> = Vec::new();
        self.partition(&keys, &mut found, &mut missing);

        if !missing.is_empty() {
            let _gate = self.compute_gate.lock().expect("factor gate poisoned");
            // Another request may have resolved part of the overlap while
            // we waited on the gate.
            let still_missing = {
                let mut still = Vec::new();
                self.partition(&missing, &mut found, &mut still);
                still
            };

            if !still_missing.is_empty() {
                tracing::debug!(
                    requested = keys.len(),
                    cached = keys.len() - still_missing.len(),
                    resolving = still_missing.len(),
                    "factor cache miss"
                );
                let (stored, derived): (Vec<_>, Vec<_>) = still_missing
                    .into_iter()
                    .partition(|(_, _, f)| f.stored_name().is_some());

                if !stored.is_empty() {
                    let resolved = fetch_stored(store, &stored)?;
                    for (key, value) in &resolved {
                        if let Some(v) = value {
                            found.insert(key.clone(), *v);
                        }
                    }
                    self.merge(resolved);
                }

                let mut resolved: Vec<(FactorKey, Option<f64>)> =
                    Vec::with_capacity(derived.len());
                for key in derived {
                    let (symbol, date, factor) = &key;
                    match derive(factor, prices, days, symbol, *date) {
                        Ok(value) => {
                            if let Some(v) = value {
                                found.insert(key.clone(), v);
                            }
                            resolved.push((key, value));
                        }
                        Err(err) => {
                            // Keep what already succeeded; one bad key must
                            // not invalidate other cache entries.
                            self.merge(resolved);
                            return Err(err);
                        }
                    }
                }
                self.merge(resolved);
            }
        }

        Ok(FactorTable { values: found })
    }

    /// Split `keys` into cached-with-value (into `found`) and absent
    /// (into `missing`); cached-as-missing keys fall into neither.
    fn partition(
        &self,
        keys: &[FactorKey],
        found: &mut HashMap<FactorKey, f64>,
        missing: &mut Vec<FactorKey>,
    ) {
        let cache = self.values.read().expect("factor cache lock poisoned");
        for key in keys {
            match cache.get(key) {
                Some(Some(v)) => {
                    found.insert(key.clone(), *v);
                }
                Some(None) => {}
                None => missing.push(key.clone()),
            }
        }
    }

    fn missing_of(&self, keys: &[FactorKey]) -> Vec<FactorKey> {
        let cache = self.values.read().expect("factor cache lock poisoned");
        keys.iter()
            .filter(|k| !cache.contains_key(*k))
            .cloned()
            .collect()
    }

    fn merge(&self, resolved: Vec<(FactorKey, Option<f64>)>) {
        if resolved.is_empty() {
            return;
        }
        let mut cache = self.values.write().expect("factor cache lock poisoned");
        for (key, value) in resolved {
            cache.insert(key, value);
        }
    }
}

fn request_keys(
    symbols: &[Symbol],
    dates: &[NaiveDate],
    factors: &[FactorId],
) -> Vec<FactorKey> {
    let mut keys = Vec::with_capacity(symbols.len() * dates.len() * factors.len());
    for factor in factors {
        for symbol in symbols {
            for &date in dates {
                keys.push((symbol.clone(), date, factor.clone()));
            }
        }
    }
    keys
}

/// Fetch the stored subset in a single store round trip and map every
/// requested key to its value (or known-missing).
fn fetch_stored(
    store: &dyn FactorStore,
    keys: &[FactorKey],
) -> Result<Vec<(FactorKey, Option<f64>)>, FactorError> {
    let mut symbols: Vec<Symbol> = Vec::new();
    let mut dates: Vec<NaiveDate> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut seen_symbols = HashSet::new();
    let mut seen_dates = HashSet::new();
    let mut seen_names = HashSet::new();
    for (symbol, date, factor) in keys {
        if seen_symbols.insert(symbol.clone()) {
            symbols.push(symbol.clone());
        }
        if seen_dates.insert(*date) {
            dates.push(*date);
        }
        if let Some(name) = factor.stored_name() {
            if seen_names.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }

    let rows = store.fetch_values(&symbols, &dates, &names)?;
    let mut by_key: HashMap<(Symbol, NaiveDate, String), f64> = HashMap::new();
    for row in rows {
        by_key.insert((row.symbol, row.date, row.name), row.value);
    }

    Ok(keys
        .iter()
        .map(|key| {
            let (symbol, date, factor) = key;
            let name = factor
                .stored_name()
                .expect("fetch_stored called with derived key");
            let value = by_key
                .get(&(symbol.clone(), *date, name.to_string()))
                .copied();
            (key.clone(), value)
        })
        .collect())
}

/// Compute a derived factor at one (symbol, date) from the price table.
///
/// Insufficient history or missing bars inside the window yield `None`
/// (no data); a date off the loaded trading-day axis is a compute error.
fn derive(
    factor: &FactorId,
    prices: &PriceTable,
    days: &[NaiveDate],
    symbol: &Symbol,
    date: NaiveDate,
) -> Result<Option<f64>, FactorError> {
    let idx = days.binary_search(&date).map_err(|_| FactorError::Compute {
        factor: factor.to_string(),
        symbol: symbol.clone(),
        date,
        reason: "date not on the loaded trading-day axis".to_string(),
    })?;

    match factor {
        FactorId::Momentum { window } => {
            if idx < *window {
                return Ok(None);
            }
            let now = prices.close(symbol, days[idx]);
            let then = prices.close(symbol, days[idx - window]);
            match (now, then) {
                (Some(c0), Some(cn)) if cn > 0.0 => Ok(Some(c0 / cn - 1.0)),
                _ => Ok(None),
            }
        }
        FactorId::Volatility { window } => {
            if idx < *window || *window < 2 {
                return Ok(None);
            }
            let mut closes = Vec::with_capacity(window + 1);
            for &day in &days[idx - window..=idx] {
                match prices.close(symbol, day) {
                    Some(c) if c > 0.0 => closes.push(c),
                    _ => return Ok(None),
                }
            }
            let returns: Vec<f64> = closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
                / (returns.len() - 1) as f64;
            Ok(Some(variance.sqrt()))
        }
        FactorId::Stored(name) => Err(FactorError::Compute {
            factor: name.clone(),
            symbol: symbol.clone(),
            date,
            reason: "stored factor has no derivation".to_string(),
        }),
    }
}
