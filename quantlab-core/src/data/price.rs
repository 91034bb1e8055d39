//! Price batch provider.
//!
//! `load_batch` retrieves every bar for a (symbol set, date range) in one
//! storage round trip and indexes it for O(1) per-(symbol, date) lookup
//! during replay. Legitimately missing bars (pre-listing dates,
//! suspensions) are "no data", never an error; the provider never
//! fabricates prices — any fill policy is the engine's decision.

use crate::domain::{BarAnomaly, BarAnomalyKind, PriceBar, Symbol};
use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;

/// One row returned by a price store.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolBar {
    pub symbol: Symbol,
    pub bar: PriceBar,
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("price store unreachable: {0}")]
    StoreUnavailable(String),

    #[error("price batch load failed: {0}")]
    LoadFailed(String),

    #[error("malformed price row: {0}")]
    Malformed(String),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("parquet error: {0}")]
    Parquet(String),
}

/// Read-only batch source of price bars.
///
/// `fetch_bars` is all-or-nothing: on storage failure no partial result is
/// returned, so the engine never simulates on incomplete data.
pub trait PriceStore: Send + Sync {
    fn fetch_bars(
        &self,
        symbols: &[Symbol],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SymbolBar>, DataError>;
}

/// Batch-loaded price data with O(1) (symbol, date) lookup.
#[derive(Debug)]
pub struct PriceTable {
    symbols: Vec<Symbol>,
    bars: HashMap<Symbol, HashMap<NaiveDate, PriceBar>>,
    anomalies: Vec<BarAnomaly>,
    start: NaiveDate,
    end: NaiveDate,
}

impl PriceTable {
    /// Load all bars for `symbols` over `[start, end]` in a single store
    /// round trip.
    pub fn load_batch(
        store: &dyn PriceStore,
        symbols: &[Symbol],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, DataError> {
        let rows = store.fetch_bars(symbols, start, end)?;
        let table = Self::from_rows(symbols, rows, start, end);
        tracing::debug!(
            symbols = symbols.len(),
            bars = table.bar_count(),
            anomalies = table.anomalies.len(),
            %start,
            %end,
            "price batch loaded"
        );
        Ok(table)
    }

    /// Index raw rows: first bar per (symbol, date) wins, duplicates and
    /// OHLC violations are flagged, rows outside the range are dropped.
    pub fn from_rows(
        symbols: &[Symbol],
        rows: Vec<SymbolBar>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        let mut bars: HashMap<Symbol, HashMap<NaiveDate, PriceBar>> = HashMap::new();
        let mut anomalies = Vec::new();

        for row in rows {
            if row.bar.date < start || row.bar.date > end {
                continue;
            }
            for kind in row.bar.violations() {
                anomalies.push(BarAnomaly {
                    symbol: row.symbol.clone(),
                    date: row.bar.date,
                    kind,
                });
            }
            let per_symbol = bars.entry(row.symbol.clone()).or_default();
            if per_symbol.contains_key(&row.bar.date) {
                anomalies.push(BarAnomaly {
                    symbol: row.symbol.clone(),
                    date: row.bar.date,
                    kind: BarAnomalyKind::DuplicateBar,
                });
                continue;
            }
            per_symbol.insert(row.bar.date, row.bar);
        }

        Self {
            symbols: symbols.to_vec(),
            bars,
            anomalies,
            start,
            end,
        }
    }

    /// O(1) lookup; `None` for legitimately missing bars.
    pub fn get(&self, symbol: &Symbol, date: NaiveDate) -> Option<&PriceBar> {
        self.bars.get(symbol)?.get(&date)
    }

    pub fn close(&self, symbol: &Symbol, date: NaiveDate) -> Option<f64> {
        self.get(symbol, date).map(|b| b.close)
    }

    /// The requested symbol universe, in request order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end)
    }

    /// Data-quality violations flagged at load time.
    pub fn anomalies(&self) -> &[BarAnomaly] {
        &self.anomalies
    }

    pub fn bar_count(&self) -> usize {
        self.bars.values().map(|m| m.len()).sum()
    }
}
