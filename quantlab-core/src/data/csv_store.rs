//! Flat-file market data store.
//!
//! Layout under one data directory:
//! - `calendar.csv` — `date,is_open`
//! - `prices.csv` — `symbol,date,open,high,low,close,volume,adj_factor`
//! - `factors.csv` — `symbol,date,factor,value` (optional; absent means no
//!   stored factors)
//!
//! One file read per batch call; filtering happens in memory.

use super::factor::{FactorError, FactorRow, FactorStore};
use super::price::{DataError, PriceStore, SymbolBar};
use crate::calendar::{CalendarDay, CalendarError, CalendarStore};
use crate::domain::{PriceBar, Symbol};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CSV-backed calendar/price/factor store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct CsvMarketStore {
    dir: PathBuf,
}

impl CsvMarketStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn calendar_path(&self) -> PathBuf {
        self.dir.join("calendar.csv")
    }

    fn prices_path(&self) -> PathBuf {
        self.dir.join("prices.csv")
    }

    fn factors_path(&self) -> PathBuf {
        self.dir.join("factors.csv")
    }

    /// Every distinct symbol in `prices.csv`, in first-seen order.
    pub fn list_symbols(&self) -> Result<Vec<Symbol>, DataError> {
        let path = self.prices_path();
        let mut reader = csv::Reader::from_path(&path).map_err(|e| DataError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut symbols = Vec::new();
        for record in reader.deserialize::<PriceRecord>() {
            let record = record.map_err(|e| DataError::Malformed(e.to_string()))?;
            let symbol = Symbol::parse(&record.symbol)
                .map_err(|e| DataError::Malformed(e.to_string()))?;
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        Ok(symbols)
    }
}

#[derive(Debug, Deserialize)]
struct CalendarRecord {
    date: NaiveDate,
    is_open: bool,
}

#[derive(Debug, Deserialize)]
struct PriceRecord {
    symbol: String,
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
    adj_factor: f64,
}

#[derive(Debug, Deserialize)]
struct FactorRecord {
    symbol: String,
    date: NaiveDate,
    factor: String,
    value: f64,
}

impl CalendarStore for CsvMarketStore {
    fn fetch_calendar(&self) -> Result<Vec<CalendarDay>, CalendarError> {
        let path = self.calendar_path();
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| CalendarError::Unavailable(format!("{}: {e}", path.display())))?;

        let mut days = Vec::new();
        for record in reader.deserialize::<CalendarRecord>() {
            let record =
                record.map_err(|e| CalendarError::Unavailable(format!("bad row: {e}")))?;
            days.push(CalendarDay {
                date: record.date,
                is_open: record.is_open,
            });
        }
        Ok(days)
    }
}

impl PriceStore for CsvMarketStore {
    fn fetch_bars(
        &self,
        symbols: &[Symbol],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SymbolBar>, DataError> {
        let path = self.prices_path();
        let mut reader = csv::Reader::from_path(&path).map_err(|e| DataError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut rows = Vec::new();
        for record in reader.deserialize::<PriceRecord>() {
            let record = record.map_err(|e| DataError::Malformed(e.to_string()))?;
            let symbol = Symbol::parse(&record.symbol)
                .map_err(|e| DataError::Malformed(e.to_string()))?;
            if record.date < start || record.date > end || !symbols.contains(&symbol) {
                continue;
            }
            rows.push(SymbolBar {
                symbol,
                bar: PriceBar {
                    date: record.date,
                    open: record.open,
                    high: record.high,
                    low: record.low,
                    close: record.close,
                    volume: record.volume,
                    adj_factor: record.adj_factor,
                },
            });
        }
        Ok(rows)
    }
}

impl FactorStore for CsvMarketStore {
    fn fetch_values(
        &self,
        symbols: &[Symbol],
        dates: &[NaiveDate],
        names: &[String],
    ) -> Result<Vec<FactorRow>, FactorError> {
        let path = self.factors_path();
        if !path.exists() {
            // No stored factors is a legitimate deployment.
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| FactorError::FetchFailed(format!("{}: {e}", path.display())))?;

        let mut rows = Vec::new();
        for record in reader.deserialize::<FactorRecord>() {
            let record = record.map_err(|e| FactorError::FetchFailed(e.to_string()))?;
            let symbol = Symbol::parse(&record.symbol)
                .map_err(|e| FactorError::FetchFailed(e.to_string()))?;
            if !symbols.contains(&symbol)
                || !dates.contains(&record.date)
                || !names.contains(&record.factor)
            {
                continue;
            }
            rows.push(FactorRow {
                symbol,
                date: record.date,
                name: record.factor,
                value: record.value,
            });
        }
        Ok(rows)
    }
}
