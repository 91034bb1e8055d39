//! Parquet price store with Hive-style partitioning.
//!
//! Layout: `{root}/symbol={CODE}/{year}.parquet`
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Metadata sidecar per symbol (hash, date range, bar count)
//!
//! Reads serve the `PriceStore` batch interface; a symbol with no
//! partition simply contributes no rows (no data, not an error).

use super::price::{DataError, PriceStore, SymbolBar};
use crate::domain::{PriceBar, Symbol};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata sidecar for a stored symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub symbol: Symbol,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
}

/// The Parquet-backed price store.
pub struct ParquetPriceStore {
    root: PathBuf,
}

impl ParquetPriceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn symbol_dir(&self, symbol: &Symbol) -> PathBuf {
        self.root.join(format!("symbol={symbol}"))
    }

    fn year_path(&self, symbol: &Symbol, year: i32) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, symbol: &Symbol) -> PathBuf {
        self.symbol_dir(symbol).join("meta.json")
    }

    /// Write bars for a symbol, one Parquet file per year, atomically.
    pub fn write(&self, symbol: &Symbol, bars: &[PriceBar]) -> Result<(), DataError> {
        if bars.is_empty() {
            return Err(DataError::LoadFailed("no bars to store".to_string()));
        }
        let mut bars: Vec<PriceBar> = bars.to_vec();
        bars.sort_by_key(|b| b.date);

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir).map_err(|e| DataError::Io {
            path: sym_dir.display().to_string(),
            message: e.to_string(),
        })?;

        let mut by_year: HashMap<i32, Vec<&PriceBar>> = HashMap::new();
        for bar in &bars {
            by_year.entry(bar.date.year()).or_default().push(bar);
        }

        for (year, year_bars) in &by_year {
            let df = bars_to_dataframe(year_bars)?;
            let path = self.year_path(symbol, *year);
            let tmp_path = path.with_extension("parquet.tmp");

            write_parquet(&df, &tmp_path)?;
            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::Io {
                    path: path.display().to_string(),
                    message: format!("atomic rename failed: {e}"),
                }
            })?;
        }

        let meta = StoreMeta {
            symbol: symbol.clone(),
            start_date: bars.first().map(|b| b.date).unwrap_or_default(),
            end_date: bars.last().map(|b| b.date).unwrap_or_default(),
            bar_count: bars.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(&bars)
                    .map_err(|e| DataError::LoadFailed(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::LoadFailed(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(symbol), meta_json).map_err(|e| DataError::Io {
            path: self.meta_path(symbol).display().to_string(),
            message: e.to_string(),
        })?;

        Ok(())
    }

    /// Metadata sidecar for a symbol, if stored.
    pub fn meta(&self, symbol: &Symbol) -> Option<StoreMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Load all stored bars for one symbol, sorted ascending.
    fn load_symbol(&self, symbol: &Symbol) -> Result<Vec<PriceBar>, DataError> {
        let sym_dir = self.symbol_dir(symbol);
        if !sym_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&sym_dir).map_err(|e| DataError::Io {
            path: sym_dir.display().to_string(),
            message: e.to_string(),
        })?;

        let mut all_bars = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::Io {
                path: sym_dir.display().to_string(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }

            match load_and_validate_parquet(&path) {
                Ok(bars) => all_bars.extend(bars),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    tracing::warn!(
                        file = %path.display(),
                        error = %e,
                        "quarantining corrupt price partition"
                    );
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        all_bars.sort_by_key(|b| b.date);
        Ok(all_bars)
    }
}

impl PriceStore for ParquetPriceStore {
    fn fetch_bars(
        &self,
        symbols: &[Symbol],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SymbolBar>, DataError> {
        let mut rows = Vec::new();
        for symbol in symbols {
            for bar in self.load_symbol(symbol)? {
                if bar.date >= start && bar.date <= end {
                    rows.push(SymbolBar {
                        symbol: symbol.clone(),
                        bar,
                    });
                }
            }
        }
        Ok(rows)
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[&PriceBar]) -> Result<DataFrame, DataError> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
    let dates: Vec<i32> = bars
        .iter()
        .map(|b| (b.date - epoch).num_days() as i32)
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();
    let adj_factors: Vec<f64> = bars.iter().map(|b| b.adj_factor).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::Parquet(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("adj_factor".into(), adj_factors),
    ])
    .map_err(|e| DataError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file = fs::File::create(path).map_err(|e| DataError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<PriceBar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::Parquet("empty parquet file".to_string()));
    }

    let expected_cols = ["date", "open", "high", "low", "close", "volume", "adj_factor"];
    for col_name in &expected_cols {
        if df.column(col_name).is_err() {
            return Err(DataError::Parquet(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<PriceBar>, DataError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::Parquet(format!("column read: {e}")))
    };

    let date_ca = col("date")?
        .date()
        .map_err(|e| DataError::Parquet(format!("date column type: {e}")))?
        .clone();
    let open_ca = col("open")?
        .f64()
        .map_err(|e| DataError::Parquet(format!("open column type: {e}")))?
        .clone();
    let high_ca = col("high")?
        .f64()
        .map_err(|e| DataError::Parquet(format!("high column type: {e}")))?
        .clone();
    let low_ca = col("low")?
        .f64()
        .map_err(|e| DataError::Parquet(format!("low column type: {e}")))?
        .clone();
    let close_ca = col("close")?
        .f64()
        .map_err(|e| DataError::Parquet(format!("close column type: {e}")))?
        .clone();
    let vol_ca = col("volume")?
        .u64()
        .map_err(|e| DataError::Parquet(format!("volume column type: {e}")))?
        .clone();
    let adj_ca = col("adj_factor")?
        .f64()
        .map_err(|e| DataError::Parquet(format!("adj_factor column type: {e}")))?
        .clone();

    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
    let mut bars = Vec::with_capacity(df.height());

    for i in 0..df.height() {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| DataError::Parquet(format!("null date at row {i}")))?;
        let date = epoch + chrono::Duration::days(date_days as i64);

        bars.push(PriceBar {
            date,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
            adj_factor: adj_ca.get(i).unwrap_or(f64::NAN),
        });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_root() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir()
            .join(format!("quantlab_parquet_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sym() -> Symbol {
        Symbol::parse("000001.SZ").unwrap()
    }

    fn sample_bars() -> Vec<PriceBar> {
        vec![
            PriceBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                open: 10.0,
                high: 10.4,
                low: 9.9,
                close: 10.2,
                volume: 100_000,
                adj_factor: 1.0,
            },
            PriceBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                open: 10.2,
                high: 10.8,
                low: 10.1,
                close: 10.6,
                volume: 120_000,
                adj_factor: 1.0,
            },
        ]
    }

    #[test]
    fn write_and_fetch_roundtrip() {
        let root = temp_root();
        let store = ParquetPriceStore::new(&root);

        store.write(&sym(), &sample_bars()).unwrap();
        let rows = store
            .fetch_bars(
                &[sym()],
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].bar.close, 10.2);
        assert_eq!(rows[1].bar.volume, 120_000);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn unstored_symbol_contributes_no_rows() {
        let root = temp_root();
        let store = ParquetPriceStore::new(&root);
        let rows = store
            .fetch_bars(
                &[sym()],
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap();
        assert!(rows.is_empty());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn meta_sidecar_written() {
        let root = temp_root();
        let store = ParquetPriceStore::new(&root);
        store.write(&sym(), &sample_bars()).unwrap();

        let meta = store.meta(&sym()).unwrap();
        assert_eq!(meta.bar_count, 2);
        assert_eq!(
            meta.start_date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn corrupt_partition_quarantined() {
        let root = temp_root();
        let store = ParquetPriceStore::new(&root);
        store.write(&sym(), &sample_bars()).unwrap();

        let partition = store.year_path(&sym(), 2024);
        fs::write(&partition, b"not parquet").unwrap();

        let rows = store
            .fetch_bars(
                &[sym()],
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap();
        assert!(rows.is_empty());
        assert!(partition.with_extension("parquet.quarantined").exists());

        let _ = fs::remove_dir_all(&root);
    }
}
