//! Batch data providers and caches feeding the engine.
//!
//! All storage access goes through the read-only batch traits
//! (`PriceStore`, `FactorStore`, plus `CalendarStore` in `calendar`); the
//! engine never issues per-row queries during simulation.

pub mod csv_store;
pub mod factor;
pub mod memory;
pub mod parquet_store;
pub mod price;

pub use csv_store::CsvMarketStore;
pub use factor::{
    FactorCache, FactorError, FactorId, FactorRow, FactorStore, FactorTable, NullFactorStore,
};
pub use memory::{MemoryFactorStore, MemoryPriceStore, StaticCalendarStore};
pub use parquet_store::ParquetPriceStore;
pub use price::{DataError, PriceStore, PriceTable, SymbolBar};
