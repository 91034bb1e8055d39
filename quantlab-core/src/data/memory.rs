//! In-memory stores for tests, benches, and demos.
//!
//! Each store counts its fetch calls so tests can assert batch behavior
//! (one round trip per load, zero round trips on cache hits).

use super::factor::{FactorError, FactorRow, FactorStore};
use super::price::{DataError, PriceStore, SymbolBar};
use crate::calendar::{CalendarDay, CalendarError, CalendarStore};
use crate::domain::Symbol;
use chrono::{Datelike, NaiveDate, Weekday};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Calendar store serving a fixed day list.
pub struct StaticCalendarStore {
    days: Vec<CalendarDay>,
}

impl StaticCalendarStore {
    pub fn new(days: Vec<CalendarDay>) -> Self {
        Self { days }
    }

    /// A calendar open Monday–Friday over `[start, end]`.
    pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Self {
        let mut days = Vec::new();
        let mut d = start;
        while d <= end {
            let is_open = !matches!(d.weekday(), Weekday::Sat | Weekday::Sun);
            days.push(CalendarDay { date: d, is_open });
            d = d.succ_opt().expect("date overflow");
        }
        Self { days }
    }
}

impl CalendarStore for StaticCalendarStore {
    fn fetch_calendar(&self) -> Result<Vec<CalendarDay>, CalendarError> {
        Ok(self.days.clone())
    }
}

/// Price store serving fixed rows, counting fetches.
pub struct MemoryPriceStore {
    rows: Vec<SymbolBar>,
    fetches: AtomicUsize,
}

impl MemoryPriceStore {
    pub fn new(rows: Vec<SymbolBar>) -> Self {
        Self {
            rows,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl PriceStore for MemoryPriceStore {
    fn fetch_bars(
        &self,
        symbols: &[Symbol],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SymbolBar>, DataError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .iter()
            .filter(|r| {
                symbols.contains(&r.symbol) && r.bar.date >= start && r.bar.date <= end
            })
            .cloned()
            .collect())
    }
}

/// Factor store serving fixed rows, counting fetches. Can be configured to
/// fail, for exercising the `Loading → Failed` transition.
pub struct MemoryFactorStore {
    rows: Vec<FactorRow>,
    fetches: AtomicUsize,
    fail: bool,
}

impl MemoryFactorStore {
    pub fn new(rows: Vec<FactorRow>) -> Self {
        Self {
            rows,
            fetches: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            rows: Vec::new(),
            fetches: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl FactorStore for MemoryFactorStore {
    fn fetch_values(
        &self,
        symbols: &[Symbol],
        dates: &[NaiveDate],
        names: &[String],
    ) -> Result<Vec<FactorRow>, FactorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FactorError::StoreUnavailable(
                "memory store configured to fail".to_string(),
            ));
        }
        Ok(self
            .rows
            .iter()
            .filter(|r| {
                symbols.contains(&r.symbol)
                    && dates.contains(&r.date)
                    && names.contains(&r.name)
            })
            .cloned()
            .collect())
    }
}
