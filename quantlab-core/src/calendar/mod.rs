//! Trading calendar provider.
//!
//! A `CalendarStore` performs the single storage round trip; the
//! `TradingCalendar` provider caches the loaded `Calendar` process-wide so
//! repeated date queries cost O(1) after the first load. The cache is
//! refreshed only by explicit `invalidate` — a run pins an `Arc<Calendar>`
//! at load time and sees a stable calendar for its whole lifetime.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// One calendar row from the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_open: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalendarError {
    #[error("trading calendar unavailable: {0}")]
    Unavailable(String),

    #[error("calendar store returned no rows")]
    Empty,

    #[error("date {date} outside cached calendar coverage {first}..={last}")]
    OutOfCoverage {
        date: NaiveDate,
        first: NaiveDate,
        last: NaiveDate,
    },

    #[error("{date} is not a trading day")]
    NotTradingDay { date: NaiveDate },

    #[error("shifting {date} by {offset} trading days leaves cached coverage")]
    ShiftOutOfRange { date: NaiveDate, offset: i64 },
}

/// Read-only source of the full exchange calendar.
pub trait CalendarStore: Send + Sync {
    /// Fetch the complete calendar in one round trip.
    fn fetch_calendar(&self) -> Result<Vec<CalendarDay>, CalendarError>;
}

/// An immutable, loaded calendar with O(1) lookups.
#[derive(Debug)]
pub struct Calendar {
    /// Open trading days, strictly ascending.
    open_days: Vec<NaiveDate>,
    /// Open day → position in `open_days`.
    index: HashMap<NaiveDate, usize>,
    first: NaiveDate,
    last: NaiveDate,
}

impl Calendar {
    fn from_days(mut days: Vec<CalendarDay>) -> Result<Self, CalendarError> {
        if days.is_empty() {
            return Err(CalendarError::Empty);
        }
        days.sort_by_key(|d| d.date);
        days.dedup_by_key(|d| d.date);

        let first = days.first().map(|d| d.date).ok_or(CalendarError::Empty)?;
        let last = days.last().map(|d| d.date).ok_or(CalendarError::Empty)?;

        let open_days: Vec<NaiveDate> =
            days.iter().filter(|d| d.is_open).map(|d| d.date).collect();
        let index = open_days
            .iter()
            .enumerate()
            .map(|(i, &d)| (d, i))
            .collect();

        Ok(Self {
            open_days,
            index,
            first,
            last,
        })
    }

    /// Inclusive coverage of the cached calendar (open and closed days).
    pub fn coverage(&self) -> (NaiveDate, NaiveDate) {
        (self.first, self.last)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first && date <= self.last
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.index.contains_key(&date)
    }

    /// Open trading days within `[start, end]`, strictly ascending.
    ///
    /// `start` and `end` need not be trading days themselves, but must lie
    /// within cached coverage.
    pub fn trading_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<&[NaiveDate], CalendarError> {
        for date in [start, end] {
            if !self.contains(date) {
                return Err(CalendarError::OutOfCoverage {
                    date,
                    first: self.first,
                    last: self.last,
                });
            }
        }
        let lo = self.open_days.partition_point(|&d| d < start);
        let hi = self.open_days.partition_point(|&d| d <= end);
        Ok(&self.open_days[lo..hi])
    }

    /// Shift a trading day by `n` trading days (negative = backwards).
    pub fn shift(&self, date: NaiveDate, n: i64) -> Result<NaiveDate, CalendarError> {
        let idx = *self
            .index
            .get(&date)
            .ok_or(CalendarError::NotTradingDay { date })?;
        let target = idx as i64 + n;
        if target < 0 || target >= self.open_days.len() as i64 {
            return Err(CalendarError::ShiftOutOfRange { date, offset: n });
        }
        Ok(self.open_days[target as usize])
    }

    pub fn open_day_count(&self) -> usize {
        self.open_days.len()
    }
}

/// Process-wide cached calendar provider.
pub struct TradingCalendar {
    store: Box<dyn CalendarStore>,
    cache: RwLock<Option<Arc<Calendar>>>,
}

impl TradingCalendar {
    pub fn new(store: Box<dyn CalendarStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
        }
    }

    /// The cached calendar, loading it on first use.
    pub fn snapshot(&self) -> Result<Arc<Calendar>, CalendarError> {
        if let Some(cal) = self
            .cache
            .read()
            .expect("calendar cache lock poisoned")
            .as_ref()
        {
            return Ok(Arc::clone(cal));
        }

        let mut guard = self.cache.write().expect("calendar cache lock poisoned");
        // Another thread may have loaded while we waited for the write lock.
        if let Some(cal) = guard.as_ref() {
            return Ok(Arc::clone(cal));
        }

        let days = self.store.fetch_calendar()?;
        let calendar = Arc::new(Calendar::from_days(days)?);
        tracing::info!(
            open_days = calendar.open_day_count(),
            coverage = ?calendar.coverage(),
            "trading calendar loaded"
        );
        *guard = Some(Arc::clone(&calendar));
        Ok(calendar)
    }

    /// Drop the cached calendar; the next query reloads from the store.
    /// Runs holding an `Arc` snapshot are unaffected.
    pub fn invalidate(&self) {
        *self.cache.write().expect("calendar cache lock poisoned") = None;
        tracing::info!("trading calendar cache invalidated");
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        Ok(self.snapshot()?.is_trading_day(date))
    }

    pub fn trading_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, CalendarError> {
        Ok(self.snapshot()?.trading_days(start, end)?.to_vec())
    }

    pub fn shift(&self, date: NaiveDate, n: i64) -> Result<NaiveDate, CalendarError> {
        self.snapshot()?.shift(date, n)
    }
}
