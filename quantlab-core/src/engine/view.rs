//! As-of market view.
//!
//! The strategy's only window onto market data. Construction truncates the
//! trading-day axis at the current day, and every lookup rejects dates past
//! it, so look-ahead is impossible by construction rather than convention.

use crate::data::{FactorId, FactorTable, PriceTable};
use crate::domain::{PriceBar, Symbol};
use chrono::NaiveDate;

/// Read-only projection of price/factor data restricted to dates ≤ the
/// currently simulated day.
pub struct AsOfView<'a> {
    days: &'a [NaiveDate],
    day_index: usize,
    prices: &'a PriceTable,
    factors: &'a FactorTable,
}

impl<'a> AsOfView<'a> {
    /// Pin a view at `days[day_index]`. Data past that day is unreachable
    /// through any accessor, whatever the underlying tables contain.
    pub fn new(
        days: &'a [NaiveDate],
        day_index: usize,
        prices: &'a PriceTable,
        factors: &'a FactorTable,
    ) -> Self {
        debug_assert!(day_index < days.len());
        Self {
            days,
            day_index,
            prices,
            factors,
        }
    }

    /// The currently simulated day.
    pub fn date(&self) -> NaiveDate {
        self.days[self.day_index]
    }

    /// Zero-based index of the current day within the run.
    pub fn day_index(&self) -> usize {
        self.day_index
    }

    /// The symbol universe of the run.
    pub fn symbols(&self) -> &[Symbol] {
        self.prices.symbols()
    }

    /// Trading days elapsed so far, including today.
    pub fn trading_days(&self) -> &[NaiveDate] {
        &self.days[..=self.day_index]
    }

    /// Bar for a (symbol, date); `None` for missing data or any date after
    /// the current day.
    pub fn bar(&self, symbol: &Symbol, date: NaiveDate) -> Option<&PriceBar> {
        if date > self.date() {
            return None;
        }
        self.prices.get(symbol, date)
    }

    /// Today's bar.
    pub fn today(&self, symbol: &Symbol) -> Option<&PriceBar> {
        self.prices.get(symbol, self.date())
    }

    /// Today's close.
    pub fn close(&self, symbol: &Symbol) -> Option<f64> {
        self.today(symbol).map(|b| b.close)
    }

    /// Most recent close at or before today (carry across suspensions).
    pub fn last_close(&self, symbol: &Symbol) -> Option<f64> {
        self.trading_days()
            .iter()
            .rev()
            .find_map(|&d| self.prices.close(symbol, d))
    }

    /// Factor value for today.
    pub fn factor(&self, symbol: &Symbol, factor: &FactorId) -> Option<f64> {
        self.factors.get(symbol, self.date(), factor)
    }

    /// Factor value on an elapsed day; `None` for any date after today.
    pub fn factor_on(
        &self,
        symbol: &Symbol,
        factor: &FactorId,
        date: NaiveDate,
    ) -> Option<f64> {
        if date > self.date() {
            return None;
        }
        self.factors.get(symbol, date, factor)
    }
}
