//! Daily OHLCV bars and data-quality flags.

use super::symbol::Symbol;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily price bar.
///
/// `adj_factor` is the cumulative adjustment factor for splits/dividends;
/// the engine trades raw prices and leaves adjustment policy to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_factor: f64,
}

impl PriceBar {
    /// Check OHLC consistency. Violations are reported, never corrected.
    pub fn violations(&self) -> Vec<BarAnomalyKind> {
        let mut out = Vec::new();
        if !(self.open > 0.0 && self.high > 0.0 && self.low > 0.0 && self.close > 0.0) {
            out.push(BarAnomalyKind::NonPositivePrice);
        }
        if self.high < self.low {
            out.push(BarAnomalyKind::InvertedRange);
        } else if self.close < self.low || self.close > self.high {
            out.push(BarAnomalyKind::CloseOutsideRange);
        }
        out
    }
}

/// Kinds of data-quality violations detected at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarAnomalyKind {
    /// `high < low`.
    InvertedRange,
    /// `close` outside `[low, high]`.
    CloseOutsideRange,
    /// A price field is zero or negative.
    NonPositivePrice,
    /// A second bar arrived for the same (symbol, date); first bar kept.
    DuplicateBar,
}

/// A flagged data-quality violation, keyed for reproduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarAnomaly {
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub kind: BarAnomalyKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1000,
            adj_factor: 1.0,
        }
    }

    #[test]
    fn clean_bar_has_no_violations() {
        assert!(bar(10.0, 11.0, 9.5, 10.5).violations().is_empty());
    }

    #[test]
    fn inverted_range_flagged() {
        let v = bar(10.0, 9.0, 11.0, 10.0).violations();
        assert!(v.contains(&BarAnomalyKind::InvertedRange));
    }

    #[test]
    fn close_outside_range_flagged() {
        let v = bar(10.0, 11.0, 9.5, 12.0).violations();
        assert_eq!(v, vec![BarAnomalyKind::CloseOutsideRange]);
    }

    #[test]
    fn non_positive_price_flagged() {
        let v = bar(0.0, 11.0, 9.5, 10.0).violations();
        assert!(v.contains(&BarAnomalyKind::NonPositivePrice));
    }
}
