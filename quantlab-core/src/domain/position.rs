//! Position tracking.

use super::symbol::Symbol;
use serde::{Deserialize, Serialize};

/// An open position with weighted-average cost basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Signed quantity: positive long, negative short.
    pub quantity: f64,
    pub avg_cost: f64,
}

impl Position {
    pub fn new(symbol: Symbol, quantity: f64, avg_cost: f64) -> Self {
        Self {
            symbol,
            quantity,
            avg_cost,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() < 1e-9
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.avg_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym() -> Symbol {
        Symbol::parse("000001.SZ").unwrap()
    }

    #[test]
    fn market_value_and_pnl() {
        let pos = Position::new(sym(), 100.0, 10.0);
        assert_eq!(pos.market_value(11.0), 1100.0);
        assert_eq!(pos.unrealized_pnl(11.0), 100.0);
    }

    #[test]
    fn flat_detection() {
        assert!(Position::new(sym(), 0.0, 10.0).is_flat());
        assert!(!Position::new(sym(), 1.0, 10.0).is_flat());
    }
}
