//! Portfolio ledger — cash, positions, and realized P&L.
//!
//! Pure in-memory state, mutated only by fill events from the engine loop.
//! The accounting identity `cash + Σ(position market value) == equity` must
//! hold at every snapshot; marking to market never changes cash.

use super::fill::Fill;
use super::position::Position;
use super::symbol::Symbol;
use std::collections::{BTreeMap, HashMap};

const QTY_EPS: f64 = 1e-9;

/// Aggregate portfolio state for one backtest run.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub cash: f64,
    pub initial_cash: f64,
    positions: BTreeMap<Symbol, Position>,
    pub realized_pnl: f64,
    pub total_commission: f64,
    pub total_stamp_duty: f64,
    pub total_slippage: f64,
}

impl Ledger {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            initial_cash,
            positions: BTreeMap::new(),
            realized_pnl: 0.0,
            total_commission: 0.0,
            total_stamp_duty: 0.0,
            total_slippage: 0.0,
        }
    }

    /// Apply a fill: move cash, update the weighted-average cost basis,
    /// realize P&L on any reduction. A position reaching zero quantity is
    /// removed.
    pub fn apply_fill(&mut self, fill: &Fill) {
        self.cash -= fill.quantity * fill.price;
        self.cash -= fill.commission + fill.stamp_duty;
        self.total_commission += fill.commission;
        self.total_stamp_duty += fill.stamp_duty;
        self.total_slippage += fill.slippage;

        let pos = self
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position::new(fill.symbol.clone(), 0.0, 0.0));

        if pos.quantity * fill.quantity >= 0.0 {
            // Same direction (or opening): weighted-average cost.
            let new_qty = pos.quantity + fill.quantity;
            if new_qty.abs() > QTY_EPS {
                pos.avg_cost =
                    (pos.avg_cost * pos.quantity + fill.price * fill.quantity) / new_qty;
            }
            pos.quantity = new_qty;
        } else {
            // Reducing or crossing through zero.
            let direction = pos.quantity.signum();
            let closed = fill.quantity.abs().min(pos.quantity.abs());
            self.realized_pnl += (fill.price - pos.avg_cost) * closed * direction;

            let new_qty = pos.quantity + fill.quantity;
            if new_qty.signum() == direction && new_qty.abs() > QTY_EPS {
                pos.quantity = new_qty;
            } else {
                // Flat, or flipped: the remainder opens at the fill price.
                pos.quantity = new_qty;
                pos.avg_cost = fill.price;
            }
        }

        if pos.is_flat() {
            self.positions.remove(&fill.symbol);
        }
    }

    /// Open (non-flat) position for a symbol.
    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol).filter(|p| !p.is_flat())
    }

    /// Signed quantity held, zero when flat.
    pub fn quantity(&self, symbol: &Symbol) -> f64 {
        self.position(symbol).map_or(0.0, |p| p.quantity)
    }

    /// All open positions, in symbol order.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Total equity = cash + Σ position market value.
    ///
    /// Symbols absent from `prices` are valued at average cost, matching
    /// the engine's carry-forward for suspended instruments.
    pub fn equity(&self, prices: &HashMap<Symbol, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = prices.get(&pos.symbol).copied().unwrap_or(pos.avg_cost);
                pos.market_value(price)
            })
            .sum();
        self.cash + position_value
    }
}
