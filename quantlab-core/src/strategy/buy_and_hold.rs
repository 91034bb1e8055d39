//! Buy a fixed quantity of one symbol and hold it.

use super::{Strategy, StrategyError, TargetPosition};
use crate::domain::{Ledger, Symbol};
use crate::engine::AsOfView;

pub struct BuyAndHold {
    symbol: Symbol,
    quantity: f64,
}

impl BuyAndHold {
    pub fn new(symbol: Symbol, quantity: f64) -> Self {
        Self { symbol, quantity }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn on_day(
        &mut self,
        _view: &AsOfView,
        _ledger: &Ledger,
    ) -> Result<Vec<TargetPosition>, StrategyError> {
        // The target is constant; once filled, the diff is zero. If the
        // symbol is suspended on the first day the order retries on the
        // next day with a bar.
        Ok(vec![TargetPosition {
            symbol: self.symbol.clone(),
            quantity: self.quantity,
        }])
    }
}
