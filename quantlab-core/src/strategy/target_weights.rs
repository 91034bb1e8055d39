//! Periodic rebalance to fixed portfolio weights.

use super::{hold_targets, round_lot, Strategy, StrategyError, TargetPosition};
use crate::domain::{Ledger, Symbol};
use crate::engine::AsOfView;
use std::collections::{BTreeMap, HashMap};

pub struct TargetWeights {
    weights: BTreeMap<Symbol, f64>,
    rebalance_every: usize,
}

impl TargetWeights {
    pub fn new(weights: BTreeMap<Symbol, f64>, rebalance_every: usize) -> Self {
        Self {
            weights,
            rebalance_every,
        }
    }
}

impl Strategy for TargetWeights {
    fn name(&self) -> &str {
        "target_weights"
    }

    fn on_day(
        &mut self,
        view: &AsOfView,
        ledger: &Ledger,
    ) -> Result<Vec<TargetPosition>, StrategyError> {
        if view.day_index() % self.rebalance_every != 0 {
            return Ok(hold_targets(ledger));
        }

        // Size against current equity at the latest visible closes.
        let mut marks: HashMap<Symbol, f64> = HashMap::new();
        for pos in ledger.positions() {
            if let Some(price) = view.last_close(&pos.symbol) {
                marks.insert(pos.symbol.clone(), price);
            }
        }
        let equity = ledger.equity(&marks);

        let mut targets = Vec::with_capacity(self.weights.len());
        for (symbol, weight) in &self.weights {
            let Some(price) = view.last_close(symbol) else {
                // No visible price yet (pre-listing or suspended since the
                // range began): keep whatever is held.
                let held = ledger.quantity(symbol);
                if held != 0.0 {
                    targets.push(TargetPosition {
                        symbol: symbol.clone(),
                        quantity: held,
                    });
                }
                continue;
            };
            if price <= 0.0 {
                return Err(StrategyError::for_symbol(
                    symbol.clone(),
                    format!("non-positive mark price {price}"),
                ));
            }
            targets.push(TargetPosition {
                symbol: symbol.clone(),
                quantity: round_lot(equity * weight / price),
            });
        }
        Ok(targets)
    }
}
