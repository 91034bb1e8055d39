//! Hold the top-N universe symbols ranked by a factor.

use super::{hold_targets, round_lot, Strategy, StrategyError, TargetPosition};
use crate::data::FactorId;
use crate::domain::{Ledger, Symbol};
use crate::engine::AsOfView;
use std::collections::HashMap;

pub struct FactorTopN {
    factor: FactorId,
    top_n: usize,
    rebalance_every: usize,
}

impl FactorTopN {
    pub fn new(factor: FactorId, top_n: usize, rebalance_every: usize) -> Self {
        Self {
            factor,
            top_n,
            rebalance_every,
        }
    }
}

impl Strategy for FactorTopN {
    fn name(&self) -> &str {
        "factor_top_n"
    }

    fn required_factors(&self) -> Vec<FactorId> {
        vec![self.factor.clone()]
    }

    fn on_day(
        &mut self,
        view: &AsOfView,
        ledger: &Ledger,
    ) -> Result<Vec<TargetPosition>, StrategyError> {
        if view.day_index() % self.rebalance_every != 0 {
            return Ok(hold_targets(ledger));
        }

        // Rank by factor value as of today; symbols without a value are
        // excluded from this rebalance.
        let mut ranked: Vec<(Symbol, f64)> = view
            .symbols()
            .iter()
            .filter_map(|s| view.factor(s, &self.factor).map(|v| (s.clone(), v)))
            .collect();
        // Ties break by symbol so the selection is deterministic.
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(self.top_n);

        if ranked.is_empty() {
            // No factor data yet (e.g. warmup of a derived window): hold.
            return Ok(hold_targets(ledger));
        }

        let mut marks: HashMap<Symbol, f64> = HashMap::new();
        for pos in ledger.positions() {
            if let Some(price) = view.last_close(&pos.symbol) {
                marks.insert(pos.symbol.clone(), price);
            }
        }
        let equity = ledger.equity(&marks);
        let per_slot = equity / ranked.len() as f64;

        let mut targets = Vec::with_capacity(ranked.len());
        for (symbol, _) in ranked {
            let Some(price) = view.last_close(&symbol) else {
                continue;
            };
            if price <= 0.0 {
                return Err(StrategyError::for_symbol(
                    symbol,
                    format!("non-positive mark price {price}"),
                ));
            }
            targets.push(TargetPosition {
                quantity: round_lot(per_slot / price),
                symbol,
            });
        }
        Ok(targets)
    }
}
