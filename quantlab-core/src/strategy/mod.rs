//! Strategy interface and the tagged-kind factory.
//!
//! A strategy is a pure decision function over the as-of view and the
//! current ledger; it has no access to any other data source. The set of
//! available strategies is a closed enum resolved through one factory,
//! rather than open-ended string dispatch.

mod buy_and_hold;
mod factor_top_n;
mod target_weights;

pub use buy_and_hold::BuyAndHold;
pub use factor_top_n::FactorTopN;
pub use target_weights::TargetWeights;

use crate::data::{FactorError, FactorId};
use crate::domain::{Ledger, Symbol};
use crate::engine::AsOfView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A-share board lot.
pub const LOT_SIZE: f64 = 100.0;

/// Round a share quantity down to a whole board lot.
pub fn round_lot(quantity: f64) -> f64 {
    (quantity / LOT_SIZE).floor() * LOT_SIZE
}

/// Desired absolute position after today's trading.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPosition {
    pub symbol: Symbol,
    pub quantity: f64,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct StrategyError {
    pub message: String,
    pub symbol: Option<Symbol>,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            symbol: None,
        }
    }

    pub fn for_symbol(symbol: Symbol, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            symbol: Some(symbol),
        }
    }
}

/// A trading strategy's decision step.
///
/// The returned targets are the complete desired portfolio: a held symbol
/// omitted from the list is closed. Strategies must not consult any data
/// source beyond the view and the ledger.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Factors the engine must batch-load before the run starts.
    fn required_factors(&self) -> Vec<FactorId> {
        Vec::new()
    }

    fn on_day(
        &mut self,
        view: &AsOfView,
        ledger: &Ledger,
    ) -> Result<Vec<TargetPosition>, StrategyError>;
}

/// Targets that keep the current book unchanged.
pub(crate) fn hold_targets(ledger: &Ledger) -> Vec<TargetPosition> {
    ledger
        .positions()
        .map(|p| TargetPosition {
            symbol: p.symbol.clone(),
            quantity: p.quantity,
        })
        .collect()
}

/// Configured strategy kind; the serialized form is what run requests carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyKind {
    /// Buy a fixed quantity of one symbol and hold it.
    BuyAndHold { symbol: Symbol, quantity: f64 },
    /// Rebalance to fixed portfolio weights every `rebalance_every` days.
    TargetWeights {
        weights: BTreeMap<Symbol, f64>,
        rebalance_every: usize,
    },
    /// Hold the `top_n` universe symbols ranked by a factor, equal weight,
    /// rebalanced every `rebalance_every` days.
    FactorTopN {
        factor: String,
        top_n: usize,
        rebalance_every: usize,
    },
}

#[derive(Debug, Error)]
pub enum StrategyBuildError {
    #[error("invalid strategy parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Factor(#[from] FactorError),
}

/// Resolve a configured kind into a runnable strategy.
pub fn build_strategy(kind: &StrategyKind) -> Result<Box<dyn Strategy>, StrategyBuildError> {
    match kind {
        StrategyKind::BuyAndHold { symbol, quantity } => {
            if !(*quantity > 0.0) {
                return Err(StrategyBuildError::InvalidParameter(format!(
                    "buy_and_hold quantity must be positive, got {quantity}"
                )));
            }
            Ok(Box::new(BuyAndHold::new(symbol.clone(), *quantity)))
        }
        StrategyKind::TargetWeights {
            weights,
            rebalance_every,
        } => {
            if weights.is_empty() {
                return Err(StrategyBuildError::InvalidParameter(
                    "target_weights needs at least one weight".to_string(),
                ));
            }
            if *rebalance_every == 0 {
                return Err(StrategyBuildError::InvalidParameter(
                    "rebalance_every must be at least 1".to_string(),
                ));
            }
            let total: f64 = weights.values().sum();
            if total > 1.0 + 1e-9 || weights.values().any(|w| *w < 0.0) {
                return Err(StrategyBuildError::InvalidParameter(format!(
                    "weights must be non-negative and sum to at most 1, got {total}"
                )));
            }
            Ok(Box::new(TargetWeights::new(
                weights.clone(),
                *rebalance_every,
            )))
        }
        StrategyKind::FactorTopN {
            factor,
            top_n,
            rebalance_every,
        } => {
            if *top_n == 0 || *rebalance_every == 0 {
                return Err(StrategyBuildError::InvalidParameter(
                    "top_n and rebalance_every must be at least 1".to_string(),
                ));
            }
            let factor = FactorId::parse(factor)?;
            Ok(Box::new(FactorTopN::new(factor, *top_n, *rebalance_every)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_lot_floors() {
        assert_eq!(round_lot(199.0), 100.0);
        assert_eq!(round_lot(200.0), 200.0);
        assert_eq!(round_lot(99.0), 0.0);
    }

    #[test]
    fn factory_resolves_each_kind() {
        let sym = Symbol::parse("000001.SZ").unwrap();
        let kinds = [
            StrategyKind::BuyAndHold {
                symbol: sym.clone(),
                quantity: 100.0,
            },
            StrategyKind::TargetWeights {
                weights: BTreeMap::from([(sym, 0.5)]),
                rebalance_every: 5,
            },
            StrategyKind::FactorTopN {
                factor: "momentum_20".to_string(),
                top_n: 3,
                rebalance_every: 5,
            },
        ];
        for kind in &kinds {
            assert!(build_strategy(kind).is_ok());
        }
    }

    #[test]
    fn factory_rejects_bad_parameters() {
        let sym = Symbol::parse("000001.SZ").unwrap();
        assert!(build_strategy(&StrategyKind::BuyAndHold {
            symbol: sym.clone(),
            quantity: 0.0,
        })
        .is_err());
        assert!(build_strategy(&StrategyKind::FactorTopN {
            factor: "momentum_0".to_string(),
            top_n: 3,
            rebalance_every: 5,
        })
        .is_err());
        assert!(build_strategy(&StrategyKind::TargetWeights {
            weights: BTreeMap::from([(sym, 1.5)]),
            rebalance_every: 5,
        })
        .is_err());
    }

    #[test]
    fn strategy_kind_toml_round_trip() {
        let toml_str = "type = \"factor_top_n\"\nfactor = \"momentum_20\"\ntop_n = 3\nrebalance_every = 5\n";
        let kind: StrategyKind = toml::from_str(toml_str).unwrap();
        assert_eq!(
            kind,
            StrategyKind::FactorTopN {
                factor: "momentum_20".to_string(),
                top_n: 3,
                rebalance_every: 5,
            }
        );
    }
}
