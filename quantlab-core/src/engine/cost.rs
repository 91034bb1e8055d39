//! Cost model — slippage, commission, and stamp duty.
//!
//! Slippage is directional: buyers pay a higher price, sellers receive a
//! lower one. Commission is basis points with a per-fill minimum; stamp
//! duty applies to sells only.

use super::config::{CostParams, SlippageSpec};
use rand::rngs::StdRng;
use rand::Rng;

/// Priced components of one fill.
#[derive(Debug, Clone, PartialEq)]
pub struct CostedFill {
    /// Execution price after slippage.
    pub price: f64,
    pub commission: f64,
    pub stamp_duty: f64,
    /// Adverse slippage amount in currency.
    pub slippage: f64,
}

#[derive(Debug, Clone)]
pub struct CostModel {
    params: CostParams,
}

impl CostModel {
    pub fn new(params: CostParams) -> Self {
        Self { params }
    }

    pub fn frictionless() -> Self {
        Self::new(CostParams::frictionless())
    }

    /// Price a fill of signed `quantity` at raw reference price `raw_price`.
    ///
    /// The RNG is the run's seeded stream; only the jitter model draws
    /// from it, so fixed-slippage runs are RNG-independent.
    pub fn fill(&self, raw_price: f64, quantity: f64, rng: &mut StdRng) -> CostedFill {
        let bps = match self.params.slippage {
            SlippageSpec::Fixed { bps } => bps,
            SlippageSpec::Jitter {
                mean_bps,
                spread_bps,
            } => {
                if spread_bps > 0.0 {
                    rng.gen_range(mean_bps - spread_bps..=mean_bps + spread_bps)
                } else {
                    mean_bps
                }
            }
        };
        let slip_fraction = (bps / 10_000.0).max(0.0);

        let is_buy = quantity > 0.0;
        let price = if is_buy {
            raw_price * (1.0 + slip_fraction)
        } else {
            raw_price * (1.0 - slip_fraction)
        };
        let slippage = (price - raw_price).abs() * quantity.abs();

        let notional = quantity.abs() * price;
        let commission = if self.params.commission_bps > 0.0 || self.params.min_commission > 0.0
        {
            (notional * self.params.commission_bps / 10_000.0).max(self.params.min_commission)
        } else {
            0.0
        };
        let stamp_duty = if is_buy {
            0.0
        } else {
            notional * self.params.stamp_duty_bps / 10_000.0
        };

        CostedFill {
            price,
            commission,
            stamp_duty,
            slippage,
        }
    }
}
