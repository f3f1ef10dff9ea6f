//! Compute budget derivation
//!
//! The unit limit comes from simulation with a floor and a 10% margin; the
//! unit price comes verbatim from the fee estimate.

use serde::Serialize;

/// Smallest unit limit ever requested
pub const MIN_COMPUTE_UNIT_LIMIT: u32 = 1_000;

/// Safety margin numerator/denominator (110%)
const MARGIN_NUMERATOR: u64 = 11;
const MARGIN_DENOMINATOR: u64 = 10;

/// Priced rate and unit ceiling applied to a final message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComputeBudget {
    /// Micro-lamports per compute unit
    pub unit_price_micro_lamports: u64,
    /// Maximum compute units the transaction may consume
    pub unit_limit: u32,
}

impl ComputeBudget {
    /// Derive a budget from the two estimates
    pub fn from_estimates(priority_fee_micro_lamports: u64, simulated_units: u64) -> Self {
        Self {
            unit_price_micro_lamports: priority_fee_micro_lamports,
            unit_limit: derive_compute_unit_limit(simulated_units),
        }
    }

    /// Upper bound of the priority fee in lamports (price * limit / 1e6, rounded up)
    pub fn max_priority_fee_lamports(&self) -> u64 {
        let micro = (self.unit_price_micro_lamports as u128) * (self.unit_limit as u128);
        let lamports = micro.div_ceil(1_000_000);
        u64::try_from(lamports).unwrap_or(u64::MAX)
    }
}

/// `max(1000, ceil(units * 1.1))` in exact integer arithmetic
///
/// Float math would round 2000 * 1.1 up to 2201; this returns 2200.
pub fn derive_compute_unit_limit(simulated_units: u64) -> u32 {
    let with_margin = (simulated_units as u128 * MARGIN_NUMERATOR as u128)
        .div_ceil(MARGIN_DENOMINATOR as u128);
    let limit = u32::try_from(with_margin).unwrap_or(u32::MAX);
    limit.max(MIN_COMPUTE_UNIT_LIMIT)
}
