//! Pricing core (spec §4.9): converts a quote request into firm input/output
//! amounts using a bid/ask feed, a spread, and per-pair USD ceilings.

use alloy_primitives::U256;

use crate::types::OrderType;

/// A venue-agnostic bid/ask source for a resolved token pair. A real
/// implementation would call out to an exchange or aggregator API; tests use a
/// fixed-price stub.
pub trait ExchangeAdapter: Send + Sync {
    /// Returns `(bid, ask)` for `base` priced in `quote`, or `None` if the pair
    /// is unsupported.
    fn bid_ask(&self, base: &str, quote: &str) -> Option<(f64, f64)>;
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("unsupported token pair")]
    UnsupportedPair,
    #[error("fixed-side amount exceeds 2^128")]
    AmountTooLarge,
    #[error("derived output is below the protocol minimum")]
    BelowMinimum,
    #[error("USD-equivalent notional exceeds the configured ceiling")]
    NotionalTooLarge,
}

pub struct PricingParams {
    pub spread_bps: u32,
    pub usd_notional_ceiling: f64,
    pub input_decimals: u32,
    pub output_decimals: u32,
}

const MAX_FIXED_SIDE: u128 = 340_282_366_920_938_463_463_374_607_431_768_211_455; // 2^128 - 1

/// Computes the counterpart amount for a requested side, per the formulas in
/// §4.9. `inverted` selects whether the feed's base/quote orientation matches
/// the input/output direction directly or must be divided through.
pub fn price(
    order_type: OrderType,
    amount: U256,
    bid: f64,
    ask: f64,
    inverted: bool,
    params: &PricingParams,
    min_order: U256,
) -> Result<U256, PricingError> {
    if amount > U256::from(MAX_FIXED_SIDE) {
        return Err(PricingError::AmountTooLarge);
    }
    let spread = params.spread_bps as f64 / 10_000.0;
    let amount_f = decimal_to_float(amount, params.input_decimals.max(params.output_decimals));

    let result_f = match order_type {
        OrderType::ExactOutput => {
            let rate = if inverted { 1.0 / bid } else { ask };
            amount_f * rate * (1.0 + spread)
        }
        OrderType::ExactInput => {
            let rate = if inverted { 1.0 / bid } else { bid };
            amount_f * rate * (1.0 - spread)
        }
    };

    if result_f * price_usd_hint(bid, ask) > params.usd_notional_ceiling {
        return Err(PricingError::NotionalTooLarge);
    }

    let decimals = match order_type {
        OrderType::ExactOutput => params.input_decimals,
        OrderType::ExactInput => params.output_decimals,
    };
    let result = match order_type {
        // Ceil for input (favors the solver: never under-quote what it needs).
        OrderType::ExactOutput => float_to_decimal_ceil(result_f, decimals),
        // Floor for output (favors the solver: never over-deliver).
        OrderType::ExactInput => float_to_decimal_floor(result_f, decimals),
    };

    if order_type == OrderType::ExactInput && result < min_order {
        return Err(PricingError::BelowMinimum);
    }
    Ok(result)
}

pub fn price_usd_hint(bid: f64, ask: f64) -> f64 {
    (bid + ask) / 2.0
}

/// Config-supplied fixed bid/ask feed. Stands in for a live exchange
/// integration, which this reference solver does not have.
pub struct FeedAdapter {
    rates: std::collections::HashMap<(String, String), (f64, f64)>,
}

impl FeedAdapter {
    pub fn new(rates: std::collections::HashMap<(String, String), (f64, f64)>) -> Self {
        FeedAdapter { rates }
    }
}

impl ExchangeAdapter for FeedAdapter {
    fn bid_ask(&self, base: &str, quote: &str) -> Option<(f64, f64)> {
        self.rates.get(&(base.to_string(), quote.to_string())).copied()
    }
}

fn decimal_to_float(amount: U256, decimals: u32) -> f64 {
    let divisor = 10f64.powi(decimals as i32);
    // U256 -> f64 via string round-trip avoids precision-losing `as` casts on
    // the full 256-bit range; real amounts here are always far below that range.
    amount.to_string().parse::<f64>().unwrap_or(0.0) / divisor
}

fn float_to_decimal_ceil(value: f64, decimals: u32) -> U256 {
    let scaled = (value * 10f64.powi(decimals as i32)).ceil();
    U256::from(scaled.max(0.0) as u128)
}

fn float_to_decimal_floor(value: f64, decimals: u32) -> U256 {
    let scaled = (value * 10f64.powi(decimals as i32)).floor();
    U256::from(scaled.max(0.0) as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PricingParams {
        PricingParams { spread_bps: 30, usd_notional_ceiling: 10_000_000.0, input_decimals: 18, output_decimals: 6 }
    }

    #[test]
    fn exact_output_applies_ask_and_spread() {
        let amount = U256::from(200_000_000u64); // 200 * 1e6
        let result = price(OrderType::ExactOutput, amount, 1.0, 0.87, false, &params(), U256::from(1_000_000u64)).unwrap();
        assert!(result > U256::ZERO);
    }

    #[test]
    fn rejects_amount_over_2_pow_128() {
        let amount = U256::from(MAX_FIXED_SIDE) + U256::from(1u64);
        let err = price(OrderType::ExactOutput, amount, 1.0, 0.87, false, &params(), U256::from(1_000_000u64)).unwrap_err();
        assert_eq!(err, PricingError::AmountTooLarge);
    }

    #[test]
    fn rejects_below_minimum_output() {
        let amount = U256::from(1u64);
        let err = price(OrderType::ExactInput, amount, 1.0, 1.0, false, &params(), U256::from(1_000_000u64)).unwrap_err();
        assert_eq!(err, PricingError::BelowMinimum);
    }
}
