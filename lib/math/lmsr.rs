//! Logarithmic Market Scoring Rule pricing for binary markets.
//!
//! Pure math, no I/O. The cost function is
//! `C(q_yes, q_no) = b * ln(e^(q_yes/b) + e^(q_no/b))`; the cost of a trade
//! is the difference of `C` before and after the bought side's quantity
//! increases. All evaluation goes through a log-sum-exp shift so prices and
//! costs stay finite for arbitrarily large outstanding quantities.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance used when checking that the two prices sum to one.
pub const PRICE_SUM_TOLERANCE: f64 = 1e-9;
pub const MAX_B: f64 = 1e12;
pub const MIN_B: f64 = 1e-6;

/// Hard caps on the share-sizing search (see [`shares_for_budget`]).
const MAX_BOUND_DOUBLINGS: u32 = 64;
const MAX_BISECTION_ITERATIONS: u32 = 200;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum LmsrError {
    #[error("liquidity parameter {b} outside valid range [{min}, {max}]")]
    InvalidLiquidityParam { b: f64, min: f64, max: f64 },
    #[error("non-finite share quantity: {0}")]
    NonFiniteQuantity(f64),
    #[error("share amount must be positive: {0}")]
    InvalidShareAmount(f64),
    #[error("budget must be positive: {0}")]
    InvalidBudget(f64),
    #[error("tolerance must be positive: {0}")]
    InvalidTolerance(f64),
    #[error("numerical instability in cost calculation")]
    NumericalInstability,
    #[error(
        "share search failed to converge for budget {budget} within {iterations} iterations"
    )]
    ConvergenceFailed { budget: f64, iterations: u32 },
}

/// The side of a binary market a trade buys into.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

/// Instantaneous prices of both sides. Always sum to one and lie in (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketPrices {
    pub yes: f64,
    pub no: f64,
}

impl MarketPrices {
    pub fn of(&self, side: Side) -> f64 {
        match side {
            Side::Yes => self.yes,
            Side::No => self.no,
        }
    }
}

fn validate_b(b: f64) -> Result<(), LmsrError> {
    if !b.is_finite() || b < MIN_B || b > MAX_B {
        return Err(LmsrError::InvalidLiquidityParam {
            b,
            min: MIN_B,
            max: MAX_B,
        });
    }
    Ok(())
}

fn validate_quantities(q_yes: f64, q_no: f64) -> Result<(), LmsrError> {
    for q in [q_yes, q_no] {
        if !q.is_finite() {
            return Err(LmsrError::NonFiniteQuantity(q));
        }
    }
    Ok(())
}

/// LMSR cost function `C(q_yes, q_no) = b * ln(e^(q_yes/b) + e^(q_no/b))`.
///
/// Evaluated as `max + b * ln(e^((q_yes-max)/b) + e^((q_no-max)/b))` where
/// `max = max(q_yes, q_no)`, so the exponentials never overflow.
pub fn cost(b: f64, q_yes: f64, q_no: f64) -> Result<f64, LmsrError> {
    validate_b(b)?;
    validate_quantities(q_yes, q_no)?;

    let max_q = q_yes.max(q_no);
    let sum_exp = ((q_yes - max_q) / b).exp() + ((q_no - max_q) / b).exp();
    if !sum_exp.is_finite() || sum_exp <= 0.0 {
        return Err(LmsrError::NumericalInstability);
    }
    let cost = max_q + b * sum_exp.ln();
    if !cost.is_finite() {
        return Err(LmsrError::NumericalInstability);
    }
    Ok(cost)
}

/// Current prices `p_side = e^(q_side/b) / (e^(q_yes/b) + e^(q_no/b))`.
///
/// Uses the same log-sum-exp shift as [`cost`]. With `q_yes == q_no` both
/// prices are exactly 0.5.
pub fn prices(
    b: f64,
    q_yes: f64,
    q_no: f64,
) -> Result<MarketPrices, LmsrError> {
    validate_b(b)?;
    validate_quantities(q_yes, q_no)?;

    let max_q = q_yes.max(q_no);
    let exp_yes = ((q_yes - max_q) / b).exp();
    let exp_no = ((q_no - max_q) / b).exp();
    let sum_exp = exp_yes + exp_no;
    if !sum_exp.is_finite() || sum_exp <= 0.0 {
        return Err(LmsrError::NumericalInstability);
    }
    let prices = MarketPrices {
        yes: exp_yes / sum_exp,
        no: exp_no / sum_exp,
    };
    if (prices.yes + prices.no - 1.0).abs() > PRICE_SUM_TOLERANCE {
        return Err(LmsrError::NumericalInstability);
    }
    Ok(prices)
}

/// Cost of buying `shares` of `side`: `C(q_after) - C(q_before)`.
///
/// Strictly positive and strictly increasing in `shares` (the cost function
/// is convex), which is the property the budget search depends on.
pub fn cost_to_buy(
    b: f64,
    q_yes: f64,
    q_no: f64,
    side: Side,
    shares: f64,
) -> Result<f64, LmsrError> {
    if !shares.is_finite() || shares <= 0.0 {
        return Err(LmsrError::InvalidShareAmount(shares));
    }
    let cost_before = cost(b, q_yes, q_no)?;
    let cost_after = match side {
        Side::Yes => cost(b, q_yes + shares, q_no)?,
        Side::No => cost(b, q_yes, q_no + shares)?,
    };
    Ok(cost_after - cost_before)
}

/// Find the share amount whose purchase cost matches `budget` within
/// `tolerance` currency units.
///
/// The LMSR cost-to-buy has no closed-form inverse, so this bisects over the
/// share amount. The upper bound is seeded at `budget / price(side)` and
/// doubled until it covers the budget; a fixed-multiplier seed is not
/// sufficient when the bought side's price is low. Both the widening and the
/// bisection are iteration-capped so the search always terminates, returning
/// [`LmsrError::ConvergenceFailed`] rather than looping.
pub fn shares_for_budget(
    b: f64,
    q_yes: f64,
    q_no: f64,
    side: Side,
    budget: f64,
    tolerance: f64,
) -> Result<f64, LmsrError> {
    if !budget.is_finite() || budget <= 0.0 {
        return Err(LmsrError::InvalidBudget(budget));
    }
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(LmsrError::InvalidTolerance(tolerance));
    }

    // The shifted-exponential price underflows to zero once the book is
    // lopsided by more than ~745*b; fall back to the budget itself so the
    // widening loop still bounds the search instead of seeding infinity.
    let price = prices(b, q_yes, q_no)?.of(side);
    let mut high = if price > 0.0 {
        (budget / price).max(budget)
    } else {
        budget
    };
    let mut doublings = 0;
    while cost_to_buy(b, q_yes, q_no, side, high)? < budget {
        high *= 2.0;
        doublings += 1;
        if doublings > MAX_BOUND_DOUBLINGS {
            return Err(LmsrError::ConvergenceFailed {
                budget,
                iterations: doublings,
            });
        }
    }

    let mut low = 0.0_f64;
    for _ in 0..MAX_BISECTION_ITERATIONS {
        let mid = low + (high - low) / 2.0;
        let mid_cost = cost_to_buy(b, q_yes, q_no, side, mid)?;
        if (mid_cost - budget).abs() <= tolerance {
            return Ok(mid);
        }
        if mid_cost < budget {
            low = mid;
        } else {
            high = mid;
        }
    }
    Err(LmsrError::ConvergenceFailed {
        budget,
        iterations: MAX_BISECTION_ITERATIONS,
    })
}

/// Worst-case platform exposure for a binary market: `b * ln(2)`.
///
/// Reported for risk purposes; liquidity adequacy is enforced by the pool
/// reservation at market creation, not here.
pub fn max_exposure(b: f64) -> Result<f64, LmsrError> {
    validate_b(b)?;
    Ok(b * 2.0_f64.ln())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_initialization() {
        let p = prices(20_000.0, 0.0, 0.0).unwrap();
        assert_eq!(p.yes, 0.5);
        assert_eq!(p.no, 0.5);
    }

    #[test]
    fn test_price_sum_invariant() {
        for &(b, q_yes, q_no) in &[
            (1.0, 0.0, 0.0),
            (100.0, 10.0, 5.0),
            (20_000.0, 1_234.5, 9_876.5),
            (0.5, 300.0, -300.0),
            (1e9, 1e6, 2e6),
        ] {
            let p = prices(b, q_yes, q_no).unwrap();
            assert!((p.yes + p.no - 1.0).abs() < PRICE_SUM_TOLERANCE);
            assert!(p.yes > 0.0 && p.yes < 1.0);
            assert!(p.no > 0.0 && p.no < 1.0);
        }
    }

    #[test]
    fn test_higher_quantity_side_priced_higher() {
        let p = prices(100.0, 50.0, 10.0).unwrap();
        assert!(p.yes > p.no);
    }

    #[test]
    fn test_cost_monotonicity() {
        let (b, q_yes, q_no) = (500.0, 120.0, 80.0);
        let mut prev = 0.0;
        for s in [1.0, 5.0, 25.0, 125.0, 625.0] {
            let c = cost_to_buy(b, q_yes, q_no, Side::Yes, s).unwrap();
            assert!(c > prev, "cost {c} not increasing at {s} shares");
            prev = c;
        }
    }

    #[test]
    fn test_cost_to_buy_positive_both_sides() {
        for side in [Side::Yes, Side::No] {
            let c = cost_to_buy(1_000.0, 400.0, 700.0, side, 10.0).unwrap();
            assert!(c > 0.0);
        }
    }

    #[test]
    fn test_numerical_stability_large_quantities() {
        // Naive exp(q/b) overflows here; the shifted form must not.
        let p = prices(10.0, 1e7, 1e7 - 5.0).unwrap();
        assert!(p.yes.is_finite() && p.no.is_finite());
        assert!((p.yes + p.no - 1.0).abs() < PRICE_SUM_TOLERANCE);

        let c = cost(10.0, 1e7, 1e7 - 5.0).unwrap();
        assert!(c.is_finite());
        assert!(c >= 1e7);
    }

    #[test]
    fn test_share_search_convergence() {
        let tolerance = 0.01;
        for &budget in &[0.5, 10.0, 1_000.0, 250_000.0] {
            let shares = shares_for_budget(
                20_000.0, 0.0, 0.0, Side::Yes, budget, tolerance,
            )
            .unwrap();
            let actual =
                cost_to_buy(20_000.0, 0.0, 0.0, Side::Yes, shares).unwrap();
            assert!(
                (actual - budget).abs() <= tolerance,
                "budget {budget}: cost {actual} outside tolerance"
            );
        }
    }

    #[test]
    fn test_share_search_low_price_side() {
        // YES is priced near 0.018 here; a fixed budget*10 bound would be
        // too small, the adaptive widening must still converge.
        let (b, q_yes, q_no) = (50.0, 0.0, 200.0);
        let budget = 3.0;
        let shares =
            shares_for_budget(b, q_yes, q_no, Side::Yes, budget, 0.01)
                .unwrap();
        let actual = cost_to_buy(b, q_yes, q_no, Side::Yes, shares).unwrap();
        assert!((actual - budget).abs() <= 0.01);
        assert!(shares > budget * 10.0);
    }

    #[test]
    fn test_share_search_underflowed_price() {
        // (q_no - q_yes)/b = 1000, so the YES price underflows to 0.0.
        // The search must still terminate: here the budget-seeded bound
        // widens past the ~1005 shares needed and converges.
        let (b, q_yes, q_no) = (1.0, 0.0, 1_000.0);
        assert_eq!(prices(b, q_yes, q_no).unwrap().yes, 0.0);

        let budget = 5.0;
        let shares =
            shares_for_budget(b, q_yes, q_no, Side::Yes, budget, 0.01)
                .unwrap();
        let actual = cost_to_buy(b, q_yes, q_no, Side::Yes, shares).unwrap();
        assert!((actual - budget).abs() <= 0.01);
        assert!(shares > 1_000.0);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(matches!(
            cost(0.0, 0.0, 0.0),
            Err(LmsrError::InvalidLiquidityParam { .. })
        ));
        assert!(matches!(
            cost(100.0, f64::NAN, 0.0),
            Err(LmsrError::NonFiniteQuantity(_))
        ));
        assert!(matches!(
            cost_to_buy(100.0, 0.0, 0.0, Side::Yes, -1.0),
            Err(LmsrError::InvalidShareAmount(_))
        ));
        assert!(matches!(
            shares_for_budget(100.0, 0.0, 0.0, Side::Yes, 0.0, 0.01),
            Err(LmsrError::InvalidBudget(_))
        ));
        assert!(matches!(
            shares_for_budget(100.0, 0.0, 0.0, Side::Yes, 10.0, 0.0),
            Err(LmsrError::InvalidTolerance(_))
        ));
    }

    #[test]
    fn test_max_exposure() {
        let exposure = max_exposure(20_000.0).unwrap();
        assert!((exposure - 20_000.0 * 2.0_f64.ln()).abs() < 1e-9);
        assert!(max_exposure(-1.0).is_err());
    }
}
