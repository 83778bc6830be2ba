//! Compounding and rounding rules for daily accrual.
//!
//! The day count is deliberately naive: every year has 365 days and a span
//! of exactly 365 days compounds to one whole year of AER. Leap days are
//! just another day. Do not "correct" this without changing the product.

use crate::types::BusinessDate;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};

pub const DAYS_PER_YEAR: i64 = 365;

/// Decimal places every posted amount is floored to.
pub const MONEY_DP: u32 = 2;

/// Stopping tolerance for the `exp` series behind fractional-year growth.
/// Residuals must stay exact far below a cent on large balances.
const EXP_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 24);

/// Inclusive day count of `start..=end`.
pub fn inclusive_days(start: BusinessDate, end: BusinessDate) -> i64 {
    (end - start).num_days() + 1
}

/// Grow `value` at `aer` over the inclusive span `start..=end`.
///
/// Returns `None` when the decimal arithmetic overflows.
pub fn compound(
    aer: Decimal,
    start: BusinessDate,
    end: BusinessDate,
    value: Decimal,
) -> Option<Decimal> {
    let days = inclusive_days(start, end);
    let growth = Decimal::ONE.checked_add(aer)?;
    if days == DAYS_PER_YEAR {
        return value.checked_mul(growth);
    }
    let exponent = Decimal::from(days).checked_div(Decimal::from(DAYS_PER_YEAR))?;
    let factor = growth
        .checked_ln()?
        .checked_mul(exponent)?
        .checked_exp_with_tolerance(EXP_TOLERANCE)?;
    value.checked_mul(factor)
}

/// Residual interest on `principal` after compounding `principal + residual`
/// over `start..=end`. Principal itself never moves.
pub fn compounded_residual(
    aer: Decimal,
    start: BusinessDate,
    end: BusinessDate,
    principal: Decimal,
    residual: Decimal,
) -> Option<Decimal> {
    let grown = compound(aer, start, end, principal.checked_add(residual)?)?;
    grown.checked_sub(principal)
}

/// Floor to whole cents. Never rounds up, including for negatives.
pub fn floor_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToNegativeInfinity)
}
