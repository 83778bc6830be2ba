//! Property-based tests for rounding and run re-anchoring.

use accrual_core::compounding::{compounded_residual, floor_money};
use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Principal from 0.01 to 1,000,000.00.
fn arb_principal() -> impl Strategy<Value = Decimal> {
    (1i64..=100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// AER from 0.0001 to 0.2000.
fn arb_aer() -> impl Strategy<Value = Decimal> {
    (1i64..=2_000i64).prop_map(|bp| Decimal::new(bp, 4))
}

/// Any amount with up to 8 decimal places, either sign.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (-10_000_000_000i64..=10_000_000_000i64).prop_map(|units| Decimal::new(units, 8))
}

fn anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

// =============================================================================
// Rounding
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Floored amounts never exceed the true value and lose less than a cent.
    #[test]
    fn floor_never_rounds_up(x in arb_amount()) {
        let floored = floor_money(x);
        prop_assert!(floored <= x);
        prop_assert!(x - floored < dec!(0.01));
        prop_assert!(floored.scale() <= 2);
    }
}

// =============================================================================
// Re-anchoring
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Re-deriving a run's residual from its anchor agrees with compounding
    /// one day at a time from the same anchor.
    #[test]
    fn anchor_rebase_matches_daily_replay(
        principal in arb_principal(),
        aer in arb_aer(),
        days in 1u64..=60,
    ) {
        let start = anchor();
        let end = start.checked_add_days(Days::new(days - 1)).unwrap();
        let rebased = compounded_residual(aer, start, end, principal, Decimal::ZERO).unwrap();

        let mut replayed = Decimal::ZERO;
        for offset in 0..days {
            let day = start.checked_add_days(Days::new(offset)).unwrap();
            replayed = compounded_residual(aer, day, day, principal, replayed).unwrap();
        }

        prop_assert!((rebased - replayed).abs() < dec!(0.000001), "{} vs {}", rebased, replayed);
    }

    /// Daily floored deltas taken from the anchor never sum past the residual.
    #[test]
    fn floored_deltas_never_overpay(
        principal in arb_principal(),
        aer in arb_aer(),
        days in 1u64..=30,
    ) {
        let start = anchor();
        let mut previous = Decimal::ZERO;
        let mut posted = Decimal::ZERO;
        for offset in 0..days {
            let day = start.checked_add_days(Days::new(offset)).unwrap();
            let current = compounded_residual(aer, start, day, principal, Decimal::ZERO).unwrap();
            posted += floor_money(current - previous);
            previous = current;
        }
        prop_assert!(posted <= previous);
        prop_assert!(previous - posted < Decimal::from(days) * dec!(0.01));
    }
}
