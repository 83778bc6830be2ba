//! Subsystem trait for the nightly phase.
//!
//! RULE: Every nightly stage implements BatchSubsystem.
//! The scheduler calls run_nightly() on each registered subsystem
//! in registration order, once per business date.
//! Execution order is fixed and documented in scheduler.rs.

use crate::{
    error::BatchResult,
    event::BatchEvent,
    store::LedgerStore,
    types::{AccountId, BusinessDate},
};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};
use std::collections::BTreeMap;

/// One business date's end-of-day balances, keyed by account.
pub type BalanceFeed = BTreeMap<AccountId, Decimal>;

/// Read a feed whose account ids arrive as map keys, i.e. as strings.
pub fn deserialize_feed<'de, D>(deserializer: D) -> Result<BalanceFeed, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, Decimal>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, balance)| {
            key.trim()
                .parse::<AccountId>()
                .map(|id| (id, balance))
                .map_err(|e| de::Error::custom(format!("account id {key:?}: {e}")))
        })
        .collect()
}

/// Everything a nightly stage may look at.
pub struct NightContext<'a> {
    pub store: &'a LedgerStore,
    /// The business date being closed out (`run_date - 1`).
    pub business_date: BusinessDate,
    /// The calendar day the batch is running on.
    pub run_date: BusinessDate,
    /// The balance feed for `business_date`, if one arrived.
    pub feed: Option<&'a BalanceFeed>,
}

/// The contract every nightly stage must fulfill.
pub trait BatchSubsystem {
    /// Unique stable name, recorded against every event it emits.
    fn name(&self) -> &'static str;

    /// Called once per night by the scheduler.
    ///
    /// Returns the events describing what the stage did, in order.
    fn run_nightly(&mut self, ctx: &NightContext<'_>) -> BatchResult<Vec<BatchEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn feed_keys_parse_as_account_ids() {
        let feed = deserialize_feed(json!({ "7": "1500.00", "12": "0" })).unwrap();
        assert_eq!(feed, BalanceFeed::from([(7, dec!(1500.00)), (12, dec!(0))]));
    }

    #[test]
    fn non_numeric_feed_key_is_rejected() {
        let err = deserialize_feed(json!({ "seven": "1500.00" })).unwrap_err();
        assert!(err.to_string().contains("seven"), "{err}");
    }
}
