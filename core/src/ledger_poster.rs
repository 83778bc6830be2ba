//! Ledger poster.
//!
//! Aggregates floored daily accruals into one ledger entry per product per
//! accrual date. Entries are value-dated on the day the batch runs.

use crate::{
    clock::{day_after, day_before},
    error::{BatchError, BatchResult},
    event::BatchEvent,
    store::LedgerStore,
    subsystem::{BatchSubsystem, NightContext},
    types::{BusinessDate, ProductId},
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct LedgerPoster;

impl LedgerPoster {
    pub fn new() -> Self {
        Self
    }

    /// Post every pending accrual dated from the earliest pending date up to
    /// and including `processing_date - 1`, value-dated `processing_date`.
    pub fn post_pending_accruals(
        &self,
        store: &LedgerStore,
        processing_date: BusinessDate,
    ) -> BatchResult<Vec<BatchEvent>> {
        let Some(earliest) = store.earliest_pending_accrual_date()? else {
            return Ok(Vec::new());
        };
        let last = day_before(processing_date)?;

        let mut events = Vec::new();
        let mut date = earliest;
        while date <= last {
            events.extend(store.atomically(|s| Self::post_date(s, date, processing_date))?);
            date = day_after(date)?;
        }

        log::info!(
            "date={processing_date} posting: {} ledger entries from {earliest} to {last}",
            events.len()
        );
        Ok(events)
    }

    /// Post one accrual date. Dates with nothing pending post nothing.
    pub fn post_date(
        store: &LedgerStore,
        accrual_date: BusinessDate,
        value_date: BusinessDate,
    ) -> BatchResult<Vec<BatchEvent>> {
        let pending = store.pending_accruals_on(accrual_date)?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut totals: BTreeMap<ProductId, Decimal> = BTreeMap::new();
        for entry in &pending {
            let account = store
                .account(entry.account_id)?
                .ok_or(BatchError::UnknownAccount { account_id: entry.account_id })?;
            *totals.entry(account.product_id).or_insert(Decimal::ZERO) += entry.delta;
        }

        let mut events = Vec::with_capacity(totals.len());
        for (product_id, amount) in totals {
            let entry_id = store.insert_ledger_entry(product_id, value_date, amount)?;
            log::debug!(
                "accrual_date={accrual_date} product={product_id} posted {amount} value {value_date}"
            );
            events.push(BatchEvent::LedgerEntryPosted {
                accrual_date,
                value_date,
                product_id,
                entry_id,
                amount,
            });
        }
        for entry in &pending {
            store.complete_daily_accrual(entry.id)?;
        }
        Ok(events)
    }
}

impl BatchSubsystem for LedgerPoster {
    fn name(&self) -> &'static str { "ledger_poster" }

    fn run_nightly(&mut self, ctx: &NightContext<'_>) -> BatchResult<Vec<BatchEvent>> {
        self.post_pending_accruals(ctx.store, ctx.run_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn nothing_pending_posts_nothing() {
        let store = LedgerStore::open_migrated().unwrap();
        let events = LedgerPoster::new()
            .post_pending_accruals(&store, date("2024-04-02"))
            .unwrap();
        assert!(events.is_empty());
        assert!(store.ledger_entries().unwrap().is_empty());
    }

    #[test]
    fn dates_on_or_after_processing_date_wait() {
        let store = LedgerStore::open_migrated().unwrap();
        let version = store.insert_scheme_version(1, date("2020-01-01"), dec!(0.05)).unwrap();
        store.insert_account(1, date("2024-04-01"), 7).unwrap();
        let period = store.insert_period(1, 1, date("2024-04-01"), date("2025-04-01")).unwrap();
        let balance = store.insert_eod_balance_run(1, date("2024-04-01"), dec!(1000)).unwrap();
        let run = store
            .insert_accrual_run(&crate::store::NewAccrualRun {
                account_id: 1,
                period_id: period,
                scheme_version_id: version,
                eod_balance_id: balance,
                on: date("2024-04-01"),
                start_accrual_balance: Decimal::ZERO,
                end_accrual_balance: dec!(0.13368),
            })
            .unwrap();
        store.enqueue_daily_accrual(1, run, date("2024-04-01"), dec!(0.13)).unwrap();
        store.enqueue_daily_accrual(1, run, date("2024-04-02"), dec!(0.14)).unwrap();

        LedgerPoster::new().post_pending_accruals(&store, date("2024-04-02")).unwrap();

        let entries = store.ledger_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, dec!(0.13));
        assert_eq!(entries[0].value_date, date("2024-04-02"));
        assert_eq!(store.pending_accruals().unwrap().len(), 1);
    }
}
