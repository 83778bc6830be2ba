//! EoD balance run manager.
//!
//! Turns a day's balance feed into balance runs: maximal stretches of
//! consecutive days on which an account's end-of-day balance held. Every
//! successfully ingested balance leaves exactly one completion on the
//! queue for the accrual run manager.

use crate::{
    clock::day_before,
    config::FailurePolicy,
    error::{BatchError, BatchResult},
    event::BatchEvent,
    isolation::{run_for_account, AccountOutcome},
    store::{BalanceAction, LedgerStore},
    subsystem::{BalanceFeed, BatchSubsystem, NightContext},
    types::{AccountId, BalanceRunId, BusinessDate},
};
use rust_decimal::Decimal;

pub const STAGE: &str = "balance_feed";

/// What happened to one account's feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestedBalance {
    pub eod_balance_id: BalanceRunId,
    pub action: BalanceAction,
}

impl IngestedBalance {
    fn event(&self, date: BusinessDate, account_id: AccountId, balance: Decimal) -> BatchEvent {
        match self.action {
            BalanceAction::NewRunCreated => BatchEvent::BalanceRunCreated {
                date,
                account_id,
                eod_balance_id: self.eod_balance_id,
                balance,
            },
            BalanceAction::RunExtended => BatchEvent::BalanceRunExtended {
                date,
                account_id,
                eod_balance_id: self.eod_balance_id,
            },
        }
    }
}

pub struct BalanceRunManager {
    policy: FailurePolicy,
}

impl BalanceRunManager {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    /// Ingest one account's balance for `date`.
    ///
    /// Closed and unknown accounts are rejected before anything is written.
    pub fn ingest_balance(
        store: &LedgerStore,
        date: BusinessDate,
        account_id: AccountId,
        balance: Decimal,
    ) -> BatchResult<IngestedBalance> {
        if store.account(account_id)?.is_none() {
            return Err(BatchError::UnknownAccount { account_id });
        }
        if store.is_closed(account_id)? {
            return Err(BatchError::ClosedAccount { account_id, date });
        }

        let ingested = match store.latest_eod_balance_run(account_id)? {
            Some(run) if run.balance == balance => {
                if run.run_end != day_before(date)? {
                    return Err(BatchError::Discontinuity {
                        account_id,
                        run_end: run.run_end,
                        date,
                    });
                }
                store.extend_eod_balance_run(run.id, date)?;
                IngestedBalance {
                    eod_balance_id: run.id,
                    action: BalanceAction::RunExtended,
                }
            }
            _ => IngestedBalance {
                eod_balance_id: store.insert_eod_balance_run(account_id, date, balance)?,
                action: BalanceAction::NewRunCreated,
            },
        };

        store.enqueue_eod_balance_completion(
            ingested.eod_balance_id,
            account_id,
            date,
            ingested.action,
        )?;
        log::debug!(
            "date={date} account={account_id} balance={balance} -> {} (run {})",
            ingested.action.as_str(),
            ingested.eod_balance_id
        );
        Ok(ingested)
    }

    fn ingest_isolated(
        &self,
        store: &LedgerStore,
        date: BusinessDate,
        account_id: AccountId,
        balance: Decimal,
    ) -> BatchResult<AccountOutcome<IngestedBalance>> {
        run_for_account(store, self.policy, account_id, date, STAGE, Some(balance), |s| {
            Self::ingest_balance(s, date, account_id, balance)
        })
    }

    /// Ingest a whole day's feed, one account at a time, under the failure policy.
    pub fn ingest_daily_balances(
        &self,
        store: &LedgerStore,
        date: BusinessDate,
        balances: &BalanceFeed,
    ) -> BatchResult<Vec<BatchEvent>> {
        let mut events = Vec::with_capacity(balances.len());
        let (mut created, mut extended, mut failed) = (0usize, 0usize, 0usize);

        for (&account_id, &balance) in balances {
            if store.is_quarantined(account_id)? {
                store.insert_dead_letter(
                    account_id,
                    date,
                    STAGE,
                    "quarantined",
                    true,
                    Some(balance),
                    &format!("balance {balance} for {date} held while account is quarantined"),
                )?;
                events.push(BatchEvent::AccountSkipped {
                    date,
                    account_id,
                    stage: STAGE.to_string(),
                });
                failed += 1;
                continue;
            }

            match self.ingest_isolated(store, date, account_id, balance)? {
                AccountOutcome::Done(ingested) => {
                    match ingested.action {
                        BalanceAction::NewRunCreated => created += 1,
                        BalanceAction::RunExtended => extended += 1,
                    }
                    events.push(ingested.event(date, account_id, balance));
                }
                AccountOutcome::Quarantined(event) => {
                    failed += 1;
                    events.push(event);
                }
            }
        }

        log::info!(
            "date={date} balance feed: {} accounts, {created} new runs, {extended} extended, {failed} held",
            balances.len()
        );
        Ok(events)
    }

    /// Re-ingest the balances held back while `account_id` was quarantined,
    /// oldest first. Call after `release_quarantine`.
    ///
    /// Each replayed dead letter is deleted. A balance that fails again
    /// re-quarantines the account; it and every later letter stay put.
    pub fn replay_held_balances(
        &self,
        store: &LedgerStore,
        account_id: AccountId,
    ) -> BatchResult<Vec<BatchEvent>> {
        if store.is_quarantined(account_id)? {
            log::warn!("account={account_id} is still quarantined, nothing replayed");
            return Ok(Vec::new());
        }

        let held = store.held_balances(account_id, STAGE)?;
        let mut events = Vec::with_capacity(held.len());
        let mut replayed = 0usize;
        for letter in &held {
            let Some(balance) = letter.balance else { continue };
            let date = letter.business_date;
            let outcome = store.atomically(|s| {
                let outcome = self.ingest_isolated(s, date, account_id, balance)?;
                if matches!(outcome, AccountOutcome::Done(_)) {
                    s.delete_dead_letter(letter.id)?;
                }
                Ok(outcome)
            })?;
            match outcome {
                AccountOutcome::Done(ingested) => {
                    replayed += 1;
                    events.push(ingested.event(date, account_id, balance));
                }
                AccountOutcome::Quarantined(event) => {
                    // The fresh letter supersedes the one being replayed.
                    store.delete_dead_letter(letter.id)?;
                    events.push(event);
                    break;
                }
            }
        }

        log::info!("account={account_id} replayed {replayed} of {} held balances", held.len());
        Ok(events)
    }
}

impl BatchSubsystem for BalanceRunManager {
    fn name(&self) -> &'static str { "balance_runs" }

    fn run_nightly(&mut self, ctx: &NightContext<'_>) -> BatchResult<Vec<BatchEvent>> {
        match ctx.feed {
            Some(feed) => self.ingest_daily_balances(ctx.store, ctx.business_date, feed),
            None => {
                log::debug!("date={} no balance feed", ctx.business_date);
                Ok(Vec::new())
            }
        }
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

    fn store() -> LedgerStore {
        let store = LedgerStore::open_migrated().unwrap();
        store.insert_account(1, date("2024-04-01"), 10).unwrap();
        store
    }

    #[test]
    fn equal_balance_on_next_day_extends() {
        let store = store();
        let first =
            BalanceRunManager::ingest_balance(&store, date("2024-04-01"), 1, dec!(100)).unwrap();
        let second =
            BalanceRunManager::ingest_balance(&store, date("2024-04-02"), 1, dec!(100.00)).unwrap();

        assert_eq!(first.action, BalanceAction::NewRunCreated);
        assert_eq!(second.action, BalanceAction::RunExtended);
        assert_eq!(first.eod_balance_id, second.eod_balance_id);

        let run = store.eod_balance_run(first.eod_balance_id).unwrap().unwrap();
        assert_eq!(run.run_start, date("2024-04-01"));
        assert_eq!(run.run_end, date("2024-04-02"));
        assert_eq!(store.all_pending_eod_balance_completions().unwrap().len(), 2);
    }

    #[test]
    fn unknown_account_writes_nothing() {
        let store = store();
        let err =
            BalanceRunManager::ingest_balance(&store, date("2024-04-01"), 99, dec!(1)).unwrap_err();
        assert!(matches!(err, BatchError::UnknownAccount { account_id: 99 }));
        assert!(store.all_pending_eod_balance_completions().unwrap().is_empty());
    }

    #[test]
    fn quarantined_account_feed_is_dead_lettered() {
        let store = store();
        store.quarantine_account(1, date("2024-04-01"), "test").unwrap();

        let manager = BalanceRunManager::new(FailurePolicy::Quarantine);
        let feed = BalanceFeed::from([(1, dec!(100))]);
        let events = manager.ingest_daily_balances(&store, date("2024-04-02"), &feed).unwrap();

        assert!(matches!(events[0], BatchEvent::AccountSkipped { account_id: 1, .. }));
        assert!(store.latest_eod_balance_run(1).unwrap().is_none());
        let letters = store.dead_letters().unwrap();
        assert_eq!(letters[0].error_kind, "quarantined");
        assert_eq!(letters[0].balance, Some(dec!(100)));
    }

    #[test]
    fn released_account_replays_held_balances_in_date_order() {
        let store = store();
        let manager = BalanceRunManager::new(FailurePolicy::Quarantine);
        BalanceRunManager::ingest_balance(&store, date("2024-04-01"), 1, dec!(100)).unwrap();
        store.quarantine_account(1, date("2024-04-01"), "test").unwrap();
        for day in ["2024-04-02", "2024-04-03"] {
            let feed = BalanceFeed::from([(1, dec!(100))]);
            manager.ingest_daily_balances(&store, date(day), &feed).unwrap();
        }

        assert!(manager.replay_held_balances(&store, 1).unwrap().is_empty());

        assert!(store.release_quarantine(1).unwrap());
        let events = manager.replay_held_balances(&store, 1).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, BatchEvent::BalanceRunExtended { account_id: 1, .. })));

        let run = store.latest_eod_balance_run(1).unwrap().unwrap();
        assert_eq!(run.run_start, date("2024-04-01"));
        assert_eq!(run.run_end, date("2024-04-03"));
        assert!(store.dead_letters().unwrap().is_empty());
        assert_eq!(store.all_pending_eod_balance_completions().unwrap().len(), 3);
    }

    #[test]
    fn failed_replay_requarantines_and_keeps_later_letters() {
        let store = store();
        let manager = BalanceRunManager::new(FailurePolicy::Quarantine);
        BalanceRunManager::ingest_balance(&store, date("2024-04-01"), 1, dec!(100)).unwrap();
        store.quarantine_account(1, date("2024-04-01"), "test").unwrap();
        // 04-02 never arrived, so 04-03 cannot extend the run.
        for day in ["2024-04-03", "2024-04-04"] {
            let feed = BalanceFeed::from([(1, dec!(100))]);
            manager.ingest_daily_balances(&store, date(day), &feed).unwrap();
        }

        store.release_quarantine(1).unwrap();
        let events = manager.replay_held_balances(&store, 1).unwrap();
        assert!(matches!(events[..], [BatchEvent::AccountQuarantined { account_id: 1, .. }]));
        assert!(store.is_quarantined(1).unwrap());

        let letters = store.dead_letters().unwrap();
        let held: Vec<_> = letters
            .iter()
            .map(|d| (d.business_date, d.error_kind.as_str(), d.balance))
            .collect();
        assert_eq!(
            held,
            vec![
                (date("2024-04-04"), "quarantined", Some(dec!(100))),
                (date("2024-04-03"), "discontinuity", Some(dec!(100))),
            ]
        );
        assert_eq!(store.latest_eod_balance_run(1).unwrap().unwrap().run_end, date("2024-04-01"));
    }
}
