//! Per-account failure isolation.
//!
//! One account's bad data must not stop the night for every other account.
//! Each account's work runs as a single store unit; an account-scoped
//! failure rolls the unit back, leaves a dead letter for operators and
//! quarantines the account. Infrastructure failures always propagate.

use crate::{
    config::FailurePolicy,
    error::{BatchError, BatchResult},
    event::BatchEvent,
    store::LedgerStore,
    types::{AccountId, BusinessDate},
};
use rust_decimal::Decimal;

pub enum AccountOutcome<T> {
    Done(T),
    Quarantined(BatchEvent),
}

/// Run `work` for one account under `policy`.
///
/// `balance` is the feed balance the work consumes, if any; a dead letter
/// keeps it so the day can be replayed.
pub fn run_for_account<T>(
    store: &LedgerStore,
    policy: FailurePolicy,
    account_id: AccountId,
    date: BusinessDate,
    stage: &str,
    balance: Option<Decimal>,
    work: impl FnOnce(&LedgerStore) -> BatchResult<T>,
) -> BatchResult<AccountOutcome<T>> {
    match store.atomically(work) {
        Ok(value) => Ok(AccountOutcome::Done(value)),
        Err(e) if policy == FailurePolicy::Quarantine && e.is_account_scoped() => {
            quarantine(store, account_id, date, stage, balance, &e)
                .map(AccountOutcome::Quarantined)
        }
        Err(e) => Err(e),
    }
}

fn quarantine(
    store: &LedgerStore,
    account_id: AccountId,
    date: BusinessDate,
    stage: &str,
    balance: Option<Decimal>,
    error: &BatchError,
) -> BatchResult<BatchEvent> {
    log::warn!(
        "date={date} account={account_id} quarantined at {stage}: {error}{}",
        if error.is_retryable() { " (retryable)" } else { "" }
    );
    let message = error.to_string();
    store.atomically(|s| {
        s.insert_dead_letter(
            account_id,
            date,
            stage,
            error.kind(),
            error.is_retryable(),
            balance,
            &message,
        )?;
        s.quarantine_account(account_id, date, &message)
    })?;
    Ok(BatchEvent::AccountQuarantined {
        date,
        account_id,
        stage: stage.to_string(),
        error_kind: error.kind().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn store_with_account() -> LedgerStore {
        let store = LedgerStore::open_migrated().unwrap();
        store.insert_account(1, date("2024-04-01"), 1).unwrap();
        store
    }

    #[test]
    fn quarantine_policy_rolls_back_and_dead_letters() {
        let store = store_with_account();
        let outcome = run_for_account(
            &store,
            FailurePolicy::Quarantine,
            1,
            date("2024-04-03"),
            "balance_feed",
            Some(dec!(1)),
            |s| {
                s.insert_eod_balance_run(1, date("2024-04-03"), dec!(1))?;
                Err::<(), _>(BatchError::Discontinuity {
                    account_id: 1,
                    run_end: date("2024-04-01"),
                    date: date("2024-04-03"),
                })
            },
        )
        .unwrap();

        assert!(matches!(outcome, AccountOutcome::Quarantined(_)));
        assert!(store.latest_eod_balance_run(1).unwrap().is_none());
        assert!(store.is_quarantined(1).unwrap());

        let letters = store.dead_letters().unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].error_kind, "discontinuity");
        assert!(letters[0].retryable);
        assert_eq!(letters[0].balance, Some(dec!(1)));
    }

    #[test]
    fn abort_policy_propagates() {
        let store = store_with_account();
        let result = run_for_account(
            &store,
            FailurePolicy::Abort,
            1,
            date("2024-04-03"),
            "accrual",
            None,
            |_| Err::<(), _>(BatchError::MissingPeriod { account_id: 1, date: date("2024-04-03") }),
        );
        assert!(matches!(result, Err(BatchError::MissingPeriod { .. })));
        assert!(!store.is_quarantined(1).unwrap());
    }

    #[test]
    fn infrastructure_errors_always_propagate() {
        let store = store_with_account();
        let result = run_for_account(
            &store,
            FailurePolicy::Quarantine,
            1,
            date("2024-04-03"),
            "accrual",
            None,
            |_| Err::<(), _>(BatchError::Other(anyhow::anyhow!("disk on fire"))),
        );
        assert!(result.is_err());
        assert!(store.dead_letters().unwrap().is_empty());
    }
}
