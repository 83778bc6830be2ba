//! State snapshot: the whole ledger as JSON, for diagnostics.
//!
//! A snapshot is logged at debug level every day and stored in the
//! snapshot table every `snapshot_interval_days`. It can be narrowed to a
//! set of accounts; ledger entries and scheme versions are never filtered.
//! Not contract-bearing.

use crate::{
    clock::BatchClock,
    config::BatchConfig,
    error::BatchResult,
    store::{
        AccountClosureRow, AccountRow, AccrualRunRow, DailyAccrualCompletionRow, DeadLetterRow,
        EodBalanceCompletionRow, EodBalanceRunRow, LedgerEntryRow, LedgerStore, PaymentRow,
        PeriodRow, QuarantineRow, SchemeVersionRow,
    },
    types::{AccountId, BusinessDate},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub business_date: BusinessDate,
    pub clock: BatchClock,
    pub scheme_versions: Vec<SchemeVersionRow>,
    pub accounts: Vec<AccountRow>,
    pub account_closures: Vec<AccountClosureRow>,
    pub periods: Vec<PeriodRow>,
    pub eod_balance_runs: Vec<EodBalanceRunRow>,
    pub pending_balance_completions: Vec<EodBalanceCompletionRow>,
    pub accrual_runs: Vec<AccrualRunRow>,
    pub pending_accruals: Vec<DailyAccrualCompletionRow>,
    pub payments: Vec<PaymentRow>,
    pub ledger_entries: Vec<LedgerEntryRow>,
    pub dead_letters: Vec<DeadLetterRow>,
    pub quarantined: Vec<QuarantineRow>,
}

impl StateSnapshot {
    pub fn capture(
        store: &LedgerStore,
        clock: &BatchClock,
        business_date: BusinessDate,
        config: &BatchConfig,
    ) -> BatchResult<Self> {
        let keep = |id: AccountId| config.includes_account(id);
        Ok(Self {
            business_date,
            clock: clock.clone(),
            scheme_versions: store.scheme_versions()?,
            accounts: retain(store.accounts()?, |r| keep(r.id)),
            account_closures: retain(store.account_closures()?, |r| keep(r.account_id)),
            periods: retain(store.periods()?, |r| keep(r.account_id)),
            eod_balance_runs: retain(store.eod_balance_runs()?, |r| keep(r.account_id)),
            pending_balance_completions: retain(
                store.all_pending_eod_balance_completions()?,
                |r| keep(r.account_id),
            ),
            accrual_runs: retain(store.accrual_runs()?, |r| keep(r.account_id)),
            pending_accruals: retain(store.pending_accruals()?, |r| keep(r.account_id)),
            payments: retain(store.payments()?, |r| keep(r.account_id)),
            ledger_entries: store.ledger_entries()?,
            dead_letters: retain(store.dead_letters()?, |r| keep(r.account_id)),
            quarantined: retain(store.quarantined_accounts()?, |r| keep(r.account_id)),
        })
    }
}

fn retain<T>(mut rows: Vec<T>, keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.retain(|row| keep(row));
    rows
}
