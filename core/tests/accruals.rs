//! Accrual runs driven through the scheduler, day by day.

use accrual_core::{
    accrual_run_manager::AccrualRunManager,
    balance_run_manager::BalanceRunManager,
    scheduler::{BatchScheduler, DailyAction},
    BatchConfig, FailurePolicy, LedgerStore,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn quiet_config() -> BatchConfig {
    BatchConfig {
        snapshot_interval_days: 0,
        ..BatchConfig::default()
    }
}

/// Scheduler over `first..=last` with scheme 1 at `aer` and account 1 on product 1.
fn scheduler(aer: Decimal, first: &str, last: &str) -> BatchScheduler {
    let store = LedgerStore::open_migrated().expect("store");
    store.insert_scheme_version(1, date("2020-01-01"), aer).unwrap();
    let mut s = BatchScheduler::build(store, quiet_config(), date(first), date(last));
    s.schedule(date(first), DailyAction::CreateAccount { id: 1, product_id: 1 });
    s
}

fn open_period(s: &mut BatchScheduler, on: &str, start: &str, end: &str) {
    s.schedule(
        date(on),
        DailyAction::OpenPeriod {
            account_id: 1,
            scheme_id: 1,
            start: date(start),
            end: date(end),
        },
    );
}

/// Feed `balance` for account 1 on every day of `from..=to`.
fn feed(s: &mut BatchScheduler, from: &str, to: &str, balance: Decimal) {
    let mut day = date(from);
    while day <= date(to) {
        s.schedule(
            day,
            DailyAction::ConsumeBalanceFeed {
                balances: [(1, balance)].into_iter().collect(),
            },
        );
        day = day.succ_opt().unwrap();
    }
}

#[test]
fn full_year_pays_exact_aer() {
    let mut s = scheduler(dec!(0.05), "2023-01-01", "2024-01-01");
    open_period(&mut s, "2023-01-01", "2023-01-01", "2023-12-31");
    feed(&mut s, "2023-01-01", "2023-12-31", dec!(1000.00));
    s.run().expect("run");

    let runs = s.store.accrual_runs().unwrap();
    assert_eq!(runs.len(), 1, "one unbroken run for the whole year");
    assert_eq!(runs[0].start, date("2023-01-01"));
    assert_eq!(runs[0].end, date("2023-12-31"));
    assert_eq!(runs[0].end_accrual_balance, dec!(50.00));

    let payments = s.store.payments().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, dec!(50.00));
    assert_eq!(payments[0].date, date("2024-01-01"));

    // Every day is posted, each floored, so the ledger never overpays.
    let entries = s.store.ledger_entries().unwrap();
    assert_eq!(entries.len(), 365);
    let posted: Decimal = entries.iter().map(|e| e.amount).sum();
    assert!(posted <= dec!(50.00), "{posted}");
    assert!(posted > dec!(50.00) - dec!(3.65), "{posted}");
    assert!(s.store.pending_accruals().unwrap().is_empty());
    assert!(s.store.all_pending_eod_balance_completions().unwrap().is_empty());
}

#[test]
fn balance_change_starts_a_run_carrying_the_residual() {
    let mut s = scheduler(dec!(0.05), "2024-01-01", "2024-01-08");
    open_period(&mut s, "2024-01-01", "2024-01-01", "2024-12-31");
    feed(&mut s, "2024-01-01", "2024-01-04", dec!(1000));
    feed(&mut s, "2024-01-05", "2024-01-07", dec!(2000));
    s.run().expect("run");

    let runs = s.store.accrual_runs().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!((runs[0].start, runs[0].end), (date("2024-01-01"), date("2024-01-04")));
    assert_eq!((runs[1].start, runs[1].end), (date("2024-01-05"), date("2024-01-07")));
    assert_ne!(runs[0].eod_balance_id, runs[1].eod_balance_id);
    assert_eq!(runs[1].start_accrual_balance, runs[0].end_accrual_balance);
    assert!(runs[1].end_accrual_balance > runs[0].end_accrual_balance);
}

#[test]
fn scheme_version_change_starts_a_run_without_reset() {
    let mut s = scheduler(dec!(0.05), "2024-01-01", "2024-01-06");
    s.store.insert_scheme_version(1, date("2024-01-04"), dec!(0.10)).unwrap();
    open_period(&mut s, "2024-01-01", "2024-01-01", "2024-12-31");
    feed(&mut s, "2024-01-01", "2024-01-05", dec!(1000));
    s.run().expect("run");

    let runs = s.store.accrual_runs().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].start, date("2024-01-04"));
    assert_ne!(runs[0].scheme_version_id, runs[1].scheme_version_id);
    assert_eq!(runs[0].period_id, runs[1].period_id);
    assert_eq!(runs[1].start_accrual_balance, runs[0].end_accrual_balance);
}

#[test]
fn period_rollover_carries_only_the_unpaid_fraction() {
    let mut s = scheduler(dec!(0.05), "2023-01-01", "2024-01-02");
    open_period(&mut s, "2023-01-01", "2023-01-01", "2023-12-31");
    open_period(&mut s, "2023-01-01", "2024-01-01", "2024-12-31");
    feed(&mut s, "2023-01-01", "2024-01-01", dec!(1234.56));
    s.run().expect("run");

    // 1234.56 * 0.05 = 61.728; the whole cents are paid, 0.008 rolls over.
    let payments = s.store.payments().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, dec!(61.72));
    assert_eq!(payments[0].date, date("2024-01-01"));

    let runs = s.store.accrual_runs().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].end_accrual_balance, dec!(61.728));
    assert_eq!(runs[1].start, date("2024-01-01"));
    assert_eq!(runs[1].start_accrual_balance, dec!(0.008));
    assert_ne!(runs[0].period_id, runs[1].period_id);
}

#[test]
fn completions_dated_after_the_processing_date_stay_queued() {
    let store = LedgerStore::open_migrated().unwrap();
    store.insert_scheme_version(1, date("2020-01-01"), dec!(0.05)).unwrap();
    store.insert_account(1, date("2024-01-01"), 1).unwrap();
    store.insert_period(1, 1, date("2024-01-01"), date("2024-12-31")).unwrap();
    for d in ["2024-01-01", "2024-01-02"] {
        BalanceRunManager::ingest_balance(&store, date(d), 1, dec!(1000)).unwrap();
    }

    let manager = AccrualRunManager::new(FailurePolicy::Quarantine);
    manager.process_balance_completions(&store, date("2024-01-01")).unwrap();

    let pending = store.all_pending_eod_balance_completions().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].date, date("2024-01-02"));
}
