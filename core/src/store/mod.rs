//! In-memory SQLite ledger store.
//!
//! RULE: Only the store talks to the database.
//! Managers call store methods; they never execute SQL directly.
//! The store holds no business rules: lookups and appends only.

use crate::{
    error::BatchResult,
    types::{
        AccountId, AccrualRunId, BalanceRunId, BusinessDate, LedgerEntryId, PaymentId, PeriodId,
        ProductId, SchemeId, SchemeVersionId,
    },
};
use rusqlite::{types::Type, Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

mod account;
mod accrual_run;
mod balance_run;
mod ops;
mod period;
mod posting;
mod scheme;

pub struct LedgerStore {
    conn: Connection,
}

impl LedgerStore {
    /// Open a fresh in-memory database. One store per batch run.
    pub fn in_memory() -> BatchResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database with the schema already applied.
    pub fn open_migrated() -> BatchResult<Self> {
        let store = Self::in_memory()?;
        store.migrate()?;
        Ok(store)
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> BatchResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_ledger.sql"))?;
        Ok(())
    }

    /// Run `work` as one unit: everything it writes commits together, or
    /// nothing does. Units nest.
    pub fn atomically<T>(&self, work: impl FnOnce(&Self) -> BatchResult<T>) -> BatchResult<T> {
        self.conn.execute_batch("SAVEPOINT unit_of_work;")?;
        match work(self) {
            Ok(value) => {
                self.conn.execute_batch("RELEASE unit_of_work;")?;
                Ok(value)
            }
            Err(e) => {
                self.conn
                    .execute_batch("ROLLBACK TO unit_of_work; RELEASE unit_of_work;")?;
                Err(e)
            }
        }
    }
}

/// Read a decimal stored as text. Amounts never pass through floating point.
fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    row.get::<_, Option<String>>(idx)?
        .map(|text| {
            Decimal::from_str(&text)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeVersionRow {
    pub id: SchemeVersionId,
    pub scheme_id: SchemeId,
    pub effective_from: BusinessDate,
    pub aer: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRow {
    pub id: AccountId,
    pub opened_on: BusinessDate,
    pub product_id: ProductId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountClosureRow {
    pub id: i64,
    pub account_id: AccountId,
    pub closed_on: BusinessDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRow {
    pub id: PeriodId,
    pub account_id: AccountId,
    pub scheme_id: SchemeId,
    pub start: BusinessDate,
    pub end: BusinessDate,
}

/// A maximal stretch of days over which an account's EoD balance held.
/// `run_end` is the only field that ever moves, one day at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EodBalanceRunRow {
    pub id: BalanceRunId,
    pub account_id: AccountId,
    pub run_start: BusinessDate,
    pub run_end: BusinessDate,
    pub balance: Decimal,
}

/// What the balance run manager did with one account's feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceAction {
    NewRunCreated,
    RunExtended,
}

impl BalanceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BalanceAction::NewRunCreated => "new_run_created",
            BalanceAction::RunExtended   => "run_extended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EodBalanceCompletionRow {
    pub id: i64,
    pub eod_balance_id: BalanceRunId,
    pub account_id: AccountId,
    pub date: BusinessDate,
    pub action_taken: BalanceAction,
}

/// A maximal stretch over which the same balance run, period and scheme
/// version applied. Accrual balances are residual interest, not principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualRunRow {
    pub id: AccrualRunId,
    pub account_id: AccountId,
    pub period_id: PeriodId,
    pub scheme_version_id: SchemeVersionId,
    pub eod_balance_id: BalanceRunId,
    pub start: BusinessDate,
    pub end: BusinessDate,
    pub start_accrual_balance: Decimal,
    pub end_accrual_balance: Decimal,
}

/// Insert payload for a new accrual run; `start == end` on creation.
#[derive(Debug, Clone)]
pub struct NewAccrualRun {
    pub account_id: AccountId,
    pub period_id: PeriodId,
    pub scheme_version_id: SchemeVersionId,
    pub eod_balance_id: BalanceRunId,
    pub on: BusinessDate,
    pub start_accrual_balance: Decimal,
    pub end_accrual_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAccrualCompletionRow {
    pub id: i64,
    pub account_id: AccountId,
    pub accrual_run_id: AccrualRunId,
    pub date: BusinessDate,
    pub delta: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntryRow {
    pub id: LedgerEntryId,
    pub product_id: ProductId,
    pub value_date: BusinessDate,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRow {
    pub id: PaymentId,
    pub account_id: AccountId,
    pub period_id: PeriodId,
    pub amount: Decimal,
    pub date: BusinessDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRow {
    pub id: i64,
    pub account_id: AccountId,
    pub business_date: BusinessDate,
    pub stage: String,
    pub error_kind: String,
    pub retryable: bool,
    /// The feed balance the failed unit was carrying, kept for replay.
    pub balance: Option<Decimal>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRow {
    pub account_id: AccountId,
    pub since: BusinessDate,
    pub reason: String,
}
