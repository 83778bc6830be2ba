//! Batch events: the trace of every decision the nightly batch makes.
//!
//! RULE: Subsystems report what they did ONLY through events.
//! The scheduler persists every event to the event log in emission order.

use crate::types::{
    AccountId, AccrualRunId, BalanceRunId, BusinessDate, LedgerEntryId, PaymentId, PeriodId,
    ProductId, SchemeId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every event emitted during a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    // ── Scheduler ──────────────────────────────────
    DayStarted {
        date: BusinessDate,
    },
    DayCompleted {
        date: BusinessDate,
    },

    // ── Same-day admin ─────────────────────────────
    AccountCreated {
        date: BusinessDate,
        account_id: AccountId,
        product_id: ProductId,
    },
    AccountClosed {
        date: BusinessDate,
        account_id: AccountId,
    },
    PeriodOpened {
        date: BusinessDate,
        account_id: AccountId,
        period_id: PeriodId,
        scheme_id: SchemeId,
        start: BusinessDate,
        end: BusinessDate,
    },

    // ── Balance runs ───────────────────────────────
    BalanceRunCreated {
        date: BusinessDate,
        account_id: AccountId,
        eod_balance_id: BalanceRunId,
        balance: Decimal,
    },
    BalanceRunExtended {
        date: BusinessDate,
        account_id: AccountId,
        eod_balance_id: BalanceRunId,
    },

    // ── Accrual runs ───────────────────────────────
    AccrualRunCreated {
        date: BusinessDate,
        account_id: AccountId,
        accrual_run_id: AccrualRunId,
        start_accrual_balance: Decimal,
    },
    AccrualRunExtended {
        date: BusinessDate,
        account_id: AccountId,
        accrual_run_id: AccrualRunId,
    },
    DailyAccrualRecorded {
        date: BusinessDate,
        account_id: AccountId,
        accrual_run_id: AccrualRunId,
        delta: Decimal,
    },
    PaymentGenerated {
        date: BusinessDate,
        account_id: AccountId,
        period_id: PeriodId,
        payment_id: PaymentId,
        amount: Decimal,
        payment_date: BusinessDate,
    },

    // ── Ledger ─────────────────────────────────────
    LedgerEntryPosted {
        accrual_date: BusinessDate,
        value_date: BusinessDate,
        product_id: ProductId,
        entry_id: LedgerEntryId,
        amount: Decimal,
    },

    // ── Failure isolation ──────────────────────────
    AccountQuarantined {
        date: BusinessDate,
        account_id: AccountId,
        stage: String,
        error_kind: String,
    },
    AccountSkipped {
        date: BusinessDate,
        account_id: AccountId,
        stage: String,
    },
}

impl BatchEvent {
    /// Stable name, used for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            BatchEvent::DayStarted { .. }           => "day_started",
            BatchEvent::DayCompleted { .. }         => "day_completed",
            BatchEvent::AccountCreated { .. }       => "account_created",
            BatchEvent::AccountClosed { .. }        => "account_closed",
            BatchEvent::PeriodOpened { .. }         => "period_opened",
            BatchEvent::BalanceRunCreated { .. }    => "balance_run_created",
            BatchEvent::BalanceRunExtended { .. }   => "balance_run_extended",
            BatchEvent::AccrualRunCreated { .. }    => "accrual_run_created",
            BatchEvent::AccrualRunExtended { .. }   => "accrual_run_extended",
            BatchEvent::DailyAccrualRecorded { .. } => "daily_accrual_recorded",
            BatchEvent::PaymentGenerated { .. }     => "payment_generated",
            BatchEvent::LedgerEntryPosted { .. }    => "ledger_entry_posted",
            BatchEvent::AccountQuarantined { .. }   => "account_quarantined",
            BatchEvent::AccountSkipped { .. }       => "account_skipped",
        }
    }
}

/// A persisted event log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub business_date: BusinessDate,
    pub subsystem: String,
    pub event_type: String,
    pub payload: String,
}
