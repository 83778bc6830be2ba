//! Shared primitive types used across the entire batch.

use chrono::NaiveDate;

/// A business date. One batch night closes exactly one business date.
pub type BusinessDate = NaiveDate;

/// Caller-assigned account identifier.
pub type AccountId = i64;

/// Caller-assigned product identifier. Ledger postings aggregate per product.
pub type ProductId = i64;

/// Caller-assigned deposit scheme identifier.
pub type SchemeId = i64;

// Store-assigned row identifiers.
pub type SchemeVersionId = i64;
pub type PeriodId = i64;
pub type BalanceRunId = i64;
pub type AccrualRunId = i64;
pub type LedgerEntryId = i64;
pub type PaymentId = i64;
