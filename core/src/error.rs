use crate::types::{AccountId, AccrualRunId, BusinessDate, SchemeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    // ── Balance feed ───────────────────────────────────────────
    #[error("EoD balance submitted for closed account {account_id} on {date}")]
    ClosedAccount { account_id: AccountId, date: BusinessDate },

    #[error("EoD balance discontinuity for account {account_id}: run ends {run_end}, feed is for {date}")]
    Discontinuity {
        account_id: AccountId,
        run_end: BusinessDate,
        date: BusinessDate,
    },

    // ── Data setup ─────────────────────────────────────────────
    #[error("Account {account_id} has no period covering {date}")]
    MissingPeriod { account_id: AccountId, date: BusinessDate },

    #[error("Scheme {scheme_id} has no version in force on {date}")]
    MissingSchemeVersion { scheme_id: SchemeId, date: BusinessDate },

    // ── Run continuation invariants ────────────────────────────
    #[error("Expected an accrual run for account {account_id} on {date}")]
    MissingAccrualRun { account_id: AccountId, date: BusinessDate },

    #[error("Accrual run {run_id} for account {account_id} ends {run_end}, expected {expected}")]
    NonContiguousAccrualRun {
        account_id: AccountId,
        run_id: AccrualRunId,
        run_end: BusinessDate,
        expected: BusinessDate,
    },

    #[error("Compounding overflowed for account {account_id} on {date}")]
    CompoundingOverflow { account_id: AccountId, date: BusinessDate },

    // ── Admin actions ──────────────────────────────────────────
    #[error("Account {account_id} not found")]
    UnknownAccount { account_id: AccountId },

    #[error("Account {account_id} already exists")]
    DuplicateAccount { account_id: AccountId },

    #[error("Account {account_id} already closed")]
    AccountAlreadyClosed { account_id: AccountId },

    #[error("Invalid period for account {account_id}: {start} is after {end}")]
    InvalidPeriod {
        account_id: AccountId,
        start: BusinessDate,
        end: BusinessDate,
    },

    #[error("Period {start}..={end} overlaps an existing period for account {account_id}")]
    OverlappingPeriod {
        account_id: AccountId,
        start: BusinessDate,
        end: BusinessDate,
    },

    // ── Infrastructure ─────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BatchError {
    /// Failures a later attempt may clear without operator changes to
    /// reference data (a late feed file, for instance).
    pub fn is_retryable(&self) -> bool {
        matches!(self, BatchError::Discontinuity { .. })
    }

    /// Failures confined to one account's run chain. Everything else stops
    /// the batch regardless of policy.
    pub fn is_account_scoped(&self) -> bool {
        matches!(
            self,
            BatchError::ClosedAccount { .. }
                | BatchError::Discontinuity { .. }
                | BatchError::MissingPeriod { .. }
                | BatchError::MissingSchemeVersion { .. }
                | BatchError::MissingAccrualRun { .. }
                | BatchError::NonContiguousAccrualRun { .. }
                | BatchError::CompoundingOverflow { .. }
                | BatchError::UnknownAccount { .. }
        )
    }

    /// Stable kind name, recorded on dead-letter rows.
    pub fn kind(&self) -> &'static str {
        match self {
            BatchError::ClosedAccount { .. }           => "closed_account",
            BatchError::Discontinuity { .. }           => "discontinuity",
            BatchError::MissingPeriod { .. }           => "missing_period",
            BatchError::MissingSchemeVersion { .. }    => "missing_scheme_version",
            BatchError::MissingAccrualRun { .. }       => "missing_accrual_run",
            BatchError::NonContiguousAccrualRun { .. } => "non_contiguous_accrual_run",
            BatchError::CompoundingOverflow { .. }     => "compounding_overflow",
            BatchError::UnknownAccount { .. }          => "unknown_account",
            BatchError::DuplicateAccount { .. }        => "duplicate_account",
            BatchError::AccountAlreadyClosed { .. }    => "account_already_closed",
            BatchError::InvalidPeriod { .. }           => "invalid_period",
            BatchError::OverlappingPeriod { .. }       => "overlapping_period",
            BatchError::Database(_)                    => "database",
            BatchError::Serialization(_)               => "serialization",
            BatchError::Other(_)                       => "other",
        }
    }
}

pub type BatchResult<T> = Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn discontinuity_is_the_only_retryable_kind() {
        let gap = BatchError::Discontinuity {
            account_id: 7,
            run_end: date("2024-04-01"),
            date: date("2024-04-03"),
        };
        assert!(gap.is_retryable());
        assert!(gap.is_account_scoped());

        let missing = BatchError::MissingPeriod { account_id: 7, date: date("2024-04-03") };
        assert!(!missing.is_retryable());
        assert!(missing.is_account_scoped());
    }

    #[test]
    fn admin_errors_are_not_account_scoped() {
        assert!(!BatchError::DuplicateAccount { account_id: 1 }.is_account_scoped());
        assert!(!BatchError::OverlappingPeriod {
            account_id: 1,
            start: date("2024-01-01"),
            end: date("2024-12-31"),
        }
        .is_account_scoped());
    }

    #[test]
    fn display_names_account_and_dates() {
        let err = BatchError::ClosedAccount { account_id: 5, date: date("2024-04-13") };
        assert_eq!(
            err.to_string(),
            "EoD balance submitted for closed account 5 on 2024-04-13"
        );
        assert_eq!(err.kind(), "closed_account");
    }
}
