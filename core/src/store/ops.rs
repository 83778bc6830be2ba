use super::{optional_decimal_at, DeadLetterRow, LedgerStore, QuarantineRow};
use crate::{
    error::BatchResult,
    event::EventLogEntry,
    types::{AccountId, BusinessDate},
};
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;

const DEAD_LETTER_COLUMNS: &str =
    "id, account_id, business_date, stage, error_kind, retryable, balance, message";

impl LedgerStore {
    // ── Event log ──────────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> BatchResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (business_date, subsystem, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.business_date, entry.subsystem, entry.event_type, entry.payload],
        )?;
        Ok(())
    }

    pub fn events_for_date(&self, date: BusinessDate) -> BatchResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, business_date, subsystem, event_type, payload
             FROM event_log WHERE business_date = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![date], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    business_date: row.get(1)?,
                    subsystem: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Snapshot ───────────────────────────────────────────────────

    pub fn save_snapshot(&self, date: BusinessDate, state_json: &str) -> BatchResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshot (business_date, state_json) VALUES (?1, ?2)",
            params![date, state_json],
        )?;
        Ok(())
    }

    pub fn latest_snapshot_on_or_before(
        &self,
        date: BusinessDate,
    ) -> BatchResult<Option<(BusinessDate, String)>> {
        let result = self
            .conn
            .query_row(
                "SELECT business_date, state_json FROM snapshot
                 WHERE business_date <= ?1
                 ORDER BY business_date DESC LIMIT 1",
                params![date],
                |row| Ok((row.get::<_, BusinessDate>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(result)
    }

    // ── Dead letters ───────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn insert_dead_letter(
        &self,
        account_id: AccountId,
        business_date: BusinessDate,
        stage: &str,
        error_kind: &str,
        retryable: bool,
        balance: Option<Decimal>,
        message: &str,
    ) -> BatchResult<i64> {
        self.conn.execute(
            "INSERT INTO dead_letter
             (account_id, business_date, stage, error_kind, retryable, balance, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                account_id,
                business_date,
                stage,
                error_kind,
                retryable,
                balance.map(|b| b.to_string()),
                message,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn dead_letters(&self) -> BatchResult<Vec<DeadLetterRow>> {
        let sql = format!("SELECT {DEAD_LETTER_COLUMNS} FROM dead_letter ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::map_dead_letter_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Retryable letters from `stage` that still carry a balance, oldest first.
    pub fn held_balances(
        &self,
        account_id: AccountId,
        stage: &str,
    ) -> BatchResult<Vec<DeadLetterRow>> {
        let sql = format!(
            "SELECT {DEAD_LETTER_COLUMNS} FROM dead_letter
             WHERE account_id = ?1 AND stage = ?2 AND retryable = 1 AND balance IS NOT NULL
             ORDER BY business_date ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![account_id, stage], Self::map_dead_letter_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_dead_letter(&self, id: i64) -> BatchResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM dead_letter WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn map_dead_letter_row(row: &Row<'_>) -> rusqlite::Result<DeadLetterRow> {
        Ok(DeadLetterRow {
            id: row.get(0)?,
            account_id: row.get(1)?,
            business_date: row.get(2)?,
            stage: row.get(3)?,
            error_kind: row.get(4)?,
            retryable: row.get(5)?,
            balance: optional_decimal_at(row, 6)?,
            message: row.get(7)?,
        })
    }

    // ── Quarantine ─────────────────────────────────────────────────

    /// First quarantine wins; re-quarantining keeps the original reason.
    pub fn quarantine_account(
        &self,
        account_id: AccountId,
        since: BusinessDate,
        reason: &str,
    ) -> BatchResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO quarantine (account_id, since, reason) VALUES (?1, ?2, ?3)",
            params![account_id, since, reason],
        )?;
        Ok(())
    }

    pub fn is_quarantined(&self, account_id: AccountId) -> BatchResult<bool> {
        let quarantined: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM quarantine WHERE account_id = ?1)",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(quarantined)
    }

    /// Returns whether the account was quarantined.
    pub fn release_quarantine(&self, account_id: AccountId) -> BatchResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM quarantine WHERE account_id = ?1", params![account_id])?;
        Ok(removed > 0)
    }

    pub fn quarantined_accounts(&self) -> BatchResult<Vec<QuarantineRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT account_id, since, reason FROM quarantine ORDER BY account_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(QuarantineRow {
                    account_id: row.get(0)?,
                    since: row.get(1)?,
                    reason: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
