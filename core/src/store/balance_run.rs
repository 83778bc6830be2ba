use super::{decimal_at, BalanceAction, EodBalanceCompletionRow, EodBalanceRunRow, LedgerStore};
use crate::{
    error::BatchResult,
    types::{AccountId, BalanceRunId, BusinessDate},
};
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    OptionalExtension, Row,
};
use rust_decimal::Decimal;

impl ToSql for BalanceAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for BalanceAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "new_run_created" => Ok(BalanceAction::NewRunCreated),
            "run_extended" => Ok(BalanceAction::RunExtended),
            other => Err(FromSqlError::Other(
                format!("unknown balance action '{other}'").into(),
            )),
        }
    }
}

impl LedgerStore {
    // ── EoD balance runs ──────────────────────────────────────────

    /// Start a one-day run: `run_start == run_end == on`.
    pub fn insert_eod_balance_run(
        &self,
        account_id: AccountId,
        on: BusinessDate,
        balance: Decimal,
    ) -> BatchResult<BalanceRunId> {
        self.conn.execute(
            "INSERT INTO eod_balance_run (account_id, run_start, run_end, balance)
             VALUES (?1, ?2, ?2, ?3)",
            params![account_id, on, balance.to_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn eod_balance_run(&self, id: BalanceRunId) -> BatchResult<Option<EodBalanceRunRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, account_id, run_start, run_end, balance
                 FROM eod_balance_run WHERE id = ?1",
                params![id],
                Self::map_eod_balance_run_row,
            )
            .optional()?;
        Ok(row)
    }

    /// The account's run with the greatest `run_start`.
    pub fn latest_eod_balance_run(
        &self,
        account_id: AccountId,
    ) -> BatchResult<Option<EodBalanceRunRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, account_id, run_start, run_end, balance
                 FROM eod_balance_run WHERE account_id = ?1
                 ORDER BY run_start DESC, id DESC LIMIT 1",
                params![account_id],
                Self::map_eod_balance_run_row,
            )
            .optional()?;
        Ok(row)
    }

    /// The account's run whose `[run_start, run_end]` contains `on`.
    pub fn eod_balance_run_on(
        &self,
        account_id: AccountId,
        on: BusinessDate,
    ) -> BatchResult<Option<EodBalanceRunRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, account_id, run_start, run_end, balance
                 FROM eod_balance_run
                 WHERE account_id = ?1 AND run_start <= ?2 AND run_end >= ?2
                 ORDER BY run_start DESC, id DESC LIMIT 1",
                params![account_id, on],
                Self::map_eod_balance_run_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn extend_eod_balance_run(
        &self,
        id: BalanceRunId,
        run_end: BusinessDate,
    ) -> BatchResult<()> {
        self.conn.execute(
            "UPDATE eod_balance_run SET run_end = ?1 WHERE id = ?2",
            params![run_end, id],
        )?;
        Ok(())
    }

    pub fn eod_balance_runs(&self) -> BatchResult<Vec<EodBalanceRunRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, account_id, run_start, run_end, balance FROM eod_balance_run
             ORDER BY account_id ASC, run_start ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_eod_balance_run_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_eod_balance_run_row(row: &Row<'_>) -> rusqlite::Result<EodBalanceRunRow> {
        Ok(EodBalanceRunRow {
            id: row.get(0)?,
            account_id: row.get(1)?,
            run_start: row.get(2)?,
            run_end: row.get(3)?,
            balance: decimal_at(row, 4)?,
        })
    }

    // ── EoD balance completion queue ──────────────────────────────

    pub fn enqueue_eod_balance_completion(
        &self,
        eod_balance_id: BalanceRunId,
        account_id: AccountId,
        date: BusinessDate,
        action_taken: BalanceAction,
    ) -> BatchResult<i64> {
        self.conn.execute(
            "INSERT INTO eod_balance_completion (eod_balance_id, account_id, business_date, action_taken)
             VALUES (?1, ?2, ?3, ?4)",
            params![eod_balance_id, account_id, date, action_taken],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Pending completions dated on or before `up_to`, oldest first.
    pub fn pending_eod_balance_completions(
        &self,
        up_to: BusinessDate,
    ) -> BatchResult<Vec<EodBalanceCompletionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, eod_balance_id, account_id, business_date, action_taken
             FROM eod_balance_completion WHERE business_date <= ?1
             ORDER BY business_date ASC, account_id ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![up_to], Self::map_eod_balance_completion_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn all_pending_eod_balance_completions(&self) -> BatchResult<Vec<EodBalanceCompletionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, eod_balance_id, account_id, business_date, action_taken
             FROM eod_balance_completion
             ORDER BY business_date ASC, account_id ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_eod_balance_completion_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Acknowledge a processed completion; it will not be seen again.
    pub fn complete_eod_balance_completion(&self, id: i64) -> BatchResult<()> {
        self.conn
            .execute("DELETE FROM eod_balance_completion WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn map_eod_balance_completion_row(row: &Row<'_>) -> rusqlite::Result<EodBalanceCompletionRow> {
        Ok(EodBalanceCompletionRow {
            id: row.get(0)?,
            eod_balance_id: row.get(1)?,
            account_id: row.get(2)?,
            date: row.get(3)?,
            action_taken: row.get(4)?,
        })
    }
}
