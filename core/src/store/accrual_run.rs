use super::{decimal_at, AccrualRunRow, DailyAccrualCompletionRow, LedgerStore, NewAccrualRun};
use crate::{
    error::BatchResult,
    types::{AccountId, AccrualRunId, BusinessDate},
};
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;

const ACCRUAL_RUN_COLUMNS: &str = "id, account_id, period_id, scheme_version_id, eod_balance_id,
     run_start, run_end, start_accrual_balance, end_accrual_balance";

impl LedgerStore {
    // ── Accrual runs ──────────────────────────────────────────────

    pub fn insert_accrual_run(&self, run: &NewAccrualRun) -> BatchResult<AccrualRunId> {
        self.conn.execute(
            "INSERT INTO accrual_run
             (account_id, period_id, scheme_version_id, eod_balance_id,
              run_start, run_end, start_accrual_balance, end_accrual_balance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7)",
            params![
                run.account_id,
                run.period_id,
                run.scheme_version_id,
                run.eod_balance_id,
                run.on,
                run.start_accrual_balance.to_string(),
                run.end_accrual_balance.to_string(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn accrual_run(&self, id: AccrualRunId) -> BatchResult<Option<AccrualRunRow>> {
        let sql = format!("SELECT {ACCRUAL_RUN_COLUMNS} FROM accrual_run WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], Self::map_accrual_run_row)
            .optional()?;
        Ok(row)
    }

    /// The account's accrual run covering `on`, latest start first.
    pub fn accrual_run_on(
        &self,
        account_id: AccountId,
        on: BusinessDate,
    ) -> BatchResult<Option<AccrualRunRow>> {
        let sql = format!(
            "SELECT {ACCRUAL_RUN_COLUMNS} FROM accrual_run
             WHERE account_id = ?1 AND run_start <= ?2 AND run_end >= ?2
             ORDER BY run_start DESC, id DESC LIMIT 1"
        );
        let row = self
            .conn
            .query_row(&sql, params![account_id, on], Self::map_accrual_run_row)
            .optional()?;
        Ok(row)
    }

    pub fn extend_accrual_run(
        &self,
        id: AccrualRunId,
        run_end: BusinessDate,
        end_accrual_balance: Decimal,
    ) -> BatchResult<()> {
        self.conn.execute(
            "UPDATE accrual_run SET run_end = ?1, end_accrual_balance = ?2 WHERE id = ?3",
            params![run_end, end_accrual_balance.to_string(), id],
        )?;
        Ok(())
    }

    pub fn accrual_runs_for_account(
        &self,
        account_id: AccountId,
    ) -> BatchResult<Vec<AccrualRunRow>> {
        let sql = format!(
            "SELECT {ACCRUAL_RUN_COLUMNS} FROM accrual_run
             WHERE account_id = ?1 ORDER BY run_start ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![account_id], Self::map_accrual_run_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn accrual_runs(&self) -> BatchResult<Vec<AccrualRunRow>> {
        let sql = format!(
            "SELECT {ACCRUAL_RUN_COLUMNS} FROM accrual_run ORDER BY account_id ASC, run_start ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::map_accrual_run_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_accrual_run_row(row: &Row<'_>) -> rusqlite::Result<AccrualRunRow> {
        Ok(AccrualRunRow {
            id: row.get(0)?,
            account_id: row.get(1)?,
            period_id: row.get(2)?,
            scheme_version_id: row.get(3)?,
            eod_balance_id: row.get(4)?,
            start: row.get(5)?,
            end: row.get(6)?,
            start_accrual_balance: decimal_at(row, 7)?,
            end_accrual_balance: decimal_at(row, 8)?,
        })
    }

    // ── Daily accrual completion queue ────────────────────────────

    pub fn enqueue_daily_accrual(
        &self,
        account_id: AccountId,
        accrual_run_id: AccrualRunId,
        date: BusinessDate,
        delta: Decimal,
    ) -> BatchResult<i64> {
        self.conn.execute(
            "INSERT INTO daily_accrual_completion (account_id, accrual_run_id, business_date, delta)
             VALUES (?1, ?2, ?3, ?4)",
            params![account_id, accrual_run_id, date, delta.to_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn earliest_pending_accrual_date(&self) -> BatchResult<Option<BusinessDate>> {
        let earliest: Option<BusinessDate> = self.conn.query_row(
            "SELECT MIN(business_date) FROM daily_accrual_completion",
            [],
            |row| row.get(0),
        )?;
        Ok(earliest)
    }

    pub fn pending_accruals_on(
        &self,
        date: BusinessDate,
    ) -> BatchResult<Vec<DailyAccrualCompletionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, account_id, accrual_run_id, business_date, delta
             FROM daily_accrual_completion WHERE business_date = ?1
             ORDER BY account_id ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![date], Self::map_daily_accrual_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn pending_accruals(&self) -> BatchResult<Vec<DailyAccrualCompletionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, account_id, accrual_run_id, business_date, delta
             FROM daily_accrual_completion ORDER BY business_date ASC, account_id ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_daily_accrual_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Acknowledge a posted accrual; it will not be posted again.
    pub fn complete_daily_accrual(&self, id: i64) -> BatchResult<()> {
        self.conn
            .execute("DELETE FROM daily_accrual_completion WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn map_daily_accrual_row(row: &Row<'_>) -> rusqlite::Result<DailyAccrualCompletionRow> {
        Ok(DailyAccrualCompletionRow {
            id: row.get(0)?,
            account_id: row.get(1)?,
            accrual_run_id: row.get(2)?,
            date: row.get(3)?,
            delta: decimal_at(row, 4)?,
        })
    }
}
