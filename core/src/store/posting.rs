use super::{decimal_at, LedgerEntryRow, LedgerStore, PaymentRow};
use crate::{
    error::BatchResult,
    types::{AccountId, BusinessDate, LedgerEntryId, PaymentId, PeriodId, ProductId},
};
use rusqlite::{params, Row};
use rust_decimal::Decimal;

impl LedgerStore {
    // ── Ledger entries ────────────────────────────────────────────

    pub fn insert_ledger_entry(
        &self,
        product_id: ProductId,
        value_date: BusinessDate,
        amount: Decimal,
    ) -> BatchResult<LedgerEntryId> {
        self.conn.execute(
            "INSERT INTO ledger_entry (product_id, value_date, amount) VALUES (?1, ?2, ?3)",
            params![product_id, value_date, amount.to_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn ledger_entries(&self) -> BatchResult<Vec<LedgerEntryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, product_id, value_date, amount FROM ledger_entry ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LedgerEntryRow {
                    id: row.get(0)?,
                    product_id: row.get(1)?,
                    value_date: row.get(2)?,
                    amount: decimal_at(row, 3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Payments ──────────────────────────────────────────────────

    pub fn insert_payment(
        &self,
        account_id: AccountId,
        period_id: PeriodId,
        amount: Decimal,
        date: BusinessDate,
    ) -> BatchResult<PaymentId> {
        self.conn.execute(
            "INSERT INTO payment (account_id, period_id, amount, payment_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![account_id, period_id, amount.to_string(), date],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn payments(&self) -> BatchResult<Vec<PaymentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, account_id, period_id, amount, payment_date FROM payment ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_payment_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn payments_for_account(&self, account_id: AccountId) -> BatchResult<Vec<PaymentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, account_id, period_id, amount, payment_date FROM payment
             WHERE account_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![account_id], Self::map_payment_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_payment_row(row: &Row<'_>) -> rusqlite::Result<PaymentRow> {
        Ok(PaymentRow {
            id: row.get(0)?,
            account_id: row.get(1)?,
            period_id: row.get(2)?,
            amount: decimal_at(row, 3)?,
            date: row.get(4)?,
        })
    }
}
