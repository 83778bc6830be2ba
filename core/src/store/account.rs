use super::{AccountClosureRow, AccountRow, LedgerStore};
use crate::{
    error::BatchResult,
    types::{AccountId, BusinessDate, ProductId},
};
use rusqlite::{params, OptionalExtension};

impl LedgerStore {
    // ── Account ───────────────────────────────────────────────────

    pub fn insert_account(
        &self,
        account_id: AccountId,
        opened_on: BusinessDate,
        product_id: ProductId,
    ) -> BatchResult<()> {
        self.conn.execute(
            "INSERT INTO account (id, opened_on, product_id) VALUES (?1, ?2, ?3)",
            params![account_id, opened_on, product_id],
        )?;
        Ok(())
    }

    pub fn account(&self, account_id: AccountId) -> BatchResult<Option<AccountRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, opened_on, product_id FROM account WHERE id = ?1",
                params![account_id],
                |row| {
                    Ok(AccountRow {
                        id: row.get(0)?,
                        opened_on: row.get(1)?,
                        product_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn accounts(&self) -> BatchResult<Vec<AccountRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, opened_on, product_id FROM account ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AccountRow {
                    id: row.get(0)?,
                    opened_on: row.get(1)?,
                    product_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Closure ───────────────────────────────────────────────────

    pub fn insert_account_closure(
        &self,
        account_id: AccountId,
        on: BusinessDate,
    ) -> BatchResult<()> {
        self.conn.execute(
            "INSERT INTO account_closure (account_id, closed_on) VALUES (?1, ?2)",
            params![account_id, on],
        )?;
        Ok(())
    }

    /// An account is closed iff a closure row exists, whatever its date.
    pub fn is_closed(&self, account_id: AccountId) -> BatchResult<bool> {
        let closed: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM account_closure WHERE account_id = ?1)",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(closed)
    }

    pub fn account_closures(&self) -> BatchResult<Vec<AccountClosureRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, account_id, closed_on FROM account_closure ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AccountClosureRow {
                    id: row.get(0)?,
                    account_id: row.get(1)?,
                    closed_on: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
