use super::{decimal_at, LedgerStore, SchemeVersionRow};
use crate::{
    error::BatchResult,
    types::{BusinessDate, SchemeId, SchemeVersionId},
};
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;

impl LedgerStore {
    // ── Scheme versions ───────────────────────────────────────────

    pub fn insert_scheme_version(
        &self,
        scheme_id: SchemeId,
        effective_from: BusinessDate,
        aer: Decimal,
    ) -> BatchResult<SchemeVersionId> {
        self.conn.execute(
            "INSERT INTO scheme_version (scheme_id, effective_from, aer) VALUES (?1, ?2, ?3)",
            params![scheme_id, effective_from, aer.to_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn scheme_version(&self, id: SchemeVersionId) -> BatchResult<Option<SchemeVersionRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, scheme_id, effective_from, aer FROM scheme_version WHERE id = ?1",
                params![id],
                Self::map_scheme_version_row,
            )
            .optional()?;
        Ok(row)
    }

    /// The latest version of `scheme_id` with `effective_from <= on`.
    pub fn scheme_version_in_force(
        &self,
        scheme_id: SchemeId,
        on: BusinessDate,
    ) -> BatchResult<Option<SchemeVersionRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, scheme_id, effective_from, aer FROM scheme_version
                 WHERE scheme_id = ?1 AND effective_from <= ?2
                 ORDER BY effective_from DESC, id DESC LIMIT 1",
                params![scheme_id, on],
                Self::map_scheme_version_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn scheme_versions(&self) -> BatchResult<Vec<SchemeVersionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, scheme_id, effective_from, aer FROM scheme_version
             ORDER BY scheme_id ASC, effective_from ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_scheme_version_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_scheme_version_row(row: &Row<'_>) -> rusqlite::Result<SchemeVersionRow> {
        Ok(SchemeVersionRow {
            id: row.get(0)?,
            scheme_id: row.get(1)?,
            effective_from: row.get(2)?,
            aer: decimal_at(row, 3)?,
        })
    }
}
