use super::{LedgerStore, PeriodRow};
use crate::{
    error::BatchResult,
    types::{AccountId, BusinessDate, PeriodId, SchemeId},
};
use rusqlite::{params, OptionalExtension, Row};

impl LedgerStore {
    // ── Period ────────────────────────────────────────────────────

    pub fn insert_period(
        &self,
        account_id: AccountId,
        scheme_id: SchemeId,
        start: BusinessDate,
        end: BusinessDate,
    ) -> BatchResult<PeriodId> {
        self.conn.execute(
            "INSERT INTO period (account_id, scheme_id, period_start, period_end)
             VALUES (?1, ?2, ?3, ?4)",
            params![account_id, scheme_id, start, end],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The period whose `[start, end]` contains `on`.
    pub fn period_for_account_on(
        &self,
        account_id: AccountId,
        on: BusinessDate,
    ) -> BatchResult<Option<PeriodRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, account_id, scheme_id, period_start, period_end FROM period
                 WHERE account_id = ?1 AND period_start <= ?2 AND period_end >= ?2
                 ORDER BY period_start DESC, id DESC LIMIT 1",
                params![account_id, on],
                Self::map_period_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Count of the account's periods sharing at least one day with `start..=end`.
    pub fn overlapping_period_count(
        &self,
        account_id: AccountId,
        start: BusinessDate,
        end: BusinessDate,
    ) -> BatchResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM period
             WHERE account_id = ?1 AND period_start <= ?3 AND period_end >= ?2",
            params![account_id, start, end],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn periods(&self) -> BatchResult<Vec<PeriodRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, account_id, scheme_id, period_start, period_end FROM period
             ORDER BY account_id ASC, period_start ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_period_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_period_row(row: &Row<'_>) -> rusqlite::Result<PeriodRow> {
        Ok(PeriodRow {
            id: row.get(0)?,
            account_id: row.get(1)?,
            scheme_id: row.get(2)?,
            start: row.get(3)?,
            end: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::store::LedgerStore;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn containing_period_includes_both_ends() {
        let store = LedgerStore::open_migrated().unwrap();
        store.insert_account(1, date("2024-01-01"), 1).unwrap();
        let id = store
            .insert_period(1, 1, date("2024-01-01"), date("2024-12-31"))
            .unwrap();

        assert_eq!(store.period_for_account_on(1, date("2024-01-01")).unwrap().unwrap().id, id);
        assert_eq!(store.period_for_account_on(1, date("2024-12-31")).unwrap().unwrap().id, id);
        assert!(store.period_for_account_on(1, date("2025-01-01")).unwrap().is_none());
        assert!(store.period_for_account_on(2, date("2024-06-01")).unwrap().is_none());
    }

    #[test]
    fn overlap_counts_shared_days_only() {
        let store = LedgerStore::open_migrated().unwrap();
        store.insert_account(1, date("2024-01-01"), 1).unwrap();
        store.insert_period(1, 1, date("2024-01-01"), date("2024-06-30")).unwrap();

        let adjacent = store
            .overlapping_period_count(1, date("2024-07-01"), date("2024-12-31"))
            .unwrap();
        assert_eq!(adjacent, 0);

        let touching = store
            .overlapping_period_count(1, date("2024-06-30"), date("2024-12-31"))
            .unwrap();
        assert_eq!(touching, 1);
    }
}
