//! Same-day account administration: opening, closing, and giving an
//! account an interest period.

use crate::{
    error::{BatchError, BatchResult},
    event::BatchEvent,
    store::LedgerStore,
    types::{AccountId, BusinessDate, ProductId, SchemeId},
};

pub fn create_account(
    store: &LedgerStore,
    account_id: AccountId,
    opened_on: BusinessDate,
    product_id: ProductId,
) -> BatchResult<BatchEvent> {
    if store.account(account_id)?.is_some() {
        return Err(BatchError::DuplicateAccount { account_id });
    }
    store.insert_account(account_id, opened_on, product_id)?;
    log::debug!("date={opened_on} account={account_id} opened on product {product_id}");
    Ok(BatchEvent::AccountCreated {
        date: opened_on,
        account_id,
        product_id,
    })
}

pub fn close_account(
    store: &LedgerStore,
    account_id: AccountId,
    on: BusinessDate,
) -> BatchResult<BatchEvent> {
    if store.account(account_id)?.is_none() {
        return Err(BatchError::UnknownAccount { account_id });
    }
    if store.is_closed(account_id)? {
        return Err(BatchError::AccountAlreadyClosed { account_id });
    }
    store.insert_account_closure(account_id, on)?;
    log::debug!("date={on} account={account_id} closed");
    Ok(BatchEvent::AccountClosed { date: on, account_id })
}

/// Give an account the period `start..=end` on `scheme_id`.
///
/// The scheme must have a version in force on `start`, and the new period
/// may not overlap any existing period of the account.
pub fn open_period(
    store: &LedgerStore,
    on: BusinessDate,
    account_id: AccountId,
    scheme_id: SchemeId,
    start: BusinessDate,
    end: BusinessDate,
) -> BatchResult<BatchEvent> {
    if store.account(account_id)?.is_none() {
        return Err(BatchError::UnknownAccount { account_id });
    }
    if start > end {
        return Err(BatchError::InvalidPeriod { account_id, start, end });
    }
    if store.scheme_version_in_force(scheme_id, start)?.is_none() {
        return Err(BatchError::MissingSchemeVersion { scheme_id, date: start });
    }
    if store.overlapping_period_count(account_id, start, end)? > 0 {
        return Err(BatchError::OverlappingPeriod { account_id, start, end });
    }
    let period_id = store.insert_period(account_id, scheme_id, start, end)?;
    log::debug!(
        "date={on} account={account_id} period {period_id} {start}..={end} on scheme {scheme_id}"
    );
    Ok(BatchEvent::PeriodOpened {
        date: on,
        account_id,
        period_id,
        scheme_id,
        start,
        end,
    })
}
