//! accrual-core: nightly deposit-interest accrual batch.
//!
//! Balance feeds become balance runs, balance runs become accrual runs,
//! accrual runs become floored daily deltas, and the deltas are posted to
//! the ledger per product. See scheduler.rs for the execution order.

pub mod accrual_run_manager;
pub mod admin;
pub mod balance_run_manager;
pub mod clock;
pub mod compounding;
pub mod config;
pub mod error;
pub mod event;
pub mod isolation;
pub mod ledger_poster;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod subsystem;
pub mod types;

pub use config::{BatchConfig, FailurePolicy};
pub use error::{BatchError, BatchResult};
pub use scheduler::{ActionSchedule, BatchScheduler, DailyAction};
pub use store::LedgerStore;
