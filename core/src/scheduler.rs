//! Batch scheduler: drives the business calendar one day at a time.
//!
//! EXECUTION ORDER for calendar day D (fixed, never reordered):
//!   Nightly, closing out business date N = D - 1:
//!     1. Balance runs     ingest N's balance feed, if one arrived
//!     2. Accrual runs     drain balance completions dated <= N
//!     3. Ledger poster    post pending accruals dated < D, value-dated D
//!   Same day, for D:
//!     4. Admin            create / close accounts, open periods
//!   Then:
//!     5. Snapshot         log D's state; store it every N days
//!
//! RULES:
//!   - Nightly stages only ever see state committed before they run.
//!   - No stage calls another stage; they meet only through store queues.
//!   - Every event is appended to the event log as it is produced.

use crate::{
    accrual_run_manager::AccrualRunManager,
    admin,
    balance_run_manager::BalanceRunManager,
    clock::{day_before, BatchClock},
    config::BatchConfig,
    error::BatchResult,
    event::{BatchEvent, EventLogEntry},
    ledger_poster::LedgerPoster,
    snapshot::StateSnapshot,
    store::LedgerStore,
    subsystem::{deserialize_feed, BalanceFeed, BatchSubsystem, NightContext},
    types::{AccountId, BusinessDate, ProductId, SchemeId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One input to the batch, keyed by the date it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DailyAction {
    /// End-of-day balances for the keyed date, consumed the following night.
    ConsumeBalanceFeed {
        #[serde(deserialize_with = "deserialize_feed")]
        balances: BalanceFeed,
    },
    CreateAccount { id: AccountId, product_id: ProductId },
    CloseAccount { id: AccountId },
    OpenPeriod {
        account_id: AccountId,
        scheme_id: SchemeId,
        start: BusinessDate,
        end: BusinessDate,
    },
}

pub type ActionSchedule = BTreeMap<BusinessDate, Vec<DailyAction>>;

pub struct BatchScheduler {
    pub clock: BatchClock,
    pub config: BatchConfig,
    pub store: LedgerStore,
    actions: ActionSchedule,
    subsystems: Vec<Box<dyn BatchSubsystem>>,
    days_run: u64,
}

impl BatchScheduler {
    pub fn new(
        store: LedgerStore,
        config: BatchConfig,
        first_day: BusinessDate,
        last_day: BusinessDate,
    ) -> Self {
        Self {
            clock: BatchClock::new(first_day, last_day),
            config,
            store,
            actions: ActionSchedule::new(),
            subsystems: Vec::new(),
            days_run: 0,
        }
    }

    /// Build a fully wired scheduler with every nightly stage registered.
    /// Call this instead of new() + manual register() calls.
    pub fn build(
        store: LedgerStore,
        config: BatchConfig,
        first_day: BusinessDate,
        last_day: BusinessDate,
    ) -> Self {
        let policy = config.failure_policy;
        let mut scheduler = Self::new(store, config, first_day, last_day);
        scheduler.register(Box::new(BalanceRunManager::new(policy)));
        scheduler.register(Box::new(AccrualRunManager::new(policy)));
        scheduler.register(Box::new(LedgerPoster::new()));
        scheduler
    }

    /// Register a nightly stage. Call in the documented execution order.
    pub fn register(&mut self, subsystem: Box<dyn BatchSubsystem>) {
        self.subsystems.push(subsystem);
    }

    pub fn schedule(&mut self, date: BusinessDate, action: DailyAction) {
        self.actions.entry(date).or_default().push(action);
    }

    pub fn schedule_all(&mut self, actions: ActionSchedule) {
        for (date, day_actions) in actions {
            self.actions.entry(date).or_default().extend(day_actions);
        }
    }

    /// Run every remaining day through `last_day`.
    pub fn run(&mut self) -> BatchResult<()> {
        while self.run_day()?.is_some() {}
        Ok(())
    }

    /// Advance one calendar day and run it. Returns `None` once finished.
    pub fn run_day(&mut self) -> BatchResult<Option<Vec<BatchEvent>>> {
        let Some(day) = self.clock.advance() else {
            return Ok(None);
        };
        let night = day_before(day)?;

        let started = vec![BatchEvent::DayStarted { date: day }];
        record_events(&self.store, day, "scheduler", &started)?;
        let mut day_events = started;

        // Nightly: close out yesterday.
        let feed = self.actions.get(&night).and_then(|actions| {
            actions.iter().find_map(|action| match action {
                DailyAction::ConsumeBalanceFeed { balances } => Some(balances),
                _ => None,
            })
        });
        let ctx = NightContext {
            store: &self.store,
            business_date: night,
            run_date: day,
            feed,
        };
        for subsystem in &mut self.subsystems {
            let events = subsystem.run_nightly(&ctx)?;
            record_events(&self.store, night, subsystem.name(), &events)?;
            day_events.extend(events);
        }

        // Same day: administration for today.
        let mut admin_events = Vec::new();
        for action in self.actions.get(&day).into_iter().flatten() {
            let event = match action {
                DailyAction::CreateAccount { id, product_id } => {
                    admin::create_account(&self.store, *id, day, *product_id)?
                }
                DailyAction::CloseAccount { id } => admin::close_account(&self.store, *id, day)?,
                DailyAction::OpenPeriod { account_id, scheme_id, start, end } => {
                    admin::open_period(&self.store, day, *account_id, *scheme_id, *start, *end)?
                }
                DailyAction::ConsumeBalanceFeed { .. } => continue,
            };
            admin_events.push(event);
        }
        record_events(&self.store, day, "admin", &admin_events)?;
        day_events.extend(admin_events);

        self.snapshot(day)?;

        let completed = vec![BatchEvent::DayCompleted { date: day }];
        record_events(&self.store, day, "scheduler", &completed)?;
        day_events.extend(completed);

        self.days_run += 1;
        log::info!("date={day} day complete: {} events", day_events.len());
        Ok(Some(day_events))
    }

    pub fn days_run(&self) -> u64 {
        self.days_run
    }

    /// Query the event log for one date. Used by tests and the runner.
    pub fn events_for_date(&self, date: BusinessDate) -> BatchResult<Vec<EventLogEntry>> {
        self.store.events_for_date(date)
    }

    fn snapshot(&self, day: BusinessDate) -> BatchResult<()> {
        let due = self.config.snapshot_due(self.days_run);
        if !due && !log::log_enabled!(log::Level::Debug) {
            return Ok(());
        }
        let snapshot = StateSnapshot::capture(&self.store, &self.clock, day, &self.config)?;
        let json = serde_json::to_string(&snapshot)?;
        log::debug!("date={day} state {json}");
        if due {
            self.store.save_snapshot(day, &json)?;
        }
        Ok(())
    }
}

fn record_events(
    store: &LedgerStore,
    business_date: BusinessDate,
    subsystem: &str,
    events: &[BatchEvent],
) -> BatchResult<()> {
    for event in events {
        let entry = EventLogEntry {
            id: None,
            business_date,
            subsystem: subsystem.to_string(),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
        };
        store.append_event(&entry)?;
    }
    Ok(())
}
