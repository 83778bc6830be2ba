//! Accrual run manager.
//!
//! Consumes balance completions and maintains accrual runs: maximal
//! stretches over which the same balance run, period and scheme version
//! applied. Within a run the residual is always re-derived from the run's
//! anchor, so rounding never accumulates day over day. Each processed
//! completion leaves one floored daily delta on the posting queue, and a
//! payment when the account's period ends that day.
//!
//! Decision table for "today" T and "yesterday" Y = T - 1:
//!   Y balance run, period, scheme version and accrual run all exist, and
//!   the first three are the same records that apply on T   -> continue
//!   anything else                                          -> new run

use crate::{
    clock::{day_after, day_before},
    compounding::{compounded_residual, floor_money},
    config::FailurePolicy,
    error::{BatchError, BatchResult},
    event::BatchEvent,
    isolation::{run_for_account, AccountOutcome},
    store::{
        AccrualRunRow, EodBalanceCompletionRow, EodBalanceRunRow, LedgerStore, NewAccrualRun,
        PeriodRow, SchemeVersionRow,
    },
    subsystem::{BatchSubsystem, NightContext},
    types::{AccountId, AccrualRunId, BusinessDate, PaymentId, PeriodId},
};
use rust_decimal::Decimal;

pub const STAGE: &str = "accrual";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualAction {
    NewRunCreated,
    RunContinued,
}

/// The result of accruing one account for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAccrual {
    pub account_id: AccountId,
    pub date: BusinessDate,
    pub accrual_run_id: AccrualRunId,
    pub action: AccrualAction,
    /// Residual at the run's start (new run) or at yesterday (continuation).
    pub previous_residual: Decimal,
    pub current_residual: Decimal,
    pub accrued_today: Decimal,
    pub payment: Option<GeneratedPayment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPayment {
    pub id: PaymentId,
    pub period_id: PeriodId,
    pub amount: Decimal,
    pub date: BusinessDate,
}

impl DailyAccrual {
    pub fn events(&self) -> Vec<BatchEvent> {
        let mut events = vec![
            match self.action {
                AccrualAction::NewRunCreated => BatchEvent::AccrualRunCreated {
                    date: self.date,
                    account_id: self.account_id,
                    accrual_run_id: self.accrual_run_id,
                    start_accrual_balance: self.previous_residual,
                },
                AccrualAction::RunContinued => BatchEvent::AccrualRunExtended {
                    date: self.date,
                    account_id: self.account_id,
                    accrual_run_id: self.accrual_run_id,
                },
            },
            BatchEvent::DailyAccrualRecorded {
                date: self.date,
                account_id: self.account_id,
                accrual_run_id: self.accrual_run_id,
                delta: self.accrued_today,
            },
        ];
        if let Some(payment) = &self.payment {
            events.push(BatchEvent::PaymentGenerated {
                date: self.date,
                account_id: self.account_id,
                period_id: payment.period_id,
                payment_id: payment.id,
                amount: payment.amount,
                payment_date: payment.date,
            });
        }
        events
    }
}

/// Records that applied to an account on one date.
struct DayState {
    balance_run: Option<EodBalanceRunRow>,
    period: Option<PeriodRow>,
    scheme_version: Option<SchemeVersionRow>,
    accrual_run: Option<AccrualRunRow>,
}

impl DayState {
    fn load(store: &LedgerStore, account_id: AccountId, on: BusinessDate) -> BatchResult<Self> {
        let period = store.period_for_account_on(account_id, on)?;
        let scheme_version = match &period {
            Some(p) => store.scheme_version_in_force(p.scheme_id, on)?,
            None => None,
        };
        Ok(Self {
            balance_run: store.eod_balance_run_on(account_id, on)?,
            period,
            scheme_version,
            accrual_run: store.accrual_run_on(account_id, on)?,
        })
    }
}

pub struct AccrualRunManager {
    policy: FailurePolicy,
}

impl AccrualRunManager {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    /// Drain every pending completion dated on or before `processing_date`,
    /// oldest first. Each completion is accrued against its own date.
    pub fn process_balance_completions(
        &self,
        store: &LedgerStore,
        processing_date: BusinessDate,
    ) -> BatchResult<Vec<BatchEvent>> {
        let pending = store.pending_eod_balance_completions(processing_date)?;
        let mut events = Vec::with_capacity(pending.len() * 2);
        let (mut accrued, mut paid, mut held) = (0usize, 0usize, 0usize);

        for completion in &pending {
            let account_id = completion.account_id;
            if store.is_quarantined(account_id)? {
                log::debug!(
                    "date={} account={account_id} completion parked while quarantined",
                    completion.date
                );
                events.push(BatchEvent::AccountSkipped {
                    date: completion.date,
                    account_id,
                    stage: STAGE.to_string(),
                });
                held += 1;
                continue;
            }

            let outcome = run_for_account(
                store,
                self.policy,
                account_id,
                completion.date,
                STAGE,
                None,
                |s| Self::process_completion(s, completion),
            )?;
            match outcome {
                AccountOutcome::Done(accrual) => {
                    accrued += 1;
                    if accrual.payment.is_some() {
                        paid += 1;
                    }
                    events.extend(accrual.events());
                }
                AccountOutcome::Quarantined(event) => {
                    held += 1;
                    events.push(event);
                }
            }
        }

        log::info!(
            "date={processing_date} accruals: {accrued} accounts accrued, {paid} payments, {held} held"
        );
        Ok(events)
    }

    /// Accrue one account for the completion's date and acknowledge it.
    pub fn process_completion(
        store: &LedgerStore,
        completion: &EodBalanceCompletionRow,
    ) -> BatchResult<DailyAccrual> {
        let account_id = completion.account_id;
        let today = completion.date;
        let yesterday = day_before(today)?;

        let balance_run = store
            .eod_balance_run(completion.eod_balance_id)?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "completion {} references missing balance run {}",
                    completion.id,
                    completion.eod_balance_id
                )
            })?;
        let period = store
            .period_for_account_on(account_id, today)?
            .ok_or(BatchError::MissingPeriod { account_id, date: today })?;
        let scheme_version = store
            .scheme_version_in_force(period.scheme_id, today)?
            .ok_or(BatchError::MissingSchemeVersion {
                scheme_id: period.scheme_id,
                date: today,
            })?;
        let previous = DayState::load(store, account_id, yesterday)?;

        let continues = match (&previous.balance_run, &previous.period, &previous.scheme_version) {
            (Some(b), Some(p), Some(v)) => {
                previous.accrual_run.is_some()
                    && b.id == balance_run.id
                    && p.id == period.id
                    && v.id == scheme_version.id
            }
            _ => false,
        };

        let principal = balance_run.balance;
        let aer = scheme_version.aer;
        let overflow = || BatchError::CompoundingOverflow { account_id, date: today };

        let (action, accrual_run_id, previous_residual, current_residual) = if continues {
            let run = previous
                .accrual_run
                .as_ref()
                .ok_or(BatchError::MissingAccrualRun { account_id, date: yesterday })?;
            if run.end != yesterday {
                return Err(BatchError::NonContiguousAccrualRun {
                    account_id,
                    run_id: run.id,
                    run_end: run.end,
                    expected: yesterday,
                });
            }
            let anchor = run.start_accrual_balance;
            let before = compounded_residual(aer, run.start, yesterday, principal, anchor)
                .ok_or_else(overflow)?;
            let after = compounded_residual(aer, run.start, today, principal, anchor)
                .ok_or_else(overflow)?;
            store.extend_accrual_run(run.id, today, after)?;
            (AccrualAction::RunContinued, run.id, before, after)
        } else {
            let carried = previous
                .accrual_run
                .as_ref()
                .map_or(Decimal::ZERO, |run| run.end_accrual_balance);
            // The whole cents were paid out when the previous period matured.
            let starting = match &previous.period {
                Some(p) if p.end == yesterday => carried - floor_money(carried),
                _ => carried,
            };
            let current = compounded_residual(aer, today, today, principal, starting)
                .ok_or_else(overflow)?;
            let id = store.insert_accrual_run(&NewAccrualRun {
                account_id,
                period_id: period.id,
                scheme_version_id: scheme_version.id,
                eod_balance_id: balance_run.id,
                on: today,
                start_accrual_balance: starting,
                end_accrual_balance: current,
            })?;
            (AccrualAction::NewRunCreated, id, starting, current)
        };

        let accrued_today = floor_money(current_residual - previous_residual);
        store.enqueue_daily_accrual(account_id, accrual_run_id, today, accrued_today)?;

        let payment = if period.end == today {
            let amount = floor_money(current_residual);
            let date = day_after(today)?;
            let id = store.insert_payment(account_id, period.id, amount, date)?;
            log::debug!(
                "date={today} account={account_id} period {} matured, paying {amount} on {date}",
                period.id
            );
            Some(GeneratedPayment { id, period_id: period.id, amount, date })
        } else {
            None
        };

        store.complete_eod_balance_completion(completion.id)?;
        log::debug!(
            "date={today} account={account_id} {action:?} run={accrual_run_id} \
             residual {previous_residual} -> {current_residual} accrued={accrued_today}"
        );

        Ok(DailyAccrual {
            account_id,
            date: today,
            accrual_run_id,
            action,
            previous_residual,
            current_residual,
            accrued_today,
            payment,
        })
    }
}

impl BatchSubsystem for AccrualRunManager {
    fn name(&self) -> &'static str { "accrual_runs" }

    fn run_nightly(&mut self, ctx: &NightContext<'_>) -> BatchResult<Vec<BatchEvent>> {
        self.process_balance_completions(ctx.store, ctx.business_date)
    }
}
