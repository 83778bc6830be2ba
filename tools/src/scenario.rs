//! Scenario files: scheme versions plus account histories, expanded into
//! the dated actions the scheduler consumes.

use accrual_core::{
    scheduler::{ActionSchedule, DailyAction},
    store::LedgerStore,
    subsystem::BalanceFeed,
    types::{AccountId, BusinessDate, ProductId, SchemeId},
};
use anyhow::{anyhow, Result};
use chrono::{Days, Months};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Last calendar day to run. Feeds stop the day before.
    pub today: BusinessDate,
    pub scheme_versions: Vec<SchemeVersionSeed>,
    pub accounts: Vec<AccountHistory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemeVersionSeed {
    pub scheme_id: SchemeId,
    pub effective_from: BusinessDate,
    pub aer: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountHistory {
    pub id: AccountId,
    pub product_id: ProductId,
    pub opened: BusinessDate,
    #[serde(default)]
    pub closed: Option<BusinessDate>,
    pub scheme_id: SchemeId,
    #[serde(default = "default_term_years")]
    pub term_years: u32,
    /// `(date, balance)` pairs; a balance holds until the next pair.
    pub balances: Vec<(BusinessDate, Decimal)>,
}

fn default_term_years() -> u32 {
    1
}

impl AccountHistory {
    fn is_open_on(&self, day: BusinessDate) -> bool {
        self.opened <= day && self.closed.map_or(true, |closed| closed > day)
    }

    fn balance_on(&self, day: BusinessDate) -> Option<Decimal> {
        self.balances
            .iter()
            .filter(|(date, _)| *date <= day)
            .max_by_key(|(date, _)| *date)
            .map(|(_, balance)| *balance)
    }

    fn period_end(&self) -> Result<BusinessDate> {
        self.opened
            .checked_add_months(Months::new(12 * self.term_years))
            .ok_or_else(|| anyhow!("account {}: term overflows the calendar", self.id))
    }
}

impl Scenario {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(content)?;
        if scenario.accounts.is_empty() {
            return Err(anyhow!("scenario has no accounts"));
        }
        Ok(scenario)
    }

    pub fn first_day(&self) -> Result<BusinessDate> {
        self.accounts
            .iter()
            .map(|a| a.opened)
            .min()
            .ok_or_else(|| anyhow!("scenario has no accounts"))
    }

    pub fn seed_schemes(&self, store: &LedgerStore) -> Result<()> {
        for seed in &self.scheme_versions {
            store.insert_scheme_version(seed.scheme_id, seed.effective_from, seed.aer)?;
        }
        Ok(())
    }

    /// Expand account histories into dated actions:
    /// open and period on `opened`, close on `closed`, and one balance feed
    /// per day from the first opening up to the day before `today`.
    pub fn actions(&self) -> Result<ActionSchedule> {
        let mut schedule = ActionSchedule::new();
        for account in &self.accounts {
            let opened = schedule.entry(account.opened).or_default();
            opened.push(DailyAction::CreateAccount {
                id: account.id,
                product_id: account.product_id,
            });
            opened.push(DailyAction::OpenPeriod {
                account_id: account.id,
                scheme_id: account.scheme_id,
                start: account.opened,
                end: account.period_end()?,
            });
            if let Some(closed) = account.closed {
                schedule
                    .entry(closed)
                    .or_default()
                    .push(DailyAction::CloseAccount { id: account.id });
            }
        }

        let mut day = self.first_day()?;
        while day < self.today {
            let balances: BalanceFeed = self
                .accounts
                .iter()
                .filter(|a| a.is_open_on(day))
                .filter_map(|a| a.balance_on(day).map(|balance| (a.id, balance)))
                .collect();
            schedule
                .entry(day)
                .or_default()
                .push(DailyAction::ConsumeBalanceFeed { balances });
            day = day
                .checked_add_days(Days::new(1))
                .ok_or_else(|| anyhow!("calendar overflow after {day}"))?;
        }
        Ok(schedule)
    }
}
