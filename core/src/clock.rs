//! Batch clock: owns the simulated business calendar.

use crate::{error::BatchResult, types::BusinessDate};
use chrono::Days;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchClock {
    /// The calendar day currently being run; `None` before the first day.
    pub today: Option<BusinessDate>,
    pub first_day: BusinessDate,
    pub last_day: BusinessDate,
}

impl BatchClock {
    pub fn new(first_day: BusinessDate, last_day: BusinessDate) -> Self {
        Self {
            today: None,
            first_day,
            last_day,
        }
    }

    /// Advance one day. Returns the new day, or `None` once past `last_day`.
    pub fn advance(&mut self) -> Option<BusinessDate> {
        let next = match self.today {
            None => self.first_day,
            Some(today) => today.checked_add_days(Days::new(1))?,
        };
        if next > self.last_day {
            return None;
        }
        self.today = Some(next);
        Some(next)
    }

    pub fn is_finished(&self) -> bool {
        self.today.is_some_and(|today| today >= self.last_day)
    }
}

/// `date - 1`, failing only at the edge of the representable calendar.
pub fn day_before(date: BusinessDate) -> BatchResult<BusinessDate> {
    date.checked_sub_days(Days::new(1))
        .ok_or_else(|| anyhow::anyhow!("no day before {date}").into())
}

/// `date + 1`, failing only at the edge of the representable calendar.
pub fn day_after(date: BusinessDate) -> BatchResult<BusinessDate> {
    date.checked_add_days(Days::new(1))
        .ok_or_else(|| anyhow::anyhow!("no day after {date}").into())
}
