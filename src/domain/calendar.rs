//! Per-step calendar of the hourly horizon.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Steps in the annual horizon.
pub const HOURS_PER_YEAR: usize = 8760;
/// Duration of one step in hours.
pub const STEP_HOURS: f64 = 1.0;

/// Calendar attributes of one hourly step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarStep {
    /// Month number, 1-12.
    pub month: u32,
    pub weekday: Weekday,
    #[serde(default)]
    pub holiday: bool,
}

impl CalendarStep {
    /// Weekends and holidays share the cheapest tariff period.
    pub fn is_off_day(&self) -> bool {
        self.holiday || matches!(self.weekday, Weekday::Sat | Weekday::Sun)
    }
}

/// Ordered steps of the horizon. The first step starts at 00:00, so the hour
/// of day of step `t` is `t mod 24`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Calendar {
    steps: Vec<CalendarStep>,
}

impl Calendar {
    pub fn new(steps: Vec<CalendarStep>) -> Self {
        Self { steps }
    }

    /// Hourly calendar for `year`, truncated to [`HOURS_PER_YEAR`] steps.
    pub fn for_year(year: i32, holidays: &[NaiveDate]) -> Result<Self, ModelError> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| ModelError::config("calendar", format!("invalid year {year}")))?;
        let steps = (0..HOURS_PER_YEAR)
            .map(|t| {
                let date = start
                    .checked_add_days(Days::new((t / 24) as u64))
                    .unwrap_or(start);
                CalendarStep {
                    month: date.month(),
                    weekday: date.weekday(),
                    holiday: holidays.contains(&date),
                }
            })
            .collect();
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[CalendarStep] {
        &self.steps
    }

    pub fn step(&self, t: usize) -> &CalendarStep {
        &self.steps[t]
    }

    pub fn hour(&self, t: usize) -> u32 {
        (t % 24) as u32
    }

    /// Months that occur in the horizon, ascending.
    pub fn months(&self) -> Vec<u32> {
        let mut months: Vec<u32> = self.steps.iter().map(|s| s.month).collect();
        months.sort_unstable();
        months.dedup();
        months
    }

    /// Distinct days of the horizon that fall in `month`.
    pub fn days_in_month(&self, month: u32) -> usize {
        let mut days: Vec<usize> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.month == month)
            .map(|(t, _)| t / 24)
            .collect();
        days.dedup();
        days.len()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.steps.is_empty() {
            return Err(ModelError::config("calendar", "horizon has no steps"));
        }
        if let Some((t, s)) = self
            .steps
            .iter()
            .enumerate()
            .find(|(_, s)| !(1..=12).contains(&s.month))
        {
            return Err(ModelError::config(
                format!("calendar step {t}"),
                format!("month {} outside 1-12", s.month),
            ));
        }
        Ok(())
    }
}
