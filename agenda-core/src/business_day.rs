//! Business-day oracle: weekends, holidays, and the override flag.

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::warn;

use crate::backend::HolidayOracle;
use crate::config::BUSINESS_DAY_ADVANCE_LIMIT;

#[derive(Clone, Copy)]
pub struct BusinessDays<'a> {
    holidays: &'a dyn HolidayOracle,
}

impl<'a> BusinessDays<'a> {
    pub fn new(holidays: &'a dyn HolidayOracle) -> Self {
        Self { holidays }
    }

    /// Weekends and holidays are not business days unless `allow_override`.
    ///
    /// A failing holiday lookup counts as "not a holiday".
    pub async fn is_business_day(&self, date: NaiveDate, allow_override: bool) -> bool {
        if allow_override {
            return true;
        }
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        match self.holidays.is_holiday(date).await {
            Ok(holiday) => !holiday,
            Err(e) => {
                warn!(%date, error = %e, "holiday check failed; treating date as a business day");
                true
            }
        }
    }

    /// The first business day strictly after `date`.
    ///
    /// Gives up after a fixed number of calendar days and returns the last
    /// candidate instead of failing.
    pub async fn next_business_day(&self, date: NaiveDate, allow_override: bool) -> NaiveDate {
        let mut candidate = date;
        for _ in 0..BUSINESS_DAY_ADVANCE_LIMIT {
            candidate = match candidate.succ_opt() {
                Some(d) => d,
                None => return candidate,
            };
            if self.is_business_day(candidate, allow_override).await {
                return candidate;
            }
        }
        warn!(
            from = %date,
            fallback = %candidate,
            "no business day found within {BUSINESS_DAY_ADVANCE_LIMIT} days; using fallback"
        );
        candidate
    }
}
