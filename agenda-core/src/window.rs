//! Business-hours windows ("HH:MM-HH:MM").

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::time::{local_instant, parse_hhmm};

/// A time-of-day range inside a single civil date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Window {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Window {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, SchedulerError> {
        if start >= end {
            return Err(SchedulerError::InvalidWindow(format!(
                "{}-{}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(Self { start, end })
    }

    /// Window bounds as instants on `date`.
    pub fn bounds(&self, date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        (local_instant(date, self.start, tz), local_instant(date, self.end, tz))
    }
}

impl FromStr for Window {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchedulerError::InvalidWindow(s.trim().to_string());
        let (a, b) = s.split_once('-').ok_or_else(invalid)?;
        let start = parse_hhmm(a).ok_or_else(invalid)?;
        let end = parse_hhmm(b).ok_or_else(invalid)?;
        Window::new(start, end).map_err(|_| invalid())
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

impl TryFrom<String> for Window {
    type Error = SchedulerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Window> for String {
    fn from(w: Window) -> Self {
        w.to_string()
    }
}

/// Parse a comma-separated window list: "09:00-12:00, 13:00-18:00".
pub fn parse_windows(s: &str) -> Result<Vec<Window>, SchedulerError> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect()
}
