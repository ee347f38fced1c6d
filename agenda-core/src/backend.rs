//! Collaborator contracts: calendar storage, holiday lookup, identity.
//!
//! Real adapters live outside the core; the engine only talks to these traits.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::task::{Task, TaskPatch, TaskSpec};
use crate::time::TimeRange;

/// A busy period reported by the free/busy query. Not guaranteed sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    pub items: Vec<Task>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Busy intervals overlapping `range` (one civil day).
    async fn query_free_busy(&self, range: TimeRange, resource_id: &str)
    -> Result<Vec<BusyInterval>>;

    async fn list_tasks(
        &self,
        range: TimeRange,
        resource_id: &str,
        page_token: Option<&str>,
    ) -> Result<TaskPage>;

    async fn create_task(&self, resource_id: &str, spec: TaskSpec) -> Result<Task>;

    async fn patch_task(&self, resource_id: &str, id: &str, patch: TaskPatch) -> Result<Task>;

    async fn get_task(&self, resource_id: &str, id: &str) -> Result<Option<Task>>;
}

#[async_trait]
pub trait HolidayOracle: Send + Sync {
    /// May fail; callers treat failure as "not a holiday".
    async fn is_holiday(&self, date: NaiveDate) -> Result<bool>;
}

pub trait Identity: Send + Sync {
    fn current_user_email(&self) -> String;
}

/// Fixed holiday set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticHolidays {
    dates: BTreeSet<NaiveDate>,
}

impl StaticHolidays {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HolidayOracle for StaticHolidays {
    async fn is_holiday(&self, date: NaiveDate) -> Result<bool> {
        Ok(self.dates.contains(&date))
    }
}

/// Identity with a fixed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedIdentity(pub String);

impl Identity for FixedIdentity {
    fn current_user_email(&self) -> String {
        self.0.clone()
    }
}
