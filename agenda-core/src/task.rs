//! Calendar task model.
//!
//! Tasks are owned by the calendar backend. The engine only relocates their
//! timing and rewrites their description; it never deletes one.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::time::local_instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskTiming {
    Timed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    AllDay {
        date: NaiveDate,
    },
}

impl TaskTiming {
    /// Start instant; all-day tasks start at local midnight.
    pub fn start_instant(&self, tz: Tz) -> DateTime<Utc> {
        match *self {
            TaskTiming::Timed { start, .. } => start,
            TaskTiming::AllDay { date } => local_instant(date, NaiveTime::MIN, tz),
        }
    }

    pub fn duration(&self) -> Duration {
        match *self {
            TaskTiming::Timed { start, end } => end - start,
            TaskTiming::AllDay { .. } => Duration::days(1),
        }
    }
}

/// A calendar entry as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Backend identifier. Entries from some sources arrive without one.
    pub id: Option<String>,
    pub title: String,

    /// Free text; carries the embedded metadata block.
    #[serde(default)]
    pub description: String,

    pub timing: TaskTiming,

    #[serde(default)]
    pub status: TaskStatus,

    /// E-mail of whoever created the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Browser link to the entry, when the backend has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, timing: TaskTiming) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
            description: String::new(),
            timing,
            status: TaskStatus::Confirmed,
            created_by: None,
            html_link: None,
        }
    }

    pub fn timed(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self::new(id, title, TaskTiming::Timed { start, end })
    }

    pub fn all_day(id: impl Into<String>, title: impl Into<String>, date: NaiveDate) -> Self {
        Self::new(id, title, TaskTiming::AllDay { date })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_html_link(mut self, link: impl Into<String>) -> Self {
        self.html_link = Some(link.into());
        self
    }

    pub fn without_id(mut self) -> Self {
        self.id = None;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == TaskStatus::Cancelled
    }
}

/// Fields for a new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    pub description: String,
    pub timing: TaskTiming,
    pub created_by: Option<String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub timing: Option<TaskTiming>,
    pub description: Option<String>,
}

impl TaskPatch {
    pub fn apply(self, task: &mut Task) {
        if let Some(timing) = self.timing {
            task.timing = timing;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
    }
}
