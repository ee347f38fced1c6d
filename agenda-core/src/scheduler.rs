//! Engine facade: configuration plus collaborators, one method per operation.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::{CalendarBackend, HolidayOracle, Identity};
use crate::business_day::BusinessDays;
use crate::config::{DEFAULT_PRIORITY, EngineConfig};
use crate::error::{Result, SchedulerError};
use crate::metadata::{MetaValue, Metadata, decode, encode, keys};
use crate::priority::{compute_priority, effective_priority, stored_score};
use crate::slot::{DatedSlot, SlotFinder, SlotRequest};
use crate::sweep::{RescheduleSweep, SweepDefaults, SweepReport};
use crate::task::{Task, TaskSpec, TaskTiming};
use crate::time::{TimeRange, civil_date, day_range};
use crate::window::Window;

/// Slot search input; unset fields come from the engine config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotQuery {
    pub date: Option<NaiveDate>,
    pub preferred_start: Option<NaiveTime>,
    pub duration_hours: Option<f64>,
    pub windows: Option<Vec<Window>>,
    pub min_gap_minutes: Option<i64>,
    pub allow_weekend_holiday: Option<bool>,
}

/// A task to place on the calendar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub body: String,
    pub all_day: bool,
    pub slot: SlotQuery,
    pub metadata: Option<Metadata>,
    /// Explicit priority; skips metadata-derived scoring.
    pub priority: Option<MetaValue>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A stored task with its description split apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub task: Task,
    pub body: String,
    pub metadata: Option<Metadata>,
    pub priority: f64,
}

pub struct Scheduler {
    config: EngineConfig,
    backend: Arc<dyn CalendarBackend>,
    holidays: Arc<dyn HolidayOracle>,
    identity: Arc<dyn Identity>,
}

impl Scheduler {
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn CalendarBackend>,
        holidays: Arc<dyn HolidayOracle>,
        identity: Arc<dyn Identity>,
    ) -> Self {
        Self {
            config,
            backend,
            holidays,
            identity,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn days(&self) -> BusinessDays<'_> {
        BusinessDays::new(self.holidays.as_ref())
    }

    fn finder(&self) -> SlotFinder<'_> {
        SlotFinder::new(
            self.backend.as_ref(),
            self.holidays.as_ref(),
            self.config.timezone,
            &self.config.resource_id,
        )
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        civil_date(now, self.config.timezone)
    }

    pub async fn is_business_day(&self, date: NaiveDate, allow_override: bool) -> bool {
        self.days().is_business_day(date, allow_override).await
    }

    pub async fn next_business_day(&self, date: NaiveDate, allow_override: bool) -> NaiveDate {
        self.days().next_business_day(date, allow_override).await
    }

    fn slot_request(&self, q: &SlotQuery, now: DateTime<Utc>) -> SlotRequest {
        SlotRequest {
            date: q.date.unwrap_or_else(|| self.today(now)),
            preferred_start: q.preferred_start,
            duration_hours: q.duration_hours.unwrap_or(1.0),
            windows: q
                .windows
                .clone()
                .filter(|w| !w.is_empty())
                .unwrap_or_else(|| self.config.windows.clone()),
            min_gap_minutes: q.min_gap_minutes.unwrap_or(self.config.min_gap_minutes),
            allow_weekend_holiday: q
                .allow_weekend_holiday
                .unwrap_or(self.config.allow_weekend_holiday),
        }
    }

    /// Next free slot across business days.
    pub async fn find_slot(&self, q: &SlotQuery, now: DateTime<Utc>) -> Result<DatedSlot> {
        let req = self.slot_request(q, now);
        self.finder().find_slot_across_days(&req).await
    }

    /// Priority for arbitrary metadata, as it would be stored.
    pub fn priority(
        &self,
        metadata: Option<&Metadata>,
        explicit_override: Option<&MetaValue>,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        compute_priority(metadata, explicit_override, self.today(now), self.config.timezone)
    }

    /// Find a slot, embed metadata, and create the calendar entry.
    pub async fn schedule_task(&self, new: NewTask, now: DateTime<Utc>) -> Result<TaskView> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(SchedulerError::validation("title is required"));
        }
        let req = self.slot_request(&new.slot, now);

        let timing = if new.all_day {
            let date = if self.is_business_day(req.date, req.allow_weekend_holiday).await {
                req.date
            } else {
                self.next_business_day(req.date, req.allow_weekend_holiday).await
            };
            TaskTiming::AllDay { date }
        } else {
            let found = self.finder().find_slot_across_days(&req).await?;
            TaskTiming::Timed {
                start: found.slot.start,
                end: found.slot.end,
            }
        };

        let supplied = new.metadata.as_ref().filter(|m| !m.is_empty());
        let explicit = new
            .priority
            .as_ref()
            .or_else(|| supplied.and_then(stored_score));
        let priority = self
            .priority(supplied, explicit, now)
            .unwrap_or(DEFAULT_PRIORITY);
        let mut metadata = new.metadata.unwrap_or_default();
        metadata.set_number(keys::PRIORITY_SCORE, priority);
        if new.priority.as_ref().and_then(MetaValue::as_f64).is_some() {
            metadata.insert(keys::PRIORITY_MANUAL, true);
        }
        if !metadata.contains(keys::AUTO_RESCHEDULE) {
            metadata.insert(keys::AUTO_RESCHEDULE, true);
        }
        if !metadata.contains(keys::RESCHEDULE_COUNT) {
            metadata.set_number(keys::RESCHEDULE_COUNT, 0.0);
        }
        // Persist per-task overrides so later sweeps honour them.
        if let Some(windows) = new.slot.windows.as_ref().filter(|w| !w.is_empty()) {
            metadata.insert(
                keys::BUSINESS_WINDOWS,
                MetaValue::Array(windows.iter().map(|w| MetaValue::String(w.to_string())).collect()),
            );
        }
        if let Some(gap) = new.slot.min_gap_minutes.filter(|g| *g >= 0) {
            metadata.set_number(keys::MIN_GAP_MINUTES, gap as f64);
        }
        if new.slot.allow_weekend_holiday == Some(true) {
            metadata.insert(keys::ALLOW_WEEKEND_HOLIDAY, true);
        }

        let spec = TaskSpec {
            title: title.to_string(),
            description: encode(&new.body, Some(&metadata)),
            timing,
            created_by: Some(self.identity.current_user_email()),
        };
        let mut task = self.backend.create_task(&self.config.resource_id, spec).await?;
        info!(task = ?task.id, priority, "task scheduled");
        if task.html_link.is_none() {
            task.html_link = self.lookup_link(&task).await;
        }
        Ok(self.view(task, now))
    }

    /// Some backends only expose the link on read. Failure leaves it unset.
    async fn lookup_link(&self, task: &Task) -> Option<String> {
        let id = task.id.as_deref()?;
        match self.backend.get_task(&self.config.resource_id, id).await {
            Ok(found) => found.and_then(|t| t.html_link),
            Err(e) => {
                warn!(task = id, error = %e, "link lookup failed");
                None
            }
        }
    }

    fn view(&self, task: Task, now: DateTime<Utc>) -> TaskView {
        let decoded = decode(&task.description);
        let priority = effective_priority(decoded.metadata.as_ref(), self.today(now), self.config.timezone);
        TaskView {
            task,
            body: decoded.body,
            metadata: decoded.metadata,
            priority,
        }
    }

    /// Every task touching the civil dates `from..=to`, priority re-derived.
    pub async fn list_tasks(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskView>> {
        if to < from {
            return Err(SchedulerError::validation(format!("range end {to} is before start {from}")));
        }
        let tz = self.config.timezone;
        let range = TimeRange::new(day_range(from, tz).start, day_range(to, tz).end);

        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .backend
                .list_tasks(range, &self.config.resource_id, token.as_deref())
                .await?;
            out.extend(page.items.into_iter().map(|t| self.view(t, now)));
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => return Ok(out),
            }
        }
    }

    pub async fn get_task(&self, id: &str, now: DateTime<Utc>) -> Result<TaskView> {
        if id.trim().is_empty() {
            return Err(SchedulerError::validation("task id is required"));
        }
        self.backend
            .get_task(&self.config.resource_id, id)
            .await?
            .map(|t| self.view(t, now))
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    fn sweep(&self) -> RescheduleSweep<'_> {
        RescheduleSweep::new(
            self.backend.as_ref(),
            self.holidays.as_ref(),
            self.config.timezone,
            &self.config.resource_id,
            self.config.cutoff_hour,
        )
    }

    /// Daily sweep with config-wide defaults.
    pub async fn reschedule_pending(&self, reference: DateTime<Utc>) -> SweepReport {
        let defaults = SweepDefaults {
            windows: self.config.windows.clone(),
            min_gap_minutes: self.config.min_gap_minutes,
            allow_weekend_holiday: self.config.allow_weekend_holiday,
        };
        self.sweep().reschedule_pending(reference, &defaults).await
    }

    /// Daily sweep with caller-supplied defaults.
    pub async fn reschedule_pending_with(
        &self,
        reference: DateTime<Utc>,
        defaults: &SweepDefaults,
    ) -> SweepReport {
        self.sweep().reschedule_pending(reference, defaults).await
    }
}
