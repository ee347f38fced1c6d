//! Daily reschedule sweep.
//!
//! After the cutoff hour, every pending task on today's calendar whose start
//! has passed is moved to the next business day. Higher priority tasks are
//! placed first, so they get the earlier slots. Failures are collected per
//! task; the sweep itself never fails.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{CalendarBackend, HolidayOracle};
use crate::business_day::BusinessDays;
use crate::error::{Result, SchedulerError};
use crate::metadata::{Metadata, decode, encode, keys};
use crate::priority::{effective_priority, preferred_start_for};
use crate::slot::{SlotFinder, SlotRequest};
use crate::task::{Task, TaskPatch, TaskTiming};
use crate::time::{civil_time, day_range, to_rfc3339_utc};
use crate::window::Window;

/// Title prefixes that mark a task as finished.
pub const COMPLETION_MARKERS: &[&str] = &["✅", "✔", "[x]", "[done]"];

const MIN_RELOCATED_MINUTES: i64 = 30;

/// Sweep-wide fallbacks for per-task overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepDefaults {
    pub windows: Vec<Window>,
    pub min_gap_minutes: i64,
    pub allow_weekend_holiday: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduledTask {
    pub task_id: String,
    pub title: String,
    pub priority: f64,
    pub previous_start: DateTime<Utc>,
    pub timing: TaskTiming,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleError {
    /// `None` when the task had no identifier or listing itself failed.
    pub task_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub checked_at: DateTime<Utc>,
    pub rescheduled: Vec<RescheduledTask>,
    pub errors: Vec<RescheduleError>,
}

impl SweepReport {
    fn empty(checked_at: DateTime<Utc>) -> Self {
        Self {
            checked_at,
            rescheduled: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// True when the title starts with a completion marker.
pub fn title_marks_done(title: &str) -> bool {
    let title = title.trim_start().to_lowercase();
    COMPLETION_MARKERS.iter().any(|m| title.starts_with(m))
}

#[derive(Debug)]
struct Candidate {
    task: Task,
    metadata: Metadata,
    priority: f64,
    start: DateTime<Utc>,
}

pub struct RescheduleSweep<'a> {
    backend: &'a dyn CalendarBackend,
    days: BusinessDays<'a>,
    finder: SlotFinder<'a>,
    tz: Tz,
    resource_id: &'a str,
    cutoff_hour: u32,
}

impl<'a> RescheduleSweep<'a> {
    pub fn new(
        backend: &'a dyn CalendarBackend,
        holidays: &'a dyn HolidayOracle,
        tz: Tz,
        resource_id: &'a str,
        cutoff_hour: u32,
    ) -> Self {
        Self {
            backend,
            days: BusinessDays::new(holidays),
            finder: SlotFinder::new(backend, holidays, tz, resource_id),
            tz,
            resource_id,
            cutoff_hour,
        }
    }

    /// Relocate overdue pending tasks. Does nothing before the cutoff hour.
    pub async fn reschedule_pending(
        &self,
        reference: DateTime<Utc>,
        defaults: &SweepDefaults,
    ) -> SweepReport {
        let mut report = SweepReport::empty(reference);
        let local = reference.with_timezone(&self.tz);
        if local.hour() < self.cutoff_hour {
            debug!(hour = local.hour(), cutoff = self.cutoff_hour, "before cutoff; sweep skipped");
            return report;
        }
        let today = local.date_naive();

        let tasks = match self.list_day(today).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, %today, "sweep could not list tasks");
                report.errors.push(RescheduleError {
                    task_id: None,
                    message: format!("listing tasks failed: {e}"),
                });
                return report;
            }
        };

        let mut candidates: Vec<Candidate> = tasks
            .into_iter()
            .filter_map(|task| self.candidate(task, reference, today))
            .collect();
        candidates.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.start.cmp(&b.start))
        });
        info!(%today, eligible = candidates.len(), "reschedule sweep started");

        for c in candidates {
            let task_id = c.task.id.clone();
            match self.relocate(c, reference, today, defaults).await {
                Ok(moved) => {
                    info!(task = %moved.task_id, priority = moved.priority, "task rescheduled");
                    report.rescheduled.push(moved);
                }
                Err(e) => {
                    warn!(task = ?task_id, error = %e, "task reschedule failed");
                    report.errors.push(RescheduleError {
                        task_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            moved = report.rescheduled.len(),
            failed = report.errors.len(),
            "reschedule sweep finished"
        );
        report
    }

    async fn list_day(&self, date: NaiveDate) -> Result<Vec<Task>> {
        let range = day_range(date, self.tz);
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .backend
                .list_tasks(range, self.resource_id, token.as_deref())
                .await?;
            out.extend(page.items);
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => return Ok(out),
            }
        }
    }

    fn candidate(&self, task: Task, reference: DateTime<Utc>, today: NaiveDate) -> Option<Candidate> {
        if task.is_cancelled() || title_marks_done(&task.title) {
            return None;
        }
        let metadata = decode(&task.description).metadata.unwrap_or_default();
        if metadata.is_completed() || !metadata.auto_reschedule() {
            return None;
        }
        let start = task.timing.start_instant(self.tz);
        if start > reference {
            return None;
        }
        let meta_ref = (!metadata.is_empty()).then_some(&metadata);
        let priority = effective_priority(meta_ref, today, self.tz);
        Some(Candidate {
            task,
            metadata,
            priority,
            start,
        })
    }

    async fn relocate(
        &self,
        c: Candidate,
        reference: DateTime<Utc>,
        today: NaiveDate,
        defaults: &SweepDefaults,
    ) -> Result<RescheduledTask> {
        let Candidate {
            task,
            mut metadata,
            priority,
            start,
        } = c;
        let id = task
            .id
            .clone()
            .ok_or_else(|| SchedulerError::validation(format!("task '{}' has no identifier", task.title)))?;

        // A task-level `true` widens the search; a task-level `false` does not narrow it.
        let allow = metadata.flag(keys::ALLOW_WEEKEND_HOLIDAY) || defaults.allow_weekend_holiday;
        let target = self.days.next_business_day(today, allow).await;

        let timing = match task.timing {
            TaskTiming::AllDay { .. } => TaskTiming::AllDay { date: target },
            TaskTiming::Timed { start, .. } => {
                let req = SlotRequest {
                    date: target,
                    preferred_start: Some(preferred_start_for(priority, Some(civil_time(start, self.tz)))),
                    duration_hours: relocated_duration(&task.timing).num_seconds() as f64 / 3600.0,
                    windows: metadata
                        .business_windows()
                        .unwrap_or_else(|| defaults.windows.clone()),
                    min_gap_minutes: metadata.min_gap_minutes().unwrap_or(defaults.min_gap_minutes),
                    allow_weekend_holiday: allow,
                };
                let found = self.finder.find_slot_across_days(&req).await?;
                TaskTiming::Timed {
                    start: found.slot.start,
                    end: found.slot.end,
                }
            }
        };

        let previous_start = match task.timing {
            TaskTiming::AllDay { date } => date.format("%Y-%m-%d").to_string(),
            TaskTiming::Timed { start, .. } => to_rfc3339_utc(start),
        };
        let count = metadata.reschedule_count() + 1;
        metadata.insert(keys::LAST_RESCHEDULED_AT, to_rfc3339_utc(reference));
        metadata.set_number(keys::RESCHEDULE_COUNT, count as f64);
        metadata.insert(keys::PREVIOUS_START, previous_start);
        metadata.set_number(keys::PRIORITY_SCORE, priority);

        let patch = TaskPatch {
            timing: Some(timing),
            description: Some(encode(&task.description, Some(&metadata))),
        };
        let updated = self.backend.patch_task(self.resource_id, &id, patch).await?;

        Ok(RescheduledTask {
            task_id: id,
            title: updated.title,
            priority,
            previous_start: start,
            timing: updated.timing,
        })
    }
}

/// Duration a relocated timed task keeps.
pub fn relocated_duration(timing: &TaskTiming) -> Duration {
    match *timing {
        TaskTiming::Timed { start, end } => {
            (end - start).max(Duration::minutes(MIN_RELOCATED_MINUTES))
        }
        TaskTiming::AllDay { .. } => Duration::days(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_markers() {
        assert!(title_marks_done("✅ write report"));
        assert!(title_marks_done("  [x] call bank"));
        assert!(title_marks_done("[DONE] taxes"));
        assert!(!title_marks_done("write report ✅"));
        assert!(!title_marks_done("[ ] pending"));
    }

    #[test]
    fn relocated_duration_has_floor() {
        use chrono::TimeZone;
        let s = Utc.with_ymd_and_hms(2026, 3, 2, 1, 0, 0).unwrap();
        let short = TaskTiming::Timed { start: s, end: s + Duration::minutes(10) };
        let long = TaskTiming::Timed { start: s, end: s + Duration::minutes(95) };
        assert_eq!(relocated_duration(&short), Duration::minutes(30));
        assert_eq!(relocated_duration(&long), Duration::minutes(95));
    }
}
