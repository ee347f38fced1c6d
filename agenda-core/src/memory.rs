//! In-memory calendar backend.
//!
//! Used by tests and, via a JSON snapshot, by the CLI's file store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::backend::{BusyInterval, CalendarBackend, TaskPage};
use crate::error::{Result, SchedulerError};
use crate::task::{Task, TaskPatch, TaskSpec, TaskStatus, TaskTiming};
use crate::time::TimeRange;

const DEFAULT_PAGE_SIZE: usize = 50;

/// Serializable contents of a [`MemoryCalendar`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    pub next_id: u64,
    /// resource id -> tasks
    pub resources: BTreeMap<String, Vec<Task>>,
}

#[derive(Debug)]
pub struct MemoryCalendar {
    tz: Tz,
    page_size: usize,
    state: Mutex<CalendarSnapshot>,
}

impl MemoryCalendar {
    /// `tz` anchors all-day entries when matching time ranges.
    pub fn new(tz: Tz) -> Self {
        Self::from_snapshot(tz, CalendarSnapshot::default())
    }

    pub fn from_snapshot(tz: Tz, snapshot: CalendarSnapshot) -> Self {
        Self {
            tz,
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(snapshot),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Insert a task as-is (fixtures, imports).
    pub fn insert(&self, resource_id: &str, task: Task) -> Result<()> {
        self.lock()?
            .resources
            .entry(resource_id.to_string())
            .or_default()
            .push(task);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<CalendarSnapshot> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, CalendarSnapshot>> {
        self.state
            .lock()
            .map_err(|_| SchedulerError::backend("calendar state lock poisoned"))
    }

    fn span(&self, timing: &TaskTiming) -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
        let start = timing.start_instant(self.tz);
        (start, start + timing.duration())
    }
}

#[async_trait]
impl CalendarBackend for MemoryCalendar {
    async fn query_free_busy(
        &self,
        range: TimeRange,
        resource_id: &str,
    ) -> Result<Vec<BusyInterval>> {
        let state = self.lock()?;
        let busy = state
            .resources
            .get(resource_id)
            .into_iter()
            .flatten()
            .filter(|t| !t.is_cancelled())
            .filter_map(|t| match t.timing {
                TaskTiming::Timed { start, end } if range.overlaps(start, end) => {
                    Some(BusyInterval::new(start, end))
                }
                _ => None,
            })
            .collect();
        Ok(busy)
    }

    async fn list_tasks(
        &self,
        range: TimeRange,
        resource_id: &str,
        page_token: Option<&str>,
    ) -> Result<TaskPage> {
        let offset = match page_token {
            Some(tok) => tok
                .parse::<usize>()
                .map_err(|_| SchedulerError::validation(format!("bad page token '{tok}'")))?,
            None => 0,
        };

        let state = self.lock()?;
        let mut matching: Vec<&Task> = state
            .resources
            .get(resource_id)
            .into_iter()
            .flatten()
            .filter(|t| {
                let (s, e) = self.span(&t.timing);
                range.overlaps(s, e)
            })
            .collect();
        matching.sort_by_key(|t| t.timing.start_instant(self.tz));

        let items: Vec<Task> = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|t| (*t).clone())
            .collect();
        let consumed = offset + items.len();
        let next_page_token = (consumed < matching.len()).then(|| consumed.to_string());

        Ok(TaskPage {
            items,
            next_page_token,
        })
    }

    async fn create_task(&self, resource_id: &str, spec: TaskSpec) -> Result<Task> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let task = Task {
            id: Some(format!("task-{}", state.next_id)),
            title: spec.title,
            description: spec.description,
            timing: spec.timing,
            status: TaskStatus::Confirmed,
            created_by: spec.created_by,
            html_link: None,
        };
        state
            .resources
            .entry(resource_id.to_string())
            .or_default()
            .push(task.clone());
        Ok(task)
    }

    async fn patch_task(&self, resource_id: &str, id: &str, patch: TaskPatch) -> Result<Task> {
        let mut state = self.lock()?;
        let task = state
            .resources
            .get_mut(resource_id)
            .and_then(|tasks| tasks.iter_mut().find(|t| t.id.as_deref() == Some(id)))
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;
        patch.apply(task);
        Ok(task.clone())
    }

    async fn get_task(&self, resource_id: &str, id: &str) -> Result<Option<Task>> {
        let state = self.lock()?;
        Ok(state
            .resources
            .get(resource_id)
            .and_then(|tasks| tasks.iter().find(|t| t.id.as_deref() == Some(id)))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn tokyo() -> Tz {
        chrono_tz::Asia::Tokyo
    }

    fn day(d: u32) -> TimeRange {
        crate::time::day_range(NaiveDate::from_ymd_opt(2026, 3, d).unwrap(), tokyo())
    }

    #[tokio::test]
    async fn free_busy_skips_cancelled_and_all_day() {
        let cal = MemoryCalendar::new(tokyo());
        let s = Utc.with_ymd_and_hms(2026, 3, 2, 1, 0, 0).unwrap();
        cal.insert("primary", Task::timed("a", "busy", s, s + Duration::hours(1))).unwrap();
        cal.insert(
            "primary",
            Task::timed("b", "gone", s, s + Duration::hours(2)).with_status(TaskStatus::Cancelled),
        )
        .unwrap();
        cal.insert(
            "primary",
            Task::all_day("c", "holiday-ish", NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()),
        )
        .unwrap();

        let busy = cal.query_free_busy(day(2), "primary").await.unwrap();
        assert_eq!(busy, vec![BusyInterval::new(s, s + Duration::hours(1))]);
        assert!(cal.query_free_busy(day(3), "primary").await.unwrap().is_empty());
        assert!(cal.query_free_busy(day(2), "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_paginates_in_start_order() {
        let cal = MemoryCalendar::new(tokyo()).with_page_size(2);
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        for i in (0..5).rev() {
            let s = base + Duration::hours(i);
            cal.insert("primary", Task::timed(format!("t{i}"), "x", s, s + Duration::minutes(30)))
                .unwrap();
        }

        let mut ids = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = cal.list_tasks(day(2), "primary", token.as_deref()).await.unwrap();
            ids.extend(page.items.into_iter().filter_map(|t| t.id));
            match page.next_page_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        assert_eq!(ids, vec!["t0", "t1", "t2", "t3", "t4"]);
    }

    #[tokio::test]
    async fn create_then_patch() {
        let cal = MemoryCalendar::new(tokyo());
        let d = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let created = cal
            .create_task(
                "primary",
                TaskSpec {
                    title: "write report".into(),
                    description: String::new(),
                    timing: TaskTiming::AllDay { date: d },
                    created_by: Some("me@example.com".into()),
                },
            )
            .await
            .unwrap();
        let id = created.id.clone().unwrap();

        let moved = cal
            .patch_task(
                "primary",
                &id,
                TaskPatch {
                    timing: Some(TaskTiming::AllDay { date: d.succ_opt().unwrap() }),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.timing, TaskTiming::AllDay { date: d.succ_opt().unwrap() });
        assert_eq!(cal.get_task("primary", &id).await.unwrap(), Some(moved));

        let missing = cal.patch_task("primary", "nope", TaskPatch::default()).await;
        assert!(matches!(missing, Err(SchedulerError::TaskNotFound(_))));
    }
}
