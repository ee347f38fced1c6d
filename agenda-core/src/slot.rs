//! Free-slot search: first-fit scan within one day, and the multi-day roller.
//!
//! Within a day, each configured window is scanned in order against the busy
//! intervals (sorted by start). A candidate `[cursor, cursor + duration)` is
//! accepted as soon as it ends at least `gap` before the next busy start; the
//! window end acts as a final zero-length busy interval.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BusyInterval, CalendarBackend, HolidayOracle};
use crate::business_day::BusinessDays;
use crate::config::{
    DEFAULT_MIN_GAP_MINUTES, MAX_DURATION_HOURS, MAX_GAP_MINUTES, SLOT_SEARCH_BUSINESS_DAYS,
};
use crate::error::{Result, SchedulerError};
use crate::time::{day_range, local_instant};
use crate::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedSlot {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRequest {
    pub date: NaiveDate,
    /// Time-of-day to start scanning from on each candidate date.
    pub preferred_start: Option<NaiveTime>,
    pub duration_hours: f64,
    pub windows: Vec<Window>,
    pub min_gap_minutes: i64,
    pub allow_weekend_holiday: bool,
}

impl SlotRequest {
    /// Non-positive durations fall back to one hour; longer than a day is capped.
    pub fn duration(&self) -> Duration {
        hours_to_duration(self.duration_hours)
    }

    /// Negative gaps fall back to the default gap; longer than a day is capped.
    pub fn gap(&self) -> Duration {
        normalize_gap(self.min_gap_minutes)
    }
}

pub fn hours_to_duration(hours: f64) -> Duration {
    let hours = if hours.is_finite() && hours > 0.0 { hours.min(MAX_DURATION_HOURS) } else { 1.0 };
    Duration::seconds((hours * 3600.0).round() as i64)
}

pub fn normalize_gap(minutes: i64) -> Duration {
    let minutes = if minutes >= 0 { minutes.min(MAX_GAP_MINUTES) } else { DEFAULT_MIN_GAP_MINUTES };
    Duration::minutes(minutes)
}

/// First-fit scan of one window. `busy` must be sorted by start.
///
/// Instant arithmetic that leaves the representable range counts as "no fit".
pub fn first_fit_in_window(
    busy: &[BusyInterval],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    from: DateTime<Utc>,
    duration: Duration,
    gap: Duration,
) -> Option<Slot> {
    let mut cursor = from.max(window_start);
    if cursor >= window_end {
        return None;
    }

    let sentinel = BusyInterval::new(window_end, window_end);
    let relevant = busy
        .iter()
        .filter(|b| b.start < window_end)
        .chain(std::iter::once(&sentinel));

    for b in relevant {
        if b.end.checked_add_signed(gap)? <= cursor {
            continue;
        }
        let clipped_start = b.start.max(window_start);
        let clipped_end = b.end.min(window_end);

        let end = cursor.checked_add_signed(duration)?;
        if end <= clipped_start.checked_sub_signed(gap)? {
            return Some(Slot { start: cursor, end });
        }

        cursor = cursor.max(clipped_end.checked_add_signed(gap)?);
        if cursor >= window_end {
            break;
        }
    }
    None
}

/// Pure single-day search over already-fetched busy intervals.
pub fn find_free_slot(
    date: NaiveDate,
    preferred_start: Option<NaiveTime>,
    duration: Duration,
    windows: &[Window],
    gap: Duration,
    mut busy: Vec<BusyInterval>,
    tz: Tz,
) -> Option<Slot> {
    busy.sort_by_key(|b| b.start);
    let preferred = preferred_start.map(|t| local_instant(date, t, tz));

    windows.iter().find_map(|w| {
        let (ws, we) = w.bounds(date, tz);
        let from = preferred.map_or(ws, |p| p.max(ws));
        first_fit_in_window(&busy, ws, we, from, duration, gap)
    })
}

/// Slot search against live collaborators.
#[derive(Clone, Copy)]
pub struct SlotFinder<'a> {
    backend: &'a dyn CalendarBackend,
    days: BusinessDays<'a>,
    tz: Tz,
    resource_id: &'a str,
}

impl<'a> SlotFinder<'a> {
    pub fn new(
        backend: &'a dyn CalendarBackend,
        holidays: &'a dyn HolidayOracle,
        tz: Tz,
        resource_id: &'a str,
    ) -> Self {
        Self {
            backend,
            days: BusinessDays::new(holidays),
            tz,
            resource_id,
        }
    }

    /// Earliest slot on `date`, or `None` when every window is full.
    ///
    /// Free/busy failures propagate: no slot can be computed without them.
    pub async fn find_slot_in_day(
        &self,
        date: NaiveDate,
        preferred_start: Option<NaiveTime>,
        duration: Duration,
        windows: &[Window],
        gap: Duration,
    ) -> Result<Option<Slot>> {
        let busy = self
            .backend
            .query_free_busy(day_range(date, self.tz), self.resource_id)
            .await?;
        let slot = find_free_slot(date, preferred_start, duration, windows, gap, busy, self.tz);
        debug!(%date, found = slot.is_some(), "single-day slot search");
        Ok(slot)
    }

    /// Roll forward over business days until a slot is found.
    pub async fn find_slot_across_days(&self, req: &SlotRequest) -> Result<DatedSlot> {
        if req.windows.is_empty() {
            return Err(SchedulerError::validation("at least one window is required"));
        }
        let duration = req.duration();
        let gap = req.gap();
        let allow = req.allow_weekend_holiday;

        let mut date = req.date;
        if !self.days.is_business_day(date, allow).await {
            date = self.days.next_business_day(date, allow).await;
        }
        let first = date;

        for attempt in 0..SLOT_SEARCH_BUSINESS_DAYS {
            if let Some(slot) = self
                .find_slot_in_day(date, req.preferred_start, duration, &req.windows, gap)
                .await?
            {
                return Ok(DatedSlot { date, slot });
            }
            if attempt + 1 < SLOT_SEARCH_BUSINESS_DAYS {
                date = self.days.next_business_day(date, allow).await;
            }
        }

        Err(SchedulerError::NoSlotAvailable {
            from: first,
            days: SLOT_SEARCH_BUSINESS_DAYS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::parse_windows;
    use chrono::TimeZone;

    const TZ: Tz = chrono_tz::Asia::Tokyo;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        local_instant(date(), NaiveTime::from_hms_opt(h, m, 0).unwrap(), TZ)
    }

    fn hm(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    fn search(preferred: Option<NaiveTime>, busy: Vec<BusyInterval>) -> Option<Slot> {
        let windows = parse_windows("04:30-06:30,08:00-19:00").unwrap();
        find_free_slot(
            date(),
            preferred,
            Duration::hours(1),
            &windows,
            Duration::minutes(15),
            busy,
            TZ,
        )
    }

    #[test]
    fn empty_day_starts_at_preferred() {
        let slot = search(hm(10, 0), vec![]).unwrap();
        assert_eq!(slot.start, at(10, 0));
        assert_eq!(slot.end, at(11, 0));
    }

    #[test]
    fn busy_at_preferred_pushes_past_gap() {
        let slot = search(hm(10, 0), vec![BusyInterval::new(at(10, 0), at(10, 30))]).unwrap();
        assert_eq!(slot.start, at(10, 45));
        assert_eq!(slot.end, at(11, 45));
    }

    #[test]
    fn no_preference_takes_first_window() {
        let slot = search(None, vec![]).unwrap();
        assert_eq!(slot.start, at(4, 30));
    }

    #[test]
    fn gap_is_kept_before_a_later_meeting() {
        // 10:00 + 1h would end at 11:00, but 11:10 meeting needs 15 min clearance.
        let slot = search(hm(10, 0), vec![BusyInterval::new(at(11, 10), at(12, 0))]).unwrap();
        assert_eq!(slot.start, at(12, 15));
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let busy = vec![
            BusyInterval::new(at(11, 0), at(12, 0)),
            BusyInterval::new(at(8, 0), at(10, 0)),
        ];
        let slot = search(hm(8, 0), busy).unwrap();
        assert_eq!(slot.start, at(12, 15));
    }

    #[test]
    fn meeting_ending_just_before_cursor_still_applies_gap() {
        let slot = search(hm(10, 0), vec![BusyInterval::new(at(9, 0), at(9, 55))]).unwrap();
        assert_eq!(slot.start, at(10, 10));
    }

    #[test]
    fn full_day_yields_none() {
        let busy = vec![
            BusyInterval::new(at(4, 0), at(7, 0)),
            BusyInterval::new(at(7, 30), at(19, 30)),
        ];
        assert_eq!(search(None, busy), None);
    }

    #[test]
    fn slot_never_touches_gap_zone_or_window_edges() {
        let windows = parse_windows("08:00-19:00").unwrap();
        let (ws, we) = windows[0].bounds(date(), TZ);
        let gap = Duration::minutes(15);
        let busy_sets = vec![
            vec![],
            vec![BusyInterval::new(at(8, 0), at(9, 0))],
            vec![
                BusyInterval::new(at(8, 30), at(9, 0)),
                BusyInterval::new(at(10, 0), at(10, 20)),
                BusyInterval::new(at(11, 30), at(13, 0)),
            ],
            vec![
                BusyInterval::new(at(7, 0), at(8, 10)),
                BusyInterval::new(at(9, 20), at(9, 40)),
                BusyInterval::new(at(18, 0), at(20, 0)),
            ],
        ];
        for busy in busy_sets {
            for minutes in [15i64, 45, 60, 150] {
                for pref in [None, hm(8, 0), hm(9, 30), hm(12, 0), hm(17, 0)] {
                    let dur = Duration::minutes(minutes);
                    let slot = find_free_slot(date(), pref, dur, &windows, gap, busy.clone(), TZ);
                    if let Some(s) = slot {
                        assert!(s.start >= ws && s.end <= we, "{s:?} outside window");
                        assert_eq!(s.end - s.start, dur);
                        for b in &busy {
                            let overlaps = s.start < b.end + gap && s.end > b.start - gap;
                            assert!(!overlaps, "{s:?} collides with {b:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn duration_and_gap_normalisation() {
        let mut req = SlotRequest {
            date: date(),
            preferred_start: None,
            duration_hours: 0.0,
            windows: vec![],
            min_gap_minutes: -5,
            allow_weekend_holiday: false,
        };
        assert_eq!(req.duration(), Duration::hours(1));
        assert_eq!(req.gap(), Duration::minutes(15));
        req.duration_hours = 1.5;
        req.min_gap_minutes = 0;
        assert_eq!(req.duration(), Duration::minutes(90));
        assert_eq!(req.gap(), Duration::zero());
    }

    #[test]
    fn oversized_duration_and_gap_find_nothing() {
        let req = SlotRequest {
            date: date(),
            preferred_start: None,
            duration_hours: 1e12,
            windows: vec![],
            min_gap_minutes: i64::MAX,
            allow_weekend_holiday: false,
        };
        assert_eq!(req.duration(), Duration::hours(24));
        assert_eq!(req.gap(), Duration::minutes(24 * 60));

        let windows = parse_windows("04:30-06:30,08:00-19:00").unwrap();
        let busy = vec![BusyInterval::new(at(10, 0), at(10, 30))];
        let huge = find_free_slot(date(), None, req.duration(), &windows, Duration::minutes(15), busy.clone(), TZ);
        assert_eq!(huge, None);
        let wide_gap = find_free_slot(date(), None, Duration::hours(1), &windows, req.gap(), busy, TZ);
        assert_eq!(wide_gap, None);
    }

    #[test]
    fn overflowing_instants_are_no_fit() {
        let end = DateTime::<Utc>::MAX_UTC;
        let start = end - Duration::hours(2);
        let slot = first_fit_in_window(&[], start, end, start, Duration::hours(3), Duration::zero());
        assert_eq!(slot, None);
        let busy = [BusyInterval::new(start, end)];
        let slot = first_fit_in_window(&busy, start, end, start, Duration::hours(1), Duration::hours(1));
        assert_eq!(slot, None);
    }

    #[test]
    fn utc_anchor_sanity() {
        assert_eq!(at(9, 0), Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
    }
}
