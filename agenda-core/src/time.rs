//! Time utilities: civil-date arithmetic in the engine's fixed timezone.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Half-open UTC range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}

/// Parse "HH:MM" (also accepts "H:MM").
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Resolve a civil date + time-of-day to an instant.
///
/// Ambiguous local times (DST fall-back) take the earlier instant; times
/// inside a DST gap are pushed forward by an hour.
pub fn local_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let ndt = date.and_time(time);
    tz.from_local_datetime(&ndt)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(ndt + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&ndt))
}

pub fn civil_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

pub fn civil_time(instant: DateTime<Utc>, tz: Tz) -> NaiveTime {
    instant.with_timezone(&tz).time()
}

/// UTC range covering one civil day in `tz`.
pub fn day_range(date: NaiveDate, tz: Tz) -> TimeRange {
    let next = date.succ_opt().unwrap_or(date);
    TimeRange::new(
        local_instant(date, NaiveTime::MIN, tz),
        local_instant(next, NaiveTime::MIN, tz),
    )
}

/// Parse a loosely formatted date ("2026-03-02", "2026/03/02" or RFC3339)
/// into a civil date in `tz`.
pub fn parse_civil_date(s: &str, tz: Tz) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y/%m/%d") {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| civil_date(dt.with_timezone(&Utc), tz))
}

/// Parse a local datetime like "2026-02-20 23:59" in `tz`, returning UTC.
pub fn parse_local_to_utc(local: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let ndt = NaiveDateTime::parse_from_str(local.trim(), "%Y-%m-%d %H:%M").map_err(|e| {
        SchedulerError::validation(format!("invalid local datetime '{local}': {e}"))
    })?;
    Ok(local_instant(ndt.date(), ndt.time(), tz))
}

/// Format a UTC instant as RFC3339.
pub fn to_rfc3339_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chicago_local() {
        // Feb is CST (UTC-6)
        let tz = parse_timezone("America/Chicago").unwrap();
        let utc = parse_local_to_utc("2026-02-20 23:59", tz).unwrap();
        assert_eq!(utc.to_rfc3339(), "2026-02-21T05:59:00+00:00");
    }

    #[test]
    fn test_day_range_tokyo() {
        let tz = parse_timezone("Asia/Tokyo").unwrap();
        let d = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let r = day_range(d, tz);
        assert_eq!(r.start.to_rfc3339(), "2026-03-01T15:00:00+00:00");
        assert_eq!((r.end - r.start).num_hours(), 24);
    }

    #[test]
    fn test_dst_gap_pushed_forward() {
        // 2026-03-08 02:30 does not exist in Chicago.
        let tz = parse_timezone("America/Chicago").unwrap();
        let d = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let t = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let inst = local_instant(d, t, tz);
        assert_eq!(civil_time(inst, tz), NaiveTime::from_hms_opt(3, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_civil_date_formats() {
        let tz = parse_timezone("Asia/Tokyo").unwrap();
        let want = NaiveDate::from_ymd_opt(2026, 3, 2);
        assert_eq!(parse_civil_date("2026-03-02", tz), want);
        assert_eq!(parse_civil_date("2026/03/02", tz), want);
        // 20:00Z on the 1st is already the 2nd in Tokyo.
        assert_eq!(parse_civil_date("2026-03-01T20:00:00Z", tz), want);
        assert_eq!(parse_civil_date("next tuesday", tz), None);
    }

    #[test]
    fn test_invalid_timezone() {
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }
}
