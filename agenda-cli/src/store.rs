//! `calendar.json`: the CLI's persistent calendar.

use agenda_core::{CalendarSnapshot, MemoryCalendar};
use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::fs;
use std::path::Path;

pub fn load_calendar(path: &Path, tz: Tz) -> Result<MemoryCalendar> {
    if !path.exists() {
        return Ok(MemoryCalendar::new(tz));
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let snapshot: CalendarSnapshot =
        serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(MemoryCalendar::from_snapshot(tz, snapshot))
}

pub fn save_calendar(path: &Path, calendar: &MemoryCalendar) -> Result<()> {
    let snapshot = calendar.snapshot()?;
    let json = serde_json::to_string_pretty(&snapshot)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_core::Task;
    use chrono::{TimeZone, Utc};

    #[test]
    fn missing_file_is_empty_calendar_and_saves_round_trip() {
        let dir = std::env::temp_dir().join(format!("agenda-store-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("calendar.json");
        let _ = fs::remove_file(&path);

        let tz = chrono_tz::Asia::Tokyo;
        let cal = load_calendar(&path, tz).unwrap();
        assert_eq!(cal.snapshot().unwrap(), CalendarSnapshot::default());

        let start = Utc.with_ymd_and_hms(2026, 3, 2, 1, 0, 0).unwrap();
        cal.insert("primary", Task::timed("a", "review", start, start + chrono::Duration::hours(1)))
            .unwrap();
        save_calendar(&path, &cal).unwrap();

        let reloaded = load_calendar(&path, tz).unwrap();
        assert_eq!(reloaded.snapshot().unwrap(), cal.snapshot().unwrap());
        fs::remove_dir_all(&dir).unwrap();
    }
}
