//! Immutable engine configuration.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::window::Window;

/// Search horizon for the multi-day roller, in business days.
pub const SLOT_SEARCH_BUSINESS_DAYS: usize = 14;

/// Maximum calendar days the business-day oracle advances before giving up.
pub const BUSINESS_DAY_ADVANCE_LIMIT: usize = 30;

pub const DEFAULT_MIN_GAP_MINUTES: i64 = 15;

/// No window spans more than a day, so longer gaps or durations never fit.
pub const MAX_GAP_MINUTES: i64 = 24 * 60;
pub const MAX_DURATION_HOURS: f64 = 24.0;
pub const DEFAULT_CUTOFF_HOUR: u32 = 20;
pub const DEFAULT_PRIORITY: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// All business-window arithmetic happens in this timezone.
    pub timezone: Tz,
    pub windows: Vec<Window>,
    pub min_gap_minutes: i64,
    pub allow_weekend_holiday: bool,
    /// Civil hour from which the daily reschedule sweep acts.
    pub cutoff_hour: u32,
    /// Calendar resource the engine reads and writes.
    pub resource_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Tokyo,
            windows: default_windows(),
            min_gap_minutes: DEFAULT_MIN_GAP_MINUTES,
            allow_weekend_holiday: false,
            cutoff_hour: DEFAULT_CUTOFF_HOUR,
            resource_id: "primary".to_string(),
        }
    }
}

fn default_windows() -> Vec<Window> {
    ["04:30-06:30", "08:00-19:00"]
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.timezone, chrono_tz::Asia::Tokyo);
        let windows: Vec<String> = cfg.windows.iter().map(ToString::to_string).collect();
        assert_eq!(windows, vec!["04:30-06:30", "08:00-19:00"]);
        assert_eq!(cfg.min_gap_minutes, 15);
        assert_eq!(cfg.cutoff_hour, 20);
    }

    #[test]
    fn default_windows_hold_every_tier_start() {
        let cfg = EngineConfig::default();
        for (h, m) in [(8, 30), (9, 30), (11, 0), (13, 30)] {
            let t = chrono::NaiveTime::from_hms_opt(h, m, 0).unwrap();
            assert!(
                cfg.windows.iter().any(|w| w.start <= t && t < w.end),
                "{t} outside default windows"
            );
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{"timezone":"Europe/Berlin","windows":["08:00-19:00"]}"#,
        )
        .unwrap();
        assert_eq!(cfg.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(cfg.windows[0].to_string(), "08:00-19:00");
        assert_eq!(cfg.resource_id, "primary");
    }
}
