//! Priority scoring from task metadata.
//!
//! Scoring (0..=100):
//! - deadline: +2 per day inside a 30-day horizon, capped at 60
//! - impact (1-5): +6 each
//! - effort (1-5): -3 each
//! - must: +10

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;

use crate::config::DEFAULT_PRIORITY;
use crate::metadata::{MetaValue, Metadata, keys};
use crate::time::parse_civil_date;

const DEADLINE_HORIZON_DAYS: f64 = 30.0;
const DEADLINE_SCORE_CAP: f64 = 60.0;
const DEFAULT_LEVEL: f64 = 3.0;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Score a task.
///
/// A numeric (or numeric-string) override short-circuits the computation.
/// Without an override, absent metadata yields `None`; the caller picks a
/// default. `today` is the current civil date in `tz`.
pub fn compute_priority(
    metadata: Option<&Metadata>,
    explicit_override: Option<&MetaValue>,
    today: NaiveDate,
    tz: Tz,
) -> Option<f64> {
    if let Some(value) = explicit_override.and_then(MetaValue::as_f64) {
        return Some(round2(value.clamp(0.0, 100.0)));
    }
    let meta = metadata?;

    let deadline_score = meta
        .str(keys::DEADLINE)
        .and_then(|s| parse_civil_date(s, tz))
        .map(|deadline| {
            let days = (deadline - today).num_days() as f64;
            ((DEADLINE_HORIZON_DAYS - days) * 2.0).clamp(0.0, DEADLINE_SCORE_CAP)
        })
        .unwrap_or(0.0);

    let impact = meta.number(keys::IMPACT).unwrap_or(DEFAULT_LEVEL).clamp(1.0, 5.0);
    let effort = meta.number(keys::EFFORT).unwrap_or(DEFAULT_LEVEL).clamp(1.0, 5.0);
    let must = if meta.flag(keys::MUST) { 10.0 } else { 0.0 };

    let raw = deadline_score + impact * 6.0 - effort * 3.0 + must;
    Some(round2(raw).clamp(0.0, 100.0))
}

/// Priority for a stored task.
///
/// The stored `priorityScore` wins when it was set by hand or when nothing
/// else in the metadata feeds the score; otherwise the score is recomputed.
pub fn effective_priority(metadata: Option<&Metadata>, today: NaiveDate, tz: Tz) -> f64 {
    let Some(meta) = metadata else {
        return DEFAULT_PRIORITY;
    };
    compute_priority(Some(meta), stored_score(meta), today, tz).unwrap_or(DEFAULT_PRIORITY)
}

/// The stored `priorityScore`, when it should be taken as-is rather than
/// recomputed: set by hand, or nothing else in the metadata feeds the score.
pub fn stored_score(meta: &Metadata) -> Option<&MetaValue> {
    let has_inputs = [keys::DEADLINE, keys::IMPACT, keys::EFFORT, keys::MUST]
        .iter()
        .any(|k| meta.contains(k));
    (meta.flag(keys::PRIORITY_MANUAL) || !has_inputs)
        .then(|| meta.get(keys::PRIORITY_SCORE))
        .flatten()
}

/// Time-of-day a relocated task should aim for, by priority tier.
pub fn preferred_start_for(priority: f64, original: Option<NaiveTime>) -> NaiveTime {
    let tier = if priority >= 85.0 {
        Some((8, 30))
    } else if priority >= 70.0 {
        Some((9, 30))
    } else if priority >= 55.0 {
        Some((11, 0))
    } else if priority >= 40.0 {
        Some((13, 30))
    } else {
        None
    };
    match tier {
        Some((h, m)) => NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN),
        None => original.unwrap_or_else(|| NaiveTime::from_hms_opt(15, 0, 0).unwrap_or(NaiveTime::MIN)),
    }
}
