//! Task metadata: a sanitized value tree and its text-embedding codec.
//!
//! Metadata travels inside a task's free-text description as a JSON object
//! wrapped in fixed markers:
//!
//! ```text
//! Prepare slides for Monday.
//!
//! [agenda-meta]
//! {"impact":4,"priorityScore":71}
//! [/agenda-meta]
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::config::MAX_GAP_MINUTES;
use crate::window::{Window, parse_windows};

pub const META_START: &str = "[agenda-meta]";
pub const META_END: &str = "[/agenda-meta]";

/// Values nested deeper than this are dropped.
pub const MAX_DEPTH: usize = 3;

static META_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s){}\s*(.*?)\s*{}",
        regex::escape(META_START),
        regex::escape(META_END)
    ))
    .expect("metadata block pattern is valid")
});

static EXTRA_BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"));

/// Recognized keys.
pub mod keys {
    pub const DEADLINE: &str = "deadline";
    pub const IMPACT: &str = "impact";
    pub const EFFORT: &str = "effort";
    pub const MUST: &str = "must";
    pub const PRIORITY_SCORE: &str = "priorityScore";
    pub const PRIORITY_MANUAL: &str = "priorityManual";
    pub const COMPLETED: &str = "completed";
    pub const DONE: &str = "done";
    pub const STATUS: &str = "status";
    pub const PROGRESS: &str = "progress";
    pub const AUTO_RESCHEDULE: &str = "autoReschedule";
    pub const RESCHEDULE_COUNT: &str = "rescheduleCount";
    pub const PREVIOUS_START: &str = "previousStart";
    pub const LAST_RESCHEDULED_AT: &str = "lastRescheduledAt";
    pub const BUSINESS_WINDOWS: &str = "businessWindows";
    pub const MIN_GAP_MINUTES: &str = "minGapMinutes";
    pub const ALLOW_WEEKEND_HOLIDAY: &str = "allowWeekendHoliday";
}

/// A sanitized metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    String(String),
    /// Always finite.
    Number(f64),
    Bool(bool),
    Array(Vec<MetaValue>),
    Object(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    /// Rejects NaN and infinities.
    pub fn number(n: f64) -> Option<Self> {
        n.is_finite().then_some(MetaValue::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        MetaValue::String(s.into())
    }

    /// Sanitize a JSON value found at `depth` (top-level object entries are depth 1).
    fn sanitize(value: &Value, depth: usize) -> Option<Self> {
        if depth > MAX_DEPTH {
            return None;
        }
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(MetaValue::Bool(*b)),
            Value::Number(n) => n.as_f64().and_then(MetaValue::number),
            Value::String(s) => Some(MetaValue::String(s.clone())),
            Value::Array(items) => Some(MetaValue::Array(
                items
                    .iter()
                    .filter_map(|v| MetaValue::sanitize(v, depth + 1))
                    .collect(),
            )),
            Value::Object(map) => Some(MetaValue::Object(sanitize_entries(map, depth + 1))),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MetaValue::String(s) => Value::String(s.clone()),
            MetaValue::Number(n) => number_to_json(*n),
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::Array(items) => Value::Array(items.iter().map(MetaValue::to_json).collect()),
            MetaValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Numbers, or strings that parse as numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Number(n) => Some(*n),
            MetaValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean-like reading: `true`, non-zero numbers, and "true"/"yes"/"1"/"on"/"y".
    pub fn is_truthy(&self) -> bool {
        self.as_bool().unwrap_or(false)
    }

    /// `Some` only when the value clearly spells a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            MetaValue::Number(n) => Some(*n != 0.0),
            MetaValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" | "on" => Some(true),
                "false" | "no" | "n" | "0" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

fn sanitize_entries(map: &serde_json::Map<String, Value>, depth: usize) -> BTreeMap<String, MetaValue> {
    map.iter()
        .filter_map(|(k, v)| MetaValue::sanitize(v, depth).map(|v| (k.clone(), v)))
        .collect()
}

fn number_to_json(n: f64) -> Value {
    // Integral values print without a trailing ".0".
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl Serialize for MetaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::String(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::String(s)
    }
}

/// A sanitized metadata object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize a JSON object. Non-objects and objects that end up empty
    /// yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let Value::Object(map) = value else {
            return None;
        };
        let entries = sanitize_entries(map, 1);
        (!entries.is_empty()).then_some(Metadata(entries))
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Non-finite numbers are ignored.
    pub fn set_number(&mut self, key: impl Into<String>, n: f64) {
        if let Some(v) = MetaValue::number(n) {
            self.0.insert(key.into(), v);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        self.0.remove(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetaValue::as_f64)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_str)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(MetaValue::is_truthy)
    }

    pub fn explicit_flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(MetaValue::as_bool)
    }

    /// Completion via `completed`/`done`, a finished `status`, or `progress` >= 100.
    pub fn is_completed(&self) -> bool {
        if self.flag(keys::COMPLETED) || self.flag(keys::DONE) {
            return true;
        }
        if let Some(status) = self.str(keys::STATUS) {
            let status = status.trim().to_ascii_lowercase();
            if matches!(status.as_str(), "done" | "completed" | "complete" | "finished") {
                return true;
            }
        }
        let progress = match self.get(keys::PROGRESS) {
            Some(MetaValue::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
            Some(v) => v.as_f64(),
            None => None,
        };
        progress.is_some_and(|p| p >= 100.0)
    }

    /// Defaults to true; only an explicit false disables it.
    pub fn auto_reschedule(&self) -> bool {
        self.explicit_flag(keys::AUTO_RESCHEDULE) != Some(false)
    }

    pub fn reschedule_count(&self) -> u64 {
        self.number(keys::RESCHEDULE_COUNT)
            .filter(|n| *n >= 0.0)
            .map(|n| n.floor() as u64)
            .unwrap_or(0)
    }

    /// Per-task windows, from an array of strings or a comma-separated string.
    /// Unparseable or empty overrides yield `None`.
    pub fn business_windows(&self) -> Option<Vec<Window>> {
        let windows = match self.get(keys::BUSINESS_WINDOWS)? {
            MetaValue::String(s) => parse_windows(s).ok()?,
            MetaValue::Array(items) => items
                .iter()
                .map(|v| v.as_str().and_then(|s| s.parse().ok()))
                .collect::<Option<Vec<Window>>>()?,
            _ => return None,
        };
        (!windows.is_empty()).then_some(windows)
    }

    /// Out-of-range gaps are ignored so the caller's default applies.
    pub fn min_gap_minutes(&self) -> Option<i64> {
        self.number(keys::MIN_GAP_MINUTES)
            .filter(|n| (0.0..=MAX_GAP_MINUTES as f64).contains(n))
            .map(|n| n.round() as i64)
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Metadata::from_json(&value).unwrap_or_default())
    }
}

/// Plain description text plus the metadata embedded in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub body: String,
    pub metadata: Option<Metadata>,
}

/// Split a description into its plain body and embedded metadata.
///
/// Only the first block is considered. A block that fails to parse is still
/// removed from the body.
pub fn decode(text: &str) -> Decoded {
    let Some(caps) = META_BLOCK_RE.captures(text) else {
        return Decoded {
            body: text.to_string(),
            metadata: None,
        };
    };
    let (Some(block), Some(inner)) = (caps.get(0), caps.get(1)) else {
        return Decoded {
            body: text.to_string(),
            metadata: None,
        };
    };

    let mut rest = String::with_capacity(text.len());
    rest.push_str(&text[..block.start()]);
    rest.push_str(&text[block.end()..]);
    let body = EXTRA_BLANK_LINES_RE
        .replace_all(&rest, "\n\n")
        .trim()
        .to_string();

    let metadata = match serde_json::from_str::<Value>(inner.as_str()) {
        Ok(value) => Metadata::from_json(&value),
        Err(e) => {
            warn!(error = %e, "discarding unparseable metadata block");
            None
        }
    };

    Decoded { body, metadata }
}

/// Rebuild a description from `text` (which may already carry a block) and
/// `metadata`. Empty metadata is treated as none.
pub fn encode(text: &str, metadata: Option<&Metadata>) -> String {
    let plain = decode(text).body;
    let plain = plain.trim_end();

    let Some(meta) = metadata.filter(|m| !m.is_empty()) else {
        return plain.to_string();
    };

    let block = format!("{META_START}\n{}\n{META_END}", meta.to_json());
    if plain.is_empty() {
        block
    } else {
        format!("{plain}\n\n{block}")
    }
}
