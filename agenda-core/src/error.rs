//! Error taxonomy for the scheduling engine.

use thiserror::Error;

/// Result type alias using SchedulerError.
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// Bad or missing caller input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The multi-day search ran out of business days.
    #[error("no slot available within {days} business days starting {from}")]
    NoSlotAvailable { from: chrono::NaiveDate, days: usize },

    /// External I/O failed (holiday lookup, free/busy query, task writes).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid window '{0}' (expected HH:MM-HH:MM with start before end)")]
    InvalidWindow(String),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

impl SchedulerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }
}
