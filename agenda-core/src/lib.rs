//! agenda-core: business-aware scheduling engine.
//!
//! Finds free slots inside business-hours windows, skips weekends and
//! holidays, scores task priority from embedded metadata, and relocates
//! overdue tasks once the daily cutoff has passed. Storage, holidays and
//! identity are collaborators behind traits in [`backend`].

pub mod backend;
pub mod business_day;
pub mod config;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod priority;
pub mod scheduler;
pub mod slot;
pub mod sweep;
pub mod task;
pub mod time;
pub mod window;

pub use backend::{
    BusyInterval, CalendarBackend, FixedIdentity, HolidayOracle, Identity, StaticHolidays,
    TaskPage,
};
pub use business_day::BusinessDays;
pub use config::EngineConfig;
pub use error::{Result, SchedulerError};
pub use memory::{CalendarSnapshot, MemoryCalendar};
pub use metadata::{Decoded, MetaValue, Metadata, decode, encode};
pub use priority::{compute_priority, effective_priority, preferred_start_for, stored_score};
pub use scheduler::{NewTask, Scheduler, SlotQuery, TaskView};
pub use slot::{DatedSlot, Slot, SlotFinder, SlotRequest, find_free_slot};
pub use sweep::{RescheduleError, RescheduleSweep, RescheduledTask, SweepDefaults, SweepReport};
pub use task::{Task, TaskPatch, TaskSpec, TaskStatus, TaskTiming};
pub use time::TimeRange;
pub use window::{Window, parse_windows};
