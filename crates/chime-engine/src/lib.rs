//! Reminder scheduling and delivery engine for Chime.
//!
//! This crate provides a polling engine that:
//! - Derives due notification occurrences for a moving time window
//! - Handles one-off items and exact-interval recurring series
//! - Delivers each logical occurrence at most once via a persisted ledger
//! - Survives sink failures without losing future retries

mod error;
mod service;
mod store;
mod timer;
mod types;

pub use error::{EngineError, SinkError, StoreError};
pub use service::{ClockFn, ReminderService, ReminderSink, RewriteFn};
pub use store::{DeliveryLedger, MemoryLedger, MemorySource, ReminderSource};
pub use timer::{PeriodicTask, Poller, TimerEngine};
pub use types::{
    DeliveryRecord, PollStats, RecurrenceRule, ReminderEvent, RepeatCount, ScheduleItem,
    SourceKind, TodoItem, TIME_FORMAT, ceil_to_minute, first_occurrence_index, floor_to_minute,
};
