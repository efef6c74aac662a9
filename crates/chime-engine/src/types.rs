//! Reminder domain types.

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Wall-clock format used for reminder keys and rendered content.
///
/// Item times have minute resolution; formatting with this pattern keeps
/// reminder keys byte-stable across polls.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Which kind of source item produced a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// One-off todo item.
    Todo,
    /// Calendar schedule (base or recurring occurrence).
    Schedule,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Todo => write!(f, "todo"),
            SourceKind::Schedule => write!(f, "schedule"),
        }
    }
}

/// A fully resolved, ready-to-deliver notification.
///
/// Events are ephemeral: they are recomputed from source data on every poll
/// and never stored. The delivery ledger records their keys instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderEvent {
    /// Globally unique key for this logical occurrence.
    pub reminder_key: String,
    /// Kind of source item.
    pub source: SourceKind,
    /// Id of the source item.
    pub source_id: i64,
    /// The occurrence's own due time (present for schedules).
    pub occurrence_time: Option<NaiveDateTime>,
    /// When delivery should happen.
    pub remind_time: NaiveDateTime,
    /// Rendered text to deliver.
    pub content: String,
}

impl ReminderEvent {
    /// Derive the reminder key for an occurrence.
    ///
    /// The key is a pure function of its inputs so that recomputing the same
    /// occurrence across polls yields the same key:
    /// `todo:<id>:<remind>` or `schedule:<id>:<occurrence>:<remind>`.
    pub fn derive_key(
        source: SourceKind,
        source_id: i64,
        occurrence_time: Option<NaiveDateTime>,
        remind_time: NaiveDateTime,
    ) -> String {
        match occurrence_time {
            Some(occurrence) => format!(
                "{}:{}:{}:{}",
                source,
                source_id,
                occurrence.format(TIME_FORMAT),
                remind_time.format(TIME_FORMAT)
            ),
            None => format!(
                "{}:{}:{}",
                source,
                source_id,
                remind_time.format(TIME_FORMAT)
            ),
        }
    }
}

/// A one-off todo item, read from the reminder source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: i64,
    pub content: String,
    /// Completed todos never produce reminders.
    #[serde(default)]
    pub done: bool,
    /// When the todo is due (informational; authoring requires it alongside
    /// a remind time, but the engine only checks the remind time).
    #[serde(default)]
    pub due_at: Option<NaiveDateTime>,
    /// When to remind about the todo. `None` means no reminder.
    #[serde(default)]
    pub remind_at: Option<NaiveDateTime>,
}

/// A base schedule item, read from the reminder source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub id: i64,
    pub title: String,
    /// When the (base) event happens.
    pub event_time: NaiveDateTime,
    /// When to remind about the base event. `None` means no reminder unless
    /// a recurrence rule carries its own anchor.
    #[serde(default)]
    pub remind_at: Option<NaiveDateTime>,
}

/// How many times a recurrence repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum RepeatCount {
    /// The series never ends (wire value -1).
    Unbounded,
    /// Exactly `n` occurrences, including the base one (n >= 2).
    Times(u32),
}

impl RepeatCount {
    /// Whether occurrence index `n` (0-based) is within the repeat bound.
    pub fn allows(&self, n: i64) -> bool {
        match self {
            RepeatCount::Unbounded => true,
            RepeatCount::Times(times) => n < i64::from(*times),
        }
    }
}

impl From<i64> for RepeatCount {
    fn from(value: i64) -> Self {
        if value < 0 {
            RepeatCount::Unbounded
        } else {
            RepeatCount::Times(value as u32)
        }
    }
}

impl From<RepeatCount> for i64 {
    fn from(value: RepeatCount) -> Self {
        match value {
            RepeatCount::Unbounded => -1,
            RepeatCount::Times(times) => i64::from(times),
        }
    }
}

/// A recurrence rule attached 1:1 to a base schedule.
///
/// Occurrences happen at `event_time + n * interval`; reminder instants at
/// `remind_start + n * interval`, where `remind_start` falls back to the base
/// schedule's remind time when the rule carries no explicit anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub schedule_id: i64,
    /// Minutes between occurrences. Must be positive; a non-positive interval
    /// yields no candidates.
    pub interval_minutes: i64,
    pub repeat_times: RepeatCount,
    /// Explicit absolute anchor for the first reminder instant.
    #[serde(default)]
    pub remind_start_time: Option<NaiveDateTime>,
    pub enabled: bool,
}

impl RecurrenceRule {
    /// Interval as a chrono duration, `None` when non-positive.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_minutes > 0).then(|| Duration::minutes(self.interval_minutes))
    }
}

/// Aggregate counts for a single poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Candidates inside the scan window (after the batch cap).
    pub candidate_count: usize,
    /// Emitted and recorded in the ledger.
    pub delivered_count: usize,
    /// Already in the ledger, or lost a ledger insert race.
    pub skipped_count: usize,
    /// Sink emit failed; eligible again on the next poll.
    pub failed_count: usize,
}

/// An insert-only delivery record.
///
/// Written only after `emit` returned without error for the event; its
/// presence in the ledger is the sole durable signal that an occurrence has
/// been delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub reminder_key: String,
    pub source: SourceKind,
    pub source_id: i64,
    pub occurrence_time: Option<NaiveDateTime>,
    pub remind_time: NaiveDateTime,
}

impl DeliveryRecord {
    /// Build the record for a delivered event.
    pub fn for_event(event: &ReminderEvent) -> Self {
        Self {
            reminder_key: event.reminder_key.clone(),
            source: event.source,
            source_id: event.source_id,
            occurrence_time: event.occurrence_time,
            remind_time: event.remind_time,
        }
    }
}

/// Truncate to the start of the minute.
pub fn floor_to_minute(value: NaiveDateTime) -> NaiveDateTime {
    value
        .with_second(0)
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(value)
}

/// Round up to the next minute boundary (identity when already on one).
pub fn ceil_to_minute(value: NaiveDateTime) -> NaiveDateTime {
    let floored = floor_to_minute(value);
    if floored == value {
        value
    } else {
        floored + Duration::minutes(1)
    }
}

/// First occurrence index `n` such that `start + n * interval >= scan_start`.
///
/// Integer division over seconds, bumped by one when the floor value still
/// precedes the window start.
pub fn first_occurrence_index(
    start: NaiveDateTime,
    interval: Duration,
    scan_start: NaiveDateTime,
) -> i64 {
    if scan_start <= start {
        return 0;
    }
    let interval_seconds = interval.num_seconds();
    if interval_seconds <= 0 {
        return 0;
    }
    let delta_seconds = (scan_start - start).num_seconds();
    let mut index = (delta_seconds / interval_seconds).max(0);
    if start + Duration::seconds(interval_seconds * index) < scan_start {
        index += 1;
    }
    index
}
