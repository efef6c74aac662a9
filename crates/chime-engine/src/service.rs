//! Reminder service: occurrence computation and delivery orchestration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime};
use tracing::{debug, warn};

use crate::store::{DeliveryLedger, ReminderSource};
use crate::types::{
    DeliveryRecord, PollStats, RecurrenceRule, ReminderEvent, ScheduleItem, SourceKind, TodoItem,
    ceil_to_minute, first_occurrence_index, floor_to_minute, TIME_FORMAT,
};
use crate::{EngineError, SinkError};

/// Default lookahead beyond "now" when scanning for due reminders.
const DEFAULT_LOOKAHEAD_SECS: i64 = 30;

/// Default cap on candidates processed per poll.
const DEFAULT_BATCH_LIMIT: usize = 200;

/// Pluggable delivery target. Errors signal transient failure; the service
/// retries the occurrence on a later poll.
#[async_trait]
pub trait ReminderSink: Send + Sync {
    async fn emit(&self, event: &ReminderEvent) -> Result<(), SinkError>;
}

/// Injectable clock, for deterministic tests.
pub type ClockFn = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Optional best-effort content transform applied before emit.
///
/// Called inside a guarded boundary: any error, or an empty result, falls
/// back to the original content. Rewriting never fails a delivery.
pub type RewriteFn = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Computes the candidate occurrence set for a moving time window and
/// delivers each logical occurrence at most once.
///
/// Only ledger presence gates re-delivery; the service keeps no delivery
/// state in memory, so repeated polls over overlapping windows are safe.
pub struct ReminderService {
    source: Arc<dyn ReminderSource>,
    ledger: Arc<dyn DeliveryLedger>,
    sink: Arc<dyn ReminderSink>,
    clock: ClockFn,
    lookahead: Duration,
    catchup: Duration,
    batch_limit: usize,
    rewriter: Option<RewriteFn>,
}

impl ReminderService {
    /// Create a service with default window and batch settings.
    pub fn new(
        source: Arc<dyn ReminderSource>,
        ledger: Arc<dyn DeliveryLedger>,
        sink: Arc<dyn ReminderSink>,
    ) -> Self {
        Self {
            source,
            ledger,
            sink,
            clock: Arc::new(|| Local::now().naive_local()),
            lookahead: Duration::seconds(DEFAULT_LOOKAHEAD_SECS),
            catchup: Duration::zero(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            rewriter: None,
        }
    }

    /// Replace the wall clock (tests use a fixed or stepped clock).
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    /// How far past "now" the scan window extends. Clamped to zero or more.
    pub fn with_lookahead(mut self, lookahead: Duration) -> Self {
        self.lookahead = lookahead.max(Duration::zero());
        self
    }

    /// How far before "now" the scan window reaches back.
    ///
    /// Catch-up delivery stays disabled regardless of the configured value;
    /// the window start is always the current minute.
    pub fn with_catchup(mut self, catchup: Duration) -> Self {
        let _ = catchup;
        self.catchup = Duration::zero();
        self
    }

    /// Cap on candidates processed per poll. Clamped to at least one.
    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit.max(1);
        self
    }

    /// Install a best-effort content rewriter.
    pub fn with_rewriter(mut self, rewriter: RewriteFn) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Run one poll: scan, deduplicate against the ledger, emit, record.
    ///
    /// Per-candidate failures are isolated; only a storage read failure
    /// aborts the poll (and is handled at the loop boundary).
    #[tracing::instrument(skip(self))]
    pub async fn poll_once(&self) -> Result<PollStats, EngineError> {
        let (scan_start, scan_end) = self.scan_window();
        debug!(%scan_start, %scan_end, "scanning for due reminders");
        let candidates = self.collect_candidates(scan_start, scan_end).await?;

        let mut stats = PollStats {
            candidate_count: candidates.len(),
            ..PollStats::default()
        };

        for event in &candidates {
            if self.ledger.contains(&event.reminder_key).await? {
                stats.skipped_count += 1;
                continue;
            }

            let outgoing = self.rewrite_content(event);
            if let Err(error) = self.sink.emit(&outgoing).await {
                stats.failed_count += 1;
                warn!(key = %event.reminder_key, %error, "reminder delivery failed");
                continue;
            }

            // The record is written only after a successful emit; a failed
            // insert counts as skipped so re-delivery stays possible.
            match self.ledger.record(DeliveryRecord::for_event(event)).await {
                Ok(true) => stats.delivered_count += 1,
                Ok(false) => stats.skipped_count += 1,
                Err(error) => {
                    stats.skipped_count += 1;
                    warn!(key = %event.reminder_key, %error, "delivery record insert failed");
                }
            }
        }

        Ok(stats)
    }

    fn scan_window(&self) -> (NaiveDateTime, NaiveDateTime) {
        let now = (self.clock)();
        let start = floor_to_minute(now) - self.catchup;
        let end = ceil_to_minute(now + self.lookahead);
        (start, end)
    }

    fn rewrite_content(&self, event: &ReminderEvent) -> ReminderEvent {
        let Some(rewriter) = &self.rewriter else {
            return event.clone();
        };
        match rewriter(&event.content) {
            Ok(rewritten) => {
                let normalized = rewritten.trim();
                if normalized.is_empty() {
                    event.clone()
                } else {
                    ReminderEvent {
                        content: normalized.to_string(),
                        ..event.clone()
                    }
                }
            }
            Err(error) => {
                warn!(key = %event.reminder_key, %error, "content rewrite failed, keeping original");
                event.clone()
            }
        }
    }

    async fn collect_candidates(
        &self,
        scan_start: NaiveDateTime,
        scan_end: NaiveDateTime,
    ) -> Result<Vec<ReminderEvent>, EngineError> {
        let mut candidates = Vec::new();

        for todo in self.source.pending_todos().await? {
            if let Some(event) = todo_event(&todo, scan_start, scan_end) {
                candidates.push(event);
            }
        }

        let schedules = self.source.base_schedules().await?;
        let rules = self.source.recurrence_rules().await?;
        let rule_by_schedule: HashMap<i64, &RecurrenceRule> =
            rules.iter().map(|r| (r.schedule_id, r)).collect();

        for schedule in &schedules {
            match rule_by_schedule.get(&schedule.id).filter(|r| r.enabled) {
                Some(rule) => {
                    candidates.extend(recurring_events(schedule, rule, scan_start, scan_end));
                }
                None => {
                    if let Some(event) = base_schedule_event(schedule, scan_start, scan_end) {
                        candidates.push(event);
                    }
                }
            }
        }

        candidates.sort_by(|a, b| {
            (a.remind_time, &a.reminder_key).cmp(&(b.remind_time, &b.reminder_key))
        });
        candidates.truncate(self.batch_limit);
        Ok(candidates)
    }
}

/// Single-occurrence candidate for a todo, if its remind time is inside the
/// inclusive scan window.
fn todo_event(
    todo: &TodoItem,
    scan_start: NaiveDateTime,
    scan_end: NaiveDateTime,
) -> Option<ReminderEvent> {
    let remind_time = todo.remind_at?;
    if remind_time < scan_start || remind_time > scan_end {
        return None;
    }
    let content = format!(
        "Todo reminder #{}: {} (remind at {})",
        todo.id,
        todo.content,
        remind_time.format(TIME_FORMAT)
    );
    Some(ReminderEvent {
        reminder_key: ReminderEvent::derive_key(SourceKind::Todo, todo.id, None, remind_time),
        source: SourceKind::Todo,
        source_id: todo.id,
        occurrence_time: None,
        remind_time,
        content,
    })
}

/// Single-occurrence candidate for a schedule without an enabled rule.
fn base_schedule_event(
    schedule: &ScheduleItem,
    scan_start: NaiveDateTime,
    scan_end: NaiveDateTime,
) -> Option<ReminderEvent> {
    let remind_time = schedule.remind_at?;
    if remind_time < scan_start || remind_time > scan_end {
        return None;
    }
    Some(schedule_occurrence_event(
        schedule,
        schedule.event_time,
        remind_time,
    ))
}

/// Enumerate in-window occurrences of a recurring schedule.
///
/// The first index is found by integer division so unbounded series stay
/// cheap no matter how far the window has advanced past the anchor.
fn recurring_events(
    schedule: &ScheduleItem,
    rule: &RecurrenceRule,
    scan_start: NaiveDateTime,
    scan_end: NaiveDateTime,
) -> Vec<ReminderEvent> {
    let Some(interval) = rule.interval() else {
        return Vec::new();
    };
    // A rule with no resolvable remind anchor yields no candidates. The
    // fallback to the base remind time preserves the remind/event delta for
    // every occurrence.
    let Some(remind_start) = rule.remind_start_time.or(schedule.remind_at) else {
        return Vec::new();
    };

    let mut index = first_occurrence_index(remind_start, interval, scan_start);
    let mut events = Vec::new();
    loop {
        if !rule.repeat_times.allows(index) {
            break;
        }
        let offset = Duration::seconds(interval.num_seconds() * index);
        let remind_time = remind_start + offset;
        if remind_time > scan_end {
            break;
        }
        let occurrence_time = schedule.event_time + offset;
        events.push(schedule_occurrence_event(schedule, occurrence_time, remind_time));
        index += 1;
    }
    events
}

fn schedule_occurrence_event(
    schedule: &ScheduleItem,
    occurrence_time: NaiveDateTime,
    remind_time: NaiveDateTime,
) -> ReminderEvent {
    let content = format!(
        "Schedule reminder #{}: {} (event at {}, remind at {})",
        schedule.id,
        schedule.title,
        occurrence_time.format(TIME_FORMAT),
        remind_time.format(TIME_FORMAT)
    );
    ReminderEvent {
        reminder_key: ReminderEvent::derive_key(
            SourceKind::Schedule,
            schedule.id,
            Some(occurrence_time),
            remind_time,
        ),
        source: SourceKind::Schedule,
        source_id: schedule.id,
        occurrence_time: Some(occurrence_time),
        remind_time,
        content,
    }
}
