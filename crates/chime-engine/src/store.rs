//! Storage collaborator traits and in-memory reference implementations.
//!
//! The engine never owns item CRUD: it reads due-able items through
//! [`ReminderSource`] and tracks delivered occurrences through
//! [`DeliveryLedger`]. The in-memory implementations back the tests and the
//! demo wiring; real deployments plug in their own stores.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{DeliveryRecord, RecurrenceRule, ScheduleItem, StoreError, TodoItem};

/// Read-only provider of due-able items and recurrence rules.
#[async_trait]
pub trait ReminderSource: Send + Sync {
    /// Todos that have not been completed (done todos never remind).
    async fn pending_todos(&self) -> Result<Vec<TodoItem>, StoreError>;

    /// All base schedule items.
    async fn base_schedules(&self) -> Result<Vec<ScheduleItem>, StoreError>;

    /// All recurrence rules, enabled or not, keyed by schedule id.
    async fn recurrence_rules(&self) -> Result<Vec<RecurrenceRule>, StoreError>;
}

/// Persisted set of delivered-occurrence records.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Whether a record with this key exists.
    async fn contains(&self, reminder_key: &str) -> Result<bool, StoreError>;

    /// Insert the record if absent.
    ///
    /// Returns `false` when a record with the same key already exists, so a
    /// lost uniqueness race surfaces as "already delivered" rather than an
    /// error.
    async fn record(&self, record: DeliveryRecord) -> Result<bool, StoreError>;
}

/// In-memory reminder source.
#[derive(Default)]
pub struct MemorySource {
    inner: RwLock<SourceData>,
}

#[derive(Default)]
struct SourceData {
    todos: Vec<TodoItem>,
    schedules: Vec<ScheduleItem>,
    rules: Vec<RecurrenceRule>,
}

impl MemorySource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace all source data at once.
    pub async fn load(
        &self,
        todos: Vec<TodoItem>,
        schedules: Vec<ScheduleItem>,
        rules: Vec<RecurrenceRule>,
    ) {
        let mut inner = self.inner.write().await;
        inner.todos = todos;
        inner.schedules = schedules;
        inner.rules = rules;
    }

    pub async fn add_todo(&self, todo: TodoItem) {
        self.inner.write().await.todos.push(todo);
    }

    pub async fn add_schedule(&self, schedule: ScheduleItem) {
        self.inner.write().await.schedules.push(schedule);
    }

    pub async fn add_rule(&self, rule: RecurrenceRule) {
        self.inner.write().await.rules.push(rule);
    }

    /// Mark a todo as done, so it stops producing candidates.
    pub async fn mark_todo_done(&self, id: i64) {
        let mut inner = self.inner.write().await;
        if let Some(todo) = inner.todos.iter_mut().find(|t| t.id == id) {
            todo.done = true;
        }
    }
}

#[async_trait]
impl ReminderSource for MemorySource {
    async fn pending_todos(&self) -> Result<Vec<TodoItem>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.todos.iter().filter(|t| !t.done).cloned().collect())
    }

    async fn base_schedules(&self) -> Result<Vec<ScheduleItem>, StoreError> {
        Ok(self.inner.read().await.schedules.clone())
    }

    async fn recurrence_rules(&self) -> Result<Vec<RecurrenceRule>, StoreError> {
        Ok(self.inner.read().await.rules.clone())
    }
}

/// In-memory delivery ledger with insert-if-absent semantics.
#[derive(Default)]
pub struct MemoryLedger {
    records: RwLock<HashMap<String, DeliveryRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of records held (test helper).
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DeliveryLedger for MemoryLedger {
    async fn contains(&self, reminder_key: &str) -> Result<bool, StoreError> {
        Ok(self.records.read().await.contains_key(reminder_key))
    }

    async fn record(&self, record: DeliveryRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.reminder_key) {
            return Ok(false);
        }
        records.insert(record.reminder_key.clone(), record);
        Ok(true)
    }
}
