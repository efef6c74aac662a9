//! File-backed stores for the daemon.
//!
//! Items come from a read-only JSON data file; delivered-occurrence records
//! persist to a JSON ledger file so at-most-once delivery survives process
//! restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use chime_engine::{
    DeliveryLedger, DeliveryRecord, MemorySource, RecurrenceRule, ScheduleItem, StoreError,
    TodoItem,
};

/// Shape of the item data file.
#[derive(Debug, Default, Deserialize)]
pub struct DataFile {
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    #[serde(default)]
    pub schedules: Vec<ScheduleItem>,
    #[serde(default)]
    pub rules: Vec<RecurrenceRule>,
}

/// Load the item data file into an in-memory reminder source.
pub async fn load_source(path: &Path) -> Result<Arc<MemorySource>, StoreError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let data: DataFile =
        serde_json::from_str(&raw).map_err(|e| StoreError::Malformed(e.to_string()))?;
    info!(
        path = %path.display(),
        todos = data.todos.len(),
        schedules = data.schedules.len(),
        rules = data.rules.len(),
        "loaded reminder data"
    );
    let source = MemorySource::new();
    source.load(data.todos, data.schedules, data.rules).await;
    Ok(source)
}

/// Delivery ledger persisted as a JSON file.
///
/// Records are held in memory and rewritten to disk on every insert; a
/// persist failure surfaces as a store error (the service counts the
/// occurrence as not delivered, accepting a duplicate over silent loss).
pub struct JsonLedger {
    path: PathBuf,
    records: RwLock<HashMap<String, DeliveryRecord>>,
}

impl JsonLedger {
    /// Open the ledger file, creating in-memory state from it if present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>, StoreError> {
        let path = path.into();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let list: Vec<DeliveryRecord> =
                    serde_json::from_str(&raw).map_err(|e| StoreError::Malformed(e.to_string()))?;
                list.into_iter()
                    .map(|r| (r.reminder_key.clone(), r))
                    .collect()
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(error) => return Err(error.into()),
        };
        info!(path = %path.display(), records = records.len(), "opened delivery ledger");
        Ok(Arc::new(Self {
            path,
            records: RwLock::new(records),
        }))
    }

    async fn persist(&self, records: &HashMap<String, DeliveryRecord>) -> Result<(), StoreError> {
        let mut list: Vec<&DeliveryRecord> = records.values().collect();
        list.sort_by(|a, b| a.reminder_key.cmp(&b.reminder_key));
        let raw =
            serde_json::to_string_pretty(&list).map_err(|e| StoreError::Malformed(e.to_string()))?;
        // Write-then-rename, so a crash mid-write cannot leave a truncated
        // ledger behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryLedger for JsonLedger {
    async fn contains(&self, reminder_key: &str) -> Result<bool, StoreError> {
        Ok(self.records.read().await.contains_key(reminder_key))
    }

    async fn record(&self, record: DeliveryRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.reminder_key) {
            return Ok(false);
        }
        let key = record.reminder_key.clone();
        records.insert(key.clone(), record);
        if let Err(error) = self.persist(&records).await {
            // Keep memory and disk in agreement: an unpersisted record must
            // not suppress a later retry.
            records.remove(&key);
            return Err(error);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_engine::SourceKind;
    use chrono::NaiveDate;
    use chime_engine::ReminderSource;

    fn record(key: &str) -> DeliveryRecord {
        DeliveryRecord {
            reminder_key: key.to_string(),
            source: SourceKind::Todo,
            source_id: 1,
            occurrence_time: None,
            remind_time: NaiveDate::from_ymd_opt(2026, 2, 24)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        {
            let ledger = JsonLedger::open(&path).await.unwrap();
            assert!(ledger.record(record("todo:1:2026-02-24 10:00")).await.unwrap());
            assert!(!ledger.record(record("todo:1:2026-02-24 10:00")).await.unwrap());
        }

        let reopened = JsonLedger::open(&path).await.unwrap();
        assert!(reopened.contains("todo:1:2026-02-24 10:00").await.unwrap());
        assert!(!reopened.contains("todo:2:2026-02-24 10:00").await.unwrap());
    }

    #[tokio::test]
    async fn failed_persist_rolls_back_the_insert() {
        let dir = tempfile::tempdir().unwrap();
        // A missing parent directory makes every persist fail.
        let path = dir.path().join("no-such-dir").join("ledger.json");
        let ledger = JsonLedger::open(&path).await.unwrap();

        let result = ledger.record(record("todo:1:2026-02-24 10:00")).await;

        assert!(result.is_err());
        assert!(!ledger.contains("todo:1:2026-02-24 10:00").await.unwrap());

        // The key stays eligible, so a later successful persist delivers it.
        tokio::fs::create_dir(dir.path().join("no-such-dir")).await.unwrap();
        assert!(ledger.record(record("todo:1:2026-02-24 10:00")).await.unwrap());
        assert!(ledger.contains("todo:1:2026-02-24 10:00").await.unwrap());
    }

    #[tokio::test]
    async fn missing_ledger_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonLedger::open(dir.path().join("absent.json")).await.unwrap();
        assert!(!ledger.contains("todo:1:2026-02-24 10:00").await.unwrap());
    }

    #[tokio::test]
    async fn data_file_loads_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        tokio::fs::write(
            &path,
            r#"{
                "todos": [
                    {"id": 1, "content": "ship it", "remind_at": "2026-02-24T10:00:00"}
                ],
                "schedules": [
                    {"id": 1, "title": "standup", "event_time": "2026-02-24T10:00:00"}
                ],
                "rules": [
                    {"schedule_id": 1, "interval_minutes": 1440, "repeat_times": -1,
                     "remind_start_time": "2026-02-24T09:30:00", "enabled": true}
                ]
            }"#,
        )
        .await
        .unwrap();

        let source = load_source(&path).await.unwrap();
        assert_eq!(source.pending_todos().await.unwrap().len(), 1);
        assert_eq!(source.base_schedules().await.unwrap().len(), 1);
        assert_eq!(source.recurrence_rules().await.unwrap().len(), 1);
    }
}
