//! Record stores: where the API keeps records between passes.
//!
//! [`PgRecordStore`] persists through the `db` crate; [`MemoryRecordStore`]
//! keeps everything in a map and backs the tests and `serve` without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use db::models::RecordRow;
use db::repository::records;
use db::{DbError, DbPool};
use engine::models::EvolutionEntry;
use engine::Record;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    /// A stored column does not decode into its engine type.
    #[error("stored record {id} is corrupt: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Record>, StoreError>;

    /// Insert or overwrite a record. Evolution entries already stored are
    /// kept; only new ones are added.
    async fn save(&self, record: &Record) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryRecordStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<HashMap<Uuid, Record>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, id: Uuid) -> Result<Option<Record>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&id).cloned())
    }

    async fn save(&self, record: &Record) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(record.id, record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PgRecordStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn load(&self, id: Uuid) -> Result<Option<Record>, StoreError> {
        let row = match records::get_record(&self.pool, id).await {
            Ok(row) => row,
            Err(DbError::NotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let evolution = records::get_evolution(&self.pool, id)
            .await?
            .into_iter()
            .map(|row| row.entry)
            .collect();
        from_row(row, evolution).map(Some)
    }

    async fn save(&self, record: &Record) -> Result<(), StoreError> {
        let (row, evolution) = to_row(record)?;
        records::save_record(&self.pool, &row, &evolution).await?;
        Ok(())
    }
}

fn corrupt(id: Uuid) -> impl Fn(serde_json::Error) -> StoreError {
    move |err| StoreError::Corrupt {
        id,
        reason: err.to_string(),
    }
}

/// Split a record into its row and its evolution entries.
pub fn to_row(record: &Record) -> Result<(RecordRow, Vec<Value>), StoreError> {
    let json = |value: Result<Value, serde_json::Error>| value.map_err(corrupt(record.id));
    let row = RecordRow {
        id: record.id,
        workflow_id: record.workflow_id.clone(),
        status_id: record.status.clone(),
        data: Value::Object(record.data.clone()),
        submitter_id: record.submitter.clone(),
        marker_stack: json(serde_json::to_value(&record.marker_stack))?,
        workflow_roles: json(serde_json::to_value(&record.workflow_roles))?,
        last_update: record.last_update,
        created_at: Utc::now(),
    };
    let evolution = record
        .evolution
        .iter()
        .map(|entry| json(serde_json::to_value(entry)))
        .collect::<Result<_, _>>()?;
    Ok((row, evolution))
}

/// Rebuild a record from its row and evolution entries.
pub fn from_row(row: RecordRow, evolution: Vec<Value>) -> Result<Record, StoreError> {
    let id = row.id;
    let Value::Object(data) = row.data else {
        return Err(StoreError::Corrupt {
            id,
            reason: "data is not an object".into(),
        });
    };
    let evolution = evolution
        .into_iter()
        .map(serde_json::from_value::<EvolutionEntry>)
        .collect::<Result<_, _>>()
        .map_err(corrupt(id))?;

    Ok(Record {
        id,
        workflow_id: row.workflow_id,
        status: row.status_id,
        data,
        submitter: row.submitter_id,
        marker_stack: serde_json::from_value(row.marker_stack).map_err(corrupt(id))?,
        evolution,
        workflow_roles: serde_json::from_value(row.workflow_roles).map_err(corrupt(id))?,
        last_update: row.last_update,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::models::TriggerOrigin;
    use serde_json::json;

    fn record() -> Record {
        let mut record: Record = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "workflow_id": "wf",
            "status": "info",
            "data": {"amount": 12},
            "submitter": "u-1",
            "marker_stack": ["new"],
            "workflow_roles": {"_receiver": ["R1"]},
            "last_update": Utc::now()
        }))
        .unwrap();
        record.evolution.push(EvolutionEntry {
            time: Utc::now(),
            status: Some("info".into()),
            actor: Some("u-1".into()),
            origin: TriggerOrigin::Interactive,
            action_id: Some("ask".into()),
            identifier: None,
        });
        record
    }

    #[test]
    fn rows_rebuild_the_same_record() {
        let record = record();
        let (row, evolution) = to_row(&record).unwrap();
        assert_eq!(row.marker_stack, json!(["new"]));
        assert_eq!(row.workflow_roles, json!({"_receiver": ["R1"]}));
        assert_eq!(from_row(row, evolution).unwrap(), record);
    }

    #[test]
    fn non_object_data_is_corrupt() {
        let (mut row, _) = to_row(&record()).unwrap();
        row.data = json!([1, 2]);
        assert!(matches!(
            from_row(row, vec![]),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryRecordStore::new();
        let record = record();
        store.save(&record).await.unwrap();
        assert_eq!(store.load(record.id).await.unwrap(), Some(record));
        assert_eq!(store.load(Uuid::new_v4()).await.unwrap(), None);
    }
}
