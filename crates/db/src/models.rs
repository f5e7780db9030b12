//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: structured columns hold plain JSON and
//! carry no domain behaviour. Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: String,
    pub name: String,
    /// Full JSON workflow definition (statuses, items, global actions, …)
    pub definition: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// records
// ---------------------------------------------------------------------------

/// Current state of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub workflow_id: String,
    pub status_id: String,
    pub data: Value,
    pub submitter_id: Option<String>,
    /// JSON array of status ids, top last.
    pub marker_stack: Value,
    /// JSON object: function key → array of role ids.
    pub workflow_roles: Value,
    pub last_update: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// record_evolution
// ---------------------------------------------------------------------------

/// One evolution entry; `seq` counts from 0 per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EvolutionRow {
    pub record_id: Uuid,
    pub seq: i32,
    pub entry: Value,
}
