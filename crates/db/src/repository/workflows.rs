//! Workflow definition storage.

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;

use crate::{models::WorkflowRow, DbError};

const COLUMNS: &str = "id, name, definition, created_at, updated_at";

/// Insert a workflow, or replace the definition of an existing one.
///
/// `definition` must be the JSON the engine validated on load.
pub async fn upsert_workflow(
    pool: &PgPool,
    id: &str,
    name: &str,
    definition: &Value,
) -> Result<WorkflowRow, DbError> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        r#"
        INSERT INTO workflows (id, name, definition, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                definition = EXCLUDED.definition,
                updated_at = EXCLUDED.updated_at
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(name)
    .bind(definition)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
