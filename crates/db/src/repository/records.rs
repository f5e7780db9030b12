//! Record storage.
//!
//! The record row is overwritten on every save; the evolution table only
//! ever receives the entries it does not hold yet.

use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::{
    models::{EvolutionRow, RecordRow},
    DbError,
};

const COLUMNS: &str = "id, workflow_id, status_id, data, submitter_id, marker_stack, \
                       workflow_roles, last_update, created_at";

/// Entries of `evolution` past the `stored` ones, or `None` when fewer
/// entries are given than are already stored.
pub fn unsaved_entries(stored: usize, evolution: &[Value]) -> Option<&[Value]> {
    evolution.get(stored..)
}

/// Save a record and append its new evolution entries, in one transaction.
///
/// # Errors
/// [`DbError::HistoryRewrite`] when `evolution` is shorter than the stored
/// history.
pub async fn save_record(
    pool: &PgPool,
    row: &RecordRow,
    evolution: &[Value],
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO records
            (id, workflow_id, status_id, data, submitter_id, marker_stack,
             workflow_roles, last_update, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE
            SET status_id = EXCLUDED.status_id,
                data = EXCLUDED.data,
                submitter_id = EXCLUDED.submitter_id,
                marker_stack = EXCLUDED.marker_stack,
                workflow_roles = EXCLUDED.workflow_roles,
                last_update = EXCLUDED.last_update
        "#,
    )
    .bind(row.id)
    .bind(&row.workflow_id)
    .bind(&row.status_id)
    .bind(&row.data)
    .bind(&row.submitter_id)
    .bind(&row.marker_stack)
    .bind(&row.workflow_roles)
    .bind(row.last_update)
    .bind(row.created_at)
    .execute(&mut *tx)
    .await?;

    let (stored,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM record_evolution WHERE record_id = $1")
            .bind(row.id)
            .fetch_one(&mut *tx)
            .await?;
    let stored = usize::try_from(stored).unwrap_or_default();
    let unsaved = unsaved_entries(stored, evolution).ok_or(DbError::HistoryRewrite(row.id))?;

    for (offset, entry) in unsaved.iter().enumerate() {
        let seq = i32::try_from(stored + offset).map_err(|_| DbError::HistoryRewrite(row.id))?;
        sqlx::query("INSERT INTO record_evolution (record_id, seq, entry) VALUES ($1, $2, $3)")
            .bind(row.id)
            .bind(seq)
            .bind(entry)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    debug!(record = %row.id, status = %row.status_id, appended = unsaved.len(), "record saved");
    Ok(())
}

/// Fetch a record row by id.
pub async fn get_record(pool: &PgPool, id: Uuid) -> Result<RecordRow, DbError> {
    sqlx::query_as::<_, RecordRow>(&format!("SELECT {COLUMNS} FROM records WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// A record's evolution, oldest first.
pub async fn get_evolution(pool: &PgPool, id: Uuid) -> Result<Vec<EvolutionRow>, DbError> {
    let rows = sqlx::query_as::<_, EvolutionRow>(
        "SELECT record_id, seq, entry FROM record_evolution WHERE record_id = $1 ORDER BY seq",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
