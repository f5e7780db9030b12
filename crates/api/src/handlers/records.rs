//! Record endpoints: create, inspect and drive records.
//!
//! Every mutating handler takes the record's lock, loads it, runs the
//! engine, saves it and only then enqueues the pass's after-jobs.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use engine::{
    DisplayedMessage, Engine, EngineError, ExecutionContext, PassOutcome, Record, StatusGraph,
    SurfaceItem, TriggerOrigin,
};

use super::acting_user;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateRecordDto {
    pub workflow_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// A record after a pass.
#[derive(Debug, Serialize)]
pub struct PassResponse {
    pub record: Record,
    pub outcome: PassOutcome,
}

/// A record as the acting user sees it.
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub record: Record,
    pub actions: Vec<SurfaceItem>,
    pub messages: Vec<DisplayedMessage>,
}

fn user_context(headers: &HeaderMap, origin: TriggerOrigin) -> ExecutionContext {
    match acting_user(headers) {
        Some(user) => ExecutionContext::for_user(user, origin),
        None => ExecutionContext {
            origin,
            ..ExecutionContext::automatic()
        },
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /api/v1/records`: create a record submitted by the acting user and
/// run its first pass.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRecordDto>,
) -> Result<(StatusCode, Json<PassResponse>), ApiError> {
    let graph = state.graph(&payload.workflow_id)?;
    let mut record = state
        .engine
        .create_record(&graph, payload.data, acting_user(&headers));
    let _guard = state.locks.acquire(record.id).await;

    let exec = user_context(&headers, TriggerOrigin::Automatic);
    let outcome = state.engine.run(&graph, &mut record, &exec)?;
    commit(&state, &record, &outcome).await?;
    info!(record = %record.id, workflow = %graph.id(), "record created");

    Ok((StatusCode::CREATED, Json(PassResponse { record, outcome })))
}

/// `GET /api/v1/records/:id`
pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RecordView>, ApiError> {
    let record = load(&state, id).await?;
    let graph = state.graph(&record.workflow_id)?;
    let exec = user_context(&headers, TriggerOrigin::Interactive);

    let actions = state.engine.surface(&graph, &record, &exec)?;
    let messages = state.engine.messages(&graph, &record, &exec)?;
    Ok(Json(RecordView {
        record,
        actions,
        messages,
    }))
}

/// `POST /api/v1/records/:id/run`: automatic re-evaluation.
pub async fn run(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PassResponse>, ApiError> {
    drive(&state, id, |engine, graph, record| {
        engine.run(graph, record, &ExecutionContext::automatic())
    })
    .await
    .map(Json)
}

/// `POST /api/v1/records/:id/actions/:item_id`: the body is the submitted
/// form, `{}` for a plain choice.
pub async fn submit(
    Path((id, item_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<Map<String, Value>>,
) -> Result<Json<PassResponse>, ApiError> {
    let exec = user_context(&headers, TriggerOrigin::Interactive);
    drive(&state, id, |engine, graph, record| {
        engine.submit(graph, record, &item_id, &form, &exec)
    })
    .await
    .map(Json)
}

/// `POST /api/v1/records/:id/triggers/:name`
pub async fn trigger(
    Path((id, name)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<Json<PassResponse>, ApiError> {
    drive(&state, id, |engine, graph, record| {
        engine.trigger(graph, record, &name, &ExecutionContext::webservice())
    })
    .await
    .map(Json)
}

/// `POST /api/v1/records/:id/global-actions/:action_id`: a manual trigger
/// when a user is named, a webservice trigger otherwise.
pub async fn global_action(
    Path((id, action_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PassResponse>, ApiError> {
    let exec = match acting_user(&headers) {
        Some(user) => ExecutionContext::for_user(user, TriggerOrigin::Interactive),
        None => ExecutionContext::webservice(),
    };
    drive(&state, id, |engine, graph, record| {
        engine.run_global_action(graph, record, &action_id, &exec)
    })
    .await
    .map(Json)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn load(state: &AppState, id: Uuid) -> Result<Record, ApiError> {
    state
        .store
        .load(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("record {id} not found")))
}

/// Lock, load, run `pass`, save. The record is not saved when `pass` fails.
async fn drive<F>(state: &AppState, id: Uuid, pass: F) -> Result<PassResponse, ApiError>
where
    F: FnOnce(&Engine, &StatusGraph, &mut Record) -> Result<PassOutcome, EngineError>,
{
    let _guard = state.locks.acquire(id).await;
    let mut record = load(state, id).await?;
    let graph = state.graph(&record.workflow_id)?;

    let outcome = pass(&state.engine, &graph, &mut record)?;
    commit(state, &record, &outcome).await?;
    Ok(PassResponse { record, outcome })
}

/// Save the record, then hand its after-jobs to the queue.
async fn commit(state: &AppState, record: &Record, outcome: &PassOutcome) -> Result<(), ApiError> {
    state.store.save(record).await?;

    if outcome.after_jobs.is_empty() {
        return Ok(());
    }
    match &state.jobs {
        Some(queue) => {
            if let Err(err) = queue.enqueue_all(outcome.after_jobs.clone()).await {
                error!(record = %record.id, error = %err, "after-jobs lost");
            }
        }
        None => warn!(
            record = %record.id,
            jobs = outcome.after_jobs.len(),
            "no job queue configured, after-jobs dropped"
        ),
    }
    Ok(())
}
