use axum::{extract::State, Json};

use engine::LoggedError;

use crate::registry::WorkflowSummary;
use crate::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<WorkflowSummary>> {
    Json(state.workflows.summaries())
}

/// The failure log, most recently seen first.
pub async fn errors(State(state): State<AppState>) -> Json<Vec<LoggedError>> {
    Json(state.engine.recorder().list())
}
