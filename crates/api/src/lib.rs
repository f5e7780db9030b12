//! `api` crate: HTTP surface of the status engine.
//!
//! Exposes:
//!   GET    /api/v1/workflows
//!   GET    /api/v1/errors
//!   POST   /api/v1/records
//!   GET    /api/v1/records/:id
//!   POST   /api/v1/records/:id/run
//!   POST   /api/v1/records/:id/actions/:item_id
//!   POST   /api/v1/records/:id/triggers/:name
//!   POST   /api/v1/records/:id/global-actions/:action_id
//!
//! The acting user, when any, is named by the `x-user-id` header.

pub mod error;
pub mod handlers;
pub mod locks;
pub mod registry;
pub mod store;

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use engine::{Engine, StatusGraph};
use queue::JobQueue;

pub use error::ApiError;
pub use locks::RecordLocks;
pub use registry::{WorkflowRegistry, WorkflowSummary};
pub use store::{MemoryRecordStore, PgRecordStore, RecordStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub workflows: WorkflowRegistry,
    pub store: Arc<dyn RecordStore>,
    pub locks: RecordLocks,
    /// Where after-jobs go once a record is saved; `None` drops them.
    pub jobs: Option<JobQueue>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, workflows: WorkflowRegistry, store: Arc<dyn RecordStore>) -> Self {
        Self {
            engine,
            workflows,
            store,
            locks: RecordLocks::new(),
            jobs: None,
        }
    }

    pub fn with_jobs(mut self, jobs: JobQueue) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub(crate) fn graph(&self, workflow_id: &str) -> Result<Arc<StatusGraph>, ApiError> {
        self.workflows
            .get(workflow_id)
            .ok_or_else(|| ApiError::not_found(format!("workflow {workflow_id} not found")))
    }
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{records, workflows};

    Router::new()
        .route("/api/v1/workflows", get(workflows::list))
        .route("/api/v1/errors", get(workflows::errors))
        .route("/api/v1/records", post(records::create))
        .route("/api/v1/records/:id", get(records::get))
        .route("/api/v1/records/:id/run", post(records::run))
        .route("/api/v1/records/:id/actions/:item_id", post(records::submit))
        .route("/api/v1/records/:id/triggers/:name", post(records::trigger))
        .route(
            "/api/v1/records/:id/global-actions/:action_id",
            post(records::global_action),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` completes.
///
/// In-flight requests finish first. The state, and with it the job queue's
/// sender, is dropped before this returns, so a worker on the other end
/// drains what is left and stops.
pub async fn serve<F>(addr: &str, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "api listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("api stopped");
    Ok(())
}
