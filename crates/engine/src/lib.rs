//! `engine` crate: workflow models, load-time validation and the status
//! execution loop.

pub mod actions;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod failures;
pub mod graph;
pub mod jobs;
pub mod markers;
pub mod models;
pub mod roles;

pub use config::EngineConfig;
pub use context::{ExecutionContext, SubstitutionContext};
pub use error::{ConfigError, EngineError};
pub use executor::{DisplayedMessage, Engine, PassOutcome, PassState, SurfaceItem};
pub use failures::{
    FailureKind, FailureRecorder, FailureSite, InMemoryFailureRecorder, LoggedError,
    LoggedErrorRef,
};
pub use graph::{validate_workflow, StatusGraph};
pub use jobs::{AfterJob, RoleOperation};
pub use markers::MarkerStack;
pub use models::{ActionItem, ActionKind, Record, Status, TriggerOrigin, Workflow};
pub use roles::{ResolveError, RoleResolver};

#[cfg(test)]
mod executor_tests;
