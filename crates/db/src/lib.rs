//! `db` crate: Postgres storage for workflows and records.
//!
//! Rows hold engine state as JSON columns (`data`, `marker_stack`,
//! `workflow_roles`); evolution entries live in their own append-only table.
//! Converting rows to engine records is the caller's job.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::DbPool;
