//! Repository functions: one function per database operation.
//!
//! Every function takes a `&PgPool` and returns a `Result<T, DbError>`.
//! Plain SQL, no engine types.

pub mod records;
pub mod workflows;
