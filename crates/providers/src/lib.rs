//! `providers` crate: contracts for the engine's outbound collaborators.
//!
//! The engine never talks to an identity store or a messaging gateway
//! directly. It goes through [`RoleDirectory`] and [`Notifier`], which hosts
//! implement on top of their own storage. In-memory implementations live in
//! [`mock`] for tests and local runs.

pub mod error;
pub mod mock;
pub mod models;
pub mod traits;

pub use error::{DirectoryError, NotifyError};
pub use models::{Channel, Role, RoleId, User, UserAttribute, UserId};
pub use traits::{LogNotifier, Notifier, RoleDirectory};
