//! `queue` crate: after-jobs executed once a pass has been persisted.
//!
//! The engine describes deferred work as [`engine::AfterJob`]s; this crate
//! buffers them on a `tokio` channel and runs them against async gateways.

pub mod error;
pub mod gateway;
pub mod http;
pub mod worker;

pub use error::QueueError;
pub use gateway::{NotificationGateway, RoleMembershipSync};
pub use http::{GatewaySettings, HttpGateway};
pub use worker::{Envelope, JobQueue, Worker, DEFAULT_QUEUE_CAPACITY};
