//! Queue-level error type.

use thiserror::Error;

/// Errors raised while enqueuing or executing an after-job.
///
/// None of them is retried: the worker records the failure and moves on.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The worker side of the queue is gone.
    #[error("job queue is closed")]
    Closed,

    /// No endpoint is configured for this kind of job.
    #[error("no endpoint configured for {0}")]
    NotConfigured(&'static str),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with an unexpected status.
    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("{0}")]
    Rejected(String),
}
