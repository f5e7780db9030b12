//! Provider-level error types.

use thiserror::Error;

/// Failures of the role directory.
///
/// Membership changes are idempotent, so "already held" and "not held" are
/// not errors; only missing identities and backend failures are.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown role '{0}'")]
    UnknownRole(String),

    /// The backing store could not be reached.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Failures returned by a [`crate::Notifier`].
///
/// Always recoverable from the engine's point of view: the failure is
/// recorded and the pass goes on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NotifyError {
    #[error("no recipients")]
    NoRecipients,

    /// The gateway answered but refused the message.
    #[error("notification rejected: {0}")]
    Rejected(String),

    /// The gateway could not be reached.
    #[error("notification gateway unavailable: {0}")]
    Unavailable(String),
}
