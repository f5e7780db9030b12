//! After-jobs: side effects deferred until the host has saved the record.
//!
//! The engine only describes them. The host enqueues them after commit and
//! executes them outside the pass; a failure is recorded, never retried.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use providers::{Channel, RoleId, UserId};

use crate::failures::{FailureKind, FailureSite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleOperation {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AfterJob {
    /// Mirror a local role change at the identity provider.
    SyncRole {
        site: FailureSite,
        user_id: UserId,
        name_ids: Vec<String>,
        role_id: RoleId,
        operation: RoleOperation,
    },
    /// A notification the pass chose not to send inline.
    Notify {
        site: FailureSite,
        channel: Channel,
        recipients: Vec<String>,
        body: String,
        metadata: Value,
    },
}

impl AfterJob {
    pub fn site(&self) -> &FailureSite {
        match self {
            AfterJob::SyncRole { site, .. } | AfterJob::Notify { site, .. } => site,
        }
    }

    /// Kind recorded when the job fails.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AfterJob::SyncRole { .. } => FailureKind::RoleSyncFailed,
            AfterJob::Notify { .. } => FailureKind::NotifyFailed,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AfterJob::SyncRole { .. } => "sync_role",
            AfterJob::Notify { .. } => "notify",
        }
    }
}
