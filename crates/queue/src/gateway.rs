//! Async contracts the worker executes after-jobs against.

use async_trait::async_trait;
use serde_json::Value;

use providers::Channel;

use crate::QueueError;

/// Delivers a notification outside the pass that produced it.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(
        &self,
        channel: Channel,
        recipients: &[String],
        body: &str,
        metadata: &Value,
    ) -> Result<(), QueueError>;
}

/// Mirrors local role membership at the identity provider.
///
/// `name_id` is the user's identifier at the provider, not the local id.
#[async_trait]
pub trait RoleMembershipSync: Send + Sync {
    async fn add_member(&self, role_id: &str, name_id: &str) -> Result<(), QueueError>;

    async fn remove_member(&self, role_id: &str, name_id: &str) -> Result<(), QueueError>;
}
