//! The outbound contracts the engine depends on.

use serde_json::Value;
use tracing::info;

use crate::error::{DirectoryError, NotifyError};
use crate::models::{Channel, Role, RoleId, User, UserAttribute};

/// Host directory of roles and users.
///
/// Implementations must make [`add_role`](Self::add_role) and
/// [`remove_role`](Self::remove_role) idempotent: granting a held role or
/// revoking an unheld one succeeds and reports `false`.
pub trait RoleDirectory: Send + Sync {
    fn role_by_id(&self, id: &str) -> Option<Role>;
    fn role_by_slug(&self, slug: &str) -> Option<Role>;
    fn role_by_name(&self, name: &str) -> Option<Role>;

    /// Look a role up by id, then slug, then exact name.
    fn lookup_role(&self, spec: &str) -> Option<RoleId> {
        self.role_by_id(spec)
            .or_else(|| self.role_by_slug(spec))
            .or_else(|| self.role_by_name(spec))
            .map(|role| role.id)
    }

    fn find_user(&self, attribute: UserAttribute, value: &str) -> Option<User>;

    fn user(&self, id: &str) -> Option<User> {
        self.find_user(UserAttribute::Id, id)
    }

    /// All users currently holding the role, reachable or not.
    fn members(&self, role: &str) -> Vec<User>;

    fn user_has_role(&self, user: &str, role: &str) -> bool;

    /// Grant a role; `Ok(true)` when membership changed.
    fn add_role(&self, user: &str, role: &str) -> Result<bool, DirectoryError>;

    /// Revoke a role; `Ok(true)` when membership changed.
    fn remove_role(&self, user: &str, role: &str) -> Result<bool, DirectoryError>;
}

/// Synchronous outbound notification.
///
/// Called inline during a pass, so a slow gateway slows the pass. Hosts
/// that cannot afford that defer notifications to the after-job queue.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        channel: Channel,
        recipients: &[String],
        body: &str,
        metadata: &Value,
    ) -> Result<(), NotifyError>;
}

/// Notifier that only writes a log line. Used when no gateway is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(
        &self,
        channel: Channel,
        recipients: &[String],
        body: &str,
        metadata: &Value,
    ) -> Result<(), NotifyError> {
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        info!(%channel, ?recipients, body, %metadata, "notification");
        Ok(())
    }
}
