//! In-memory test doubles for [`RoleDirectory`] and [`Notifier`].
//!
//! Both record what they are asked to do so tests can assert on side
//! effects without a database or a gateway.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::{DirectoryError, NotifyError};
use crate::models::{Channel, Role, User, UserAttribute};
use crate::traits::{Notifier, RoleDirectory};

// ---------------------------------------------------------------------------
// InMemoryDirectory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DirectoryState {
    roles: Vec<Role>,
    users: BTreeMap<String, User>,
}

/// A directory held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(self, role: Role) -> Self {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).roles.push(role);
        self
    }

    pub fn with_user(self, user: User) -> Self {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .users
            .insert(user.id.clone(), user);
        self
    }

    /// Mark a user inactive or deleted after construction.
    pub fn set_reachable(&self, user: &str, active: bool, deleted: bool) {
        if let Some(u) = self.state.lock().unwrap_or_else(|e| e.into_inner()).users.get_mut(user) {
            u.is_active = active;
            u.deleted = deleted;
        }
    }

    /// Roles currently held by a user, sorted.
    pub fn roles_of(&self, user: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .users
            .get(user)
            .map(|u| u.roles.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl RoleDirectory for InMemoryDirectory {
    fn role_by_id(&self, id: &str) -> Option<Role> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.roles.iter().find(|r| r.id == id).cloned()
    }

    fn role_by_slug(&self, slug: &str) -> Option<Role> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.roles.iter().find(|r| r.slug == slug).cloned()
    }

    fn role_by_name(&self, name: &str) -> Option<Role> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.roles.iter().find(|r| r.name == name).cloned()
    }

    fn find_user(&self, attribute: UserAttribute, value: &str) -> Option<User> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match attribute {
            UserAttribute::Id => state.users.get(value).cloned(),
            UserAttribute::NameId => state
                .users
                .values()
                .find(|u| u.name_ids.iter().any(|n| n == value))
                .cloned(),
            _ => state
                .users
                .values()
                .find(|u| u.attribute(attribute) == Some(value))
                .cloned(),
        }
    }

    fn members(&self, role: &str) -> Vec<User> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .users
            .values()
            .filter(|u| u.roles.contains(role))
            .cloned()
            .collect()
    }

    fn user_has_role(&self, user: &str, role: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .users
            .get(user)
            .is_some_and(|u| u.roles.contains(role))
    }

    fn add_role(&self, user: &str, role: &str) -> Result<bool, DirectoryError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.roles.iter().any(|r| r.id == role) {
            return Err(DirectoryError::UnknownRole(role.to_string()));
        }
        let u = state
            .users
            .get_mut(user)
            .ok_or_else(|| DirectoryError::UnknownUser(user.to_string()))?;
        Ok(u.roles.insert(role.to_string()))
    }

    fn remove_role(&self, user: &str, role: &str) -> Result<bool, DirectoryError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let u = state
            .users
            .get_mut(user)
            .ok_or_else(|| DirectoryError::UnknownUser(user.to_string()))?;
        Ok(u.roles.remove(role))
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// One call seen by a [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub channel: Channel,
    pub recipients: Vec<String>,
    pub body: String,
    pub metadata: Value,
}

/// A notifier that records every call and either succeeds or fails with a
/// fixed error.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    failure: Option<NotifyError>,
    /// All notifications seen, in call order (failed ones included).
    pub sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every call fails with `error`.
    pub fn failing(error: NotifyError) -> Self {
        Self {
            failure: Some(error),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn calls(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(
        &self,
        channel: Channel,
        recipients: &[String],
        body: &str,
        metadata: &Value,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(SentNotification {
            channel,
            recipients: recipients.to_vec(),
            body: body.to_string(),
            metadata: metadata.clone(),
        });
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
