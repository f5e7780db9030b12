//! Identity and messaging models shared by the engine and its hosts.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type RoleId = String;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A role held in the host's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// URL-safe identifier; lookups try it after the id.
    pub slug: String,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            slug: slug.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Identifiers at the identity provider. Role changes are propagated
    /// only for users that have at least one.
    #[serde(default)]
    pub name_ids: Vec<String>,
    #[serde(default)]
    pub roles: BTreeSet<RoleId>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub deleted: bool,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            phone: None,
            name_ids: Vec::new(),
            roles: BTreeSet::new(),
            is_active: true,
            deleted: false,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_name_id(mut self, name_id: impl Into<String>) -> Self {
        self.name_ids.push(name_id.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Whether the user may receive outward notifications.
    pub fn is_reachable(&self) -> bool {
        self.is_active && !self.deleted
    }

    pub fn attribute(&self, attribute: UserAttribute) -> Option<&str> {
        match attribute {
            UserAttribute::Id => Some(&self.id),
            UserAttribute::NameId => self.name_ids.first().map(String::as_str),
            UserAttribute::Email => self.email.as_deref(),
            UserAttribute::Name => Some(&self.name),
        }
    }
}

/// Attribute a user can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAttribute {
    Id,
    NameId,
    Email,
    Name,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Outbound notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Webservice,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Sms => f.write_str("sms"),
            Channel::Webservice => f.write_str("webservice"),
        }
    }
}
