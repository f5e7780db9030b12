//! Role resolver: turns role specs into role ids.
//!
//! A spec is a role id, slug or name, a workflow function key, a
//! `_user*` special form, or a template rendering to any of those. A
//! rendered string is looked up whole; only recipient lists are split on
//! commas. Misses are reported one by one so a bad value never hides the
//! good ones.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use expr::{is_template, to_text, Evaluator, ExpressionError};
use providers::{DirectoryError, RoleDirectory, RoleId, User, UserAttribute};

use crate::context::SubstitutionContext;
use crate::models::RoleKey;

/// Prefix of pseudo role ids naming a single user.
pub const USER_ROLE_PREFIX: &str = "_user:";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("missing role ({value}{})", from_suffix(.template))]
    MissingRole {
        value: String,
        template: Option<String>,
    },

    #[error("missing user ({value}{})", from_suffix(.template))]
    MissingUser {
        value: String,
        template: Option<String>,
    },

    #[error("cannot render role template {template}: {error}")]
    Template {
        template: String,
        error: ExpressionError,
    },
}

fn from_suffix(template: &Option<String>) -> String {
    template
        .as_ref()
        .map(|t| format!(", from {t}"))
        .unwrap_or_default()
}

/// Pseudo role id for a single user.
pub fn user_role(user_id: &str) -> RoleId {
    format!("{USER_ROLE_PREFIX}{user_id}")
}

/// The user id behind a `_user:<id>` pseudo role.
pub fn user_of_role(role: &str) -> Option<&str> {
    role.strip_prefix(USER_ROLE_PREFIX)
}

fn special_form(value: &str) -> Option<(UserAttribute, Option<&str>)> {
    let (form, argument) = match value.split_once(':') {
        Some((form, argument)) => (form, Some(argument.trim())),
        None => (value, None),
    };
    let attribute = match form {
        "_user" => UserAttribute::Id,
        "_user_nameid" => UserAttribute::NameId,
        "_user_email" => UserAttribute::Email,
        "_user_name" => UserAttribute::Name,
        _ => return None,
    };
    Some((attribute, argument))
}

pub struct RoleResolver<'a> {
    directory: &'a dyn RoleDirectory,
    evaluator: &'a Evaluator,
    submitter: Option<&'a str>,
    functions: Option<&'a BTreeMap<RoleKey, BTreeSet<RoleId>>>,
    split_commas: bool,
}

impl<'a> RoleResolver<'a> {
    pub fn new(directory: &'a dyn RoleDirectory, evaluator: &'a Evaluator) -> Self {
        Self {
            directory,
            evaluator,
            submitter: None,
            functions: None,
            split_commas: false,
        }
    }

    /// User the bare `_user*` forms refer to.
    pub fn submitter(mut self, submitter: Option<&'a str>) -> Self {
        self.submitter = submitter;
        self
    }

    /// Workflow function buckets; a function key expands to its roles.
    pub fn functions(mut self, functions: &'a BTreeMap<RoleKey, BTreeSet<RoleId>>) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Read `"a, b"` as two values, the way recipient lists are written.
    pub fn split_commas(mut self) -> Self {
        self.split_commas = true;
        self
    }

    /// Resolve a spec. Fails only when nothing resolved.
    pub fn resolve(
        &self,
        spec: &str,
        ctx: &SubstitutionContext,
    ) -> Result<Vec<RoleId>, ResolveError> {
        let mut first_miss = None;
        let roles = self.resolve_lenient(spec, ctx, |miss| {
            first_miss.get_or_insert(miss);
        });
        match first_miss {
            Some(miss) if roles.is_empty() => Err(miss),
            _ => Ok(roles),
        }
    }

    /// Resolve a spec, handing every miss to `on_miss` and returning
    /// whatever did resolve, deduplicated in order.
    pub fn resolve_lenient(
        &self,
        spec: &str,
        ctx: &SubstitutionContext,
        mut on_miss: impl FnMut(ResolveError),
    ) -> Vec<RoleId> {
        let template = is_template(spec).then(|| spec.to_string());
        let values = match self.expand(spec, ctx) {
            Ok(values) => values,
            Err(error) => {
                on_miss(error);
                return Vec::new();
            }
        };

        let mut roles: Vec<RoleId> = Vec::new();
        for value in values {
            match self.resolve_one(&value, template.as_deref()) {
                Ok(resolved) => {
                    for role in resolved {
                        if !roles.contains(&role) {
                            roles.push(role);
                        }
                    }
                }
                Err(miss) => on_miss(miss),
            }
        }
        roles
    }

    /// Render a spec into the individual values to look up.
    pub fn expand(
        &self,
        spec: &str,
        ctx: &SubstitutionContext,
    ) -> Result<Vec<String>, ResolveError> {
        let rendered = if is_template(spec) {
            self.evaluator
                .render(spec, ctx)
                .map_err(|error| ResolveError::Template {
                    template: spec.to_string(),
                    error,
                })?
        } else {
            Value::String(spec.to_string())
        };
        let mut values = Vec::new();
        flatten(&rendered, self.split_commas, &mut values);
        Ok(values)
    }

    /// Resolve one already-rendered value. `template` only feeds the miss
    /// message.
    pub fn resolve_one(
        &self,
        value: &str,
        template: Option<&str>,
    ) -> Result<Vec<RoleId>, ResolveError> {
        if user_of_role(value).is_some() {
            return Ok(vec![value.to_string()]);
        }

        if let Some((attribute, argument)) = special_form(value) {
            let user = match argument {
                Some(argument) => self.directory.find_user(attribute, argument),
                None => self.submitter.and_then(|id| self.directory.user(id)),
            };
            return user.map(|u| vec![user_role(&u.id)]).ok_or_else(|| {
                ResolveError::MissingUser {
                    value: value.to_string(),
                    template: template.map(str::to_string),
                }
            });
        }

        if let Some(roles) = self.functions.and_then(|f| f.get(value)) {
            debug!(function = value, "expanding workflow function");
            return Ok(roles.iter().cloned().collect());
        }

        self.directory
            .lookup_role(value)
            .map(|id| vec![id])
            .ok_or_else(|| ResolveError::MissingRole {
                value: value.to_string(),
                template: template.map(str::to_string),
            })
    }

    /// Find a user by name identifier, e-mail, then name.
    pub fn find_user(&self, value: &str) -> Option<User> {
        [UserAttribute::NameId, UserAttribute::Email, UserAttribute::Name]
            .into_iter()
            .find_map(|attribute| self.directory.find_user(attribute, value))
    }

    /// Users behind resolved role ids, expanding roles to their members.
    pub fn users_of(&self, roles: &[RoleId]) -> Vec<User> {
        let mut users: Vec<User> = Vec::new();
        for role in roles {
            let found = match user_of_role(role) {
                Some(id) => self.directory.user(id).into_iter().collect(),
                None => self.directory.members(role),
            };
            for user in found {
                if !users.iter().any(|u| u.id == user.id) {
                    users.push(user);
                }
            }
        }
        users
    }

    /// Grant a role; granting a held role changes nothing.
    pub fn add(&self, user: &str, role: &str) -> Result<bool, DirectoryError> {
        let changed = self.directory.add_role(user, role)?;
        debug!(user, role, changed, "role granted");
        Ok(changed)
    }

    /// Revoke a role; revoking an unheld role changes nothing.
    pub fn remove(&self, user: &str, role: &str) -> Result<bool, DirectoryError> {
        let changed = self.directory.remove_role(user, role)?;
        debug!(user, role, changed, "role revoked");
        Ok(changed)
    }
}

/// Lists are flattened; with `split_commas` strings are split too.
pub(crate) fn flatten(value: &Value, split_commas: bool, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten(item, split_commas, out);
            }
        }
        Value::Null => {}
        Value::String(text) if split_commas => out.extend(
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        ),
        Value::String(text) => {
            let text = text.trim();
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }
        other => out.push(to_text(other)),
    }
}
