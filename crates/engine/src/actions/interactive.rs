//! Authorisation and edits for interactive items.

use serde_json::{Map, Value};
use tracing::info;

use crate::executor::{Pass, Transition};
use crate::models::{ActionItem, Editable, EvolutionEntry, Record};
use crate::roles::user_of_role;
use crate::EngineError;

/// Anyone logged in.
pub const LOGGED_USERS: &str = "logged-users";
/// The record's submitter.
pub const SUBMITTER: &str = "_submitter";

impl Pass<'_> {
    /// Whether the acting user satisfies one of the `by` entries.
    ///
    /// An empty list lets anyone through. Entries are `_submitter`,
    /// `logged-users`, a workflow function key or a directory role.
    pub(crate) fn is_authorised(&self, record: &Record, by: &[String]) -> bool {
        if by.is_empty() {
            return true;
        }
        let Some(user) = self.exec.acting_user.as_deref() else {
            return false;
        };
        let directory = self.engine.directory.as_ref();
        let holds =
            |role: &str| user_of_role(role) == Some(user) || directory.user_has_role(user, role);

        by.iter().any(|entry| match entry.as_str() {
            SUBMITTER => record.submitter.as_deref() == Some(user),
            LOGGED_USERS => true,
            key if key.starts_with('_') => record
                .workflow_roles
                .get(key)
                .is_some_and(|roles| roles.iter().any(|r| holds(r.as_str()))),
            role => directory.lookup_role(role).is_some_and(|id| holds(id.as_str())),
        })
    }

    pub(crate) fn authorise(
        &self,
        record: &Record,
        item: &ActionItem,
        by: &[String],
    ) -> Result<(), EngineError> {
        if self.is_authorised(record, by) {
            Ok(())
        } else {
            Err(EngineError::NotAuthorised(item.id.clone()))
        }
    }

    /// Merge submitted fields into the record, then move or log the edit.
    ///
    /// Every field is checked before any is written.
    pub(crate) fn apply_edit(
        &mut self,
        record: &mut Record,
        item: &ActionItem,
        edit: &Editable,
        form: &Map<String, Value>,
    ) -> Result<(), EngineError> {
        if let Some(field) = form
            .keys()
            .find(|field| field.starts_with('_') || !edit.scope.allows(field))
        {
            return Err(EngineError::FieldNotEditable(field.clone()));
        }

        for (field, value) in form {
            record.data.insert(field.clone(), value.clone());
        }
        info!(item = %item.id, fields = form.len(), "record edited");

        let moved = edit.target_status.as_deref().is_some_and(|target| {
            matches!(
                self.transition(record, item, target, false, self.exec.origin),
                Transition::Moved
            )
        });
        // An edit that did not move the record (no target, or `_previous`
        // with nothing marked) still leaves a trace.
        if !moved {
            record.evolution.push(EvolutionEntry {
                time: self.exec.now,
                status: None,
                actor: self.exec.acting_user.clone(),
                origin: self.exec.origin,
                action_id: Some(item.id.clone()),
                identifier: item.identifier.clone(),
            });
            record.last_update = self.exec.now;
        }
        Ok(())
    }
}
