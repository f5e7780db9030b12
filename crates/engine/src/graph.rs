//! Status graph: load-time validation of a workflow definition.
//!
//! Rules enforced before a workflow can run:
//! 1. Status, action item and global action ids are unique.
//! 2. The initial status exists.
//! 3. Every jump, choice and edit target is a declared status or `_previous`.
//! 4. Every action `type` tag is known.
//! 5. Every condition, computed value and template validates.
//!
//! A [`StatusGraph`] can only be built from a workflow that passed, so the
//! executor never checks targets at run time.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use expr::{is_template, Evaluator};

use crate::models::{ActionItem, ActionKind, GlobalAction, Status, Workflow, PREVIOUS};
use crate::ConfigError;

#[derive(Debug, Clone)]
pub struct StatusGraph {
    workflow: Workflow,
    index: HashMap<String, usize>,
}

impl StatusGraph {
    /// Parse and validate a JSON definition.
    ///
    /// # Errors
    /// [`ConfigError::UnknownActionType`] for an unregistered tag, otherwise
    /// any error of [`validate_workflow`].
    pub fn from_json(definition: &str, evaluator: &Evaluator) -> Result<Self, ConfigError> {
        let raw: Value = serde_json::from_str(definition)?;
        check_action_tags(&raw)?;
        let workflow: Workflow = serde_json::from_value(raw)?;
        Self::new(workflow, evaluator)
    }

    pub fn new(workflow: Workflow, evaluator: &Evaluator) -> Result<Self, ConfigError> {
        validate_workflow(&workflow, evaluator)?;
        let index = workflow
            .statuses
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Ok(Self { workflow, index })
    }

    pub fn id(&self) -> &str {
        &self.workflow.id
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn status(&self, id: &str) -> Option<&Status> {
        self.index.get(id).map(|&i| &self.workflow.statuses[i])
    }

    pub fn global_action(&self, id: &str) -> Option<&GlobalAction> {
        self.workflow.global_action(id)
    }
}

/// Check a workflow against the load-time rules.
pub fn validate_workflow(workflow: &Workflow, evaluator: &Evaluator) -> Result<(), ConfigError> {
    // -----------------------------------------------------------------------
    // 1. Unique ids
    // -----------------------------------------------------------------------
    let mut statuses: HashSet<&str> = HashSet::new();
    for status in &workflow.statuses {
        if !statuses.insert(status.id.as_str()) {
            return Err(ConfigError::DuplicateStatusId(status.id.clone()));
        }
    }

    let mut items: HashSet<&str> = HashSet::new();
    for item in workflow.items() {
        if !items.insert(item.id.as_str()) {
            return Err(ConfigError::DuplicateItemId(item.id.clone()));
        }
    }

    let mut actions: HashSet<&str> = HashSet::new();
    for action in &workflow.global_actions {
        if !actions.insert(action.id.as_str()) {
            return Err(ConfigError::DuplicateGlobalActionId(action.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Initial status
    // -----------------------------------------------------------------------
    if !statuses.contains(workflow.initial_status.as_str()) {
        return Err(ConfigError::UnknownInitialStatus(
            workflow.initial_status.clone(),
        ));
    }

    // -----------------------------------------------------------------------
    // 3 + 5. Targets and expressions
    // -----------------------------------------------------------------------
    for item in workflow.items() {
        validate_item(item, &statuses, evaluator)?;
    }

    Ok(())
}

fn validate_item(
    item: &ActionItem,
    statuses: &HashSet<&str>,
    evaluator: &Evaluator,
) -> Result<(), ConfigError> {
    let check_target = |target: &str| {
        if target == PREVIOUS || statuses.contains(target) {
            Ok(())
        } else {
            Err(ConfigError::DanglingJump {
                item: item.id.clone(),
                target: target.to_string(),
            })
        }
    };
    let check_expression = |field: &'static str, source: &str| {
        evaluator
            .validate(source)
            .map(|_| ())
            .map_err(|error| ConfigError::InvalidExpression {
                item: item.id.clone(),
                field,
                error,
            })
    };
    let check_template = |field: &'static str, text: &str| {
        if !is_template(text) {
            return Ok(());
        }
        evaluator
            .compile_template(text)
            .map(|_| ())
            .map_err(|error| ConfigError::InvalidExpression {
                item: item.id.clone(),
                field,
                error,
            })
    };

    if let Some(condition) = &item.condition {
        check_expression("condition", condition)?;
    }

    match &item.kind {
        ActionKind::Jump(jump) => check_target(&jump.target),
        ActionKind::Choice(choice) => check_target(&choice.target),
        ActionKind::Editable(edit) => match &edit.target_status {
            Some(target) => check_target(target),
            None => Ok(()),
        },
        ActionKind::Dispatch(dispatch) => {
            if dispatch.variable.is_none() && dispatch.role_spec.is_none() {
                return Err(ConfigError::IncompleteDispatch(item.id.clone()));
            }
            if let Some(variable) = &dispatch.variable {
                check_expression("variable", variable)?;
            }
            if let Some(spec) = &dispatch.role_spec {
                check_template("role_spec", spec)?;
            }
            for rule in &dispatch.rules {
                check_template("rule role", &rule.role)?;
            }
            Ok(())
        }
        ActionKind::DisplayMessage(message) => check_template("template", &message.template),
        ActionKind::Notify(notify) => {
            check_template("recipients_template", &notify.recipients_template)?;
            check_template("body_template", &notify.body_template)
        }
        ActionKind::AddRole(change) | ActionKind::RemoveRole(change) => {
            check_template("role_spec", &change.role_spec)
        }
    }
}

/// Reject unknown `type` tags before deserialising, so the error names the
/// item instead of being a generic serde message.
fn check_action_tags(raw: &Value) -> Result<(), ConfigError> {
    let item_lists = raw
        .get("statuses")
        .and_then(Value::as_array)
        .into_iter()
        .chain(raw.get("global_actions").and_then(Value::as_array))
        .flatten()
        .filter_map(|container| container.get("items").and_then(Value::as_array));

    for item in item_lists.flatten() {
        let tag = item.get("type").and_then(Value::as_str).unwrap_or_default();
        if !ActionKind::TAGS.contains(&tag) {
            return Err(ConfigError::UnknownActionType {
                item: item
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string(),
                tag: tag.to_string(),
            });
        }
    }
    Ok(())
}
