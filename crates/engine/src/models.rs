//! Core domain models for the status engine.
//!
//! A [`Workflow`] is plain data: statuses holding ordered action items. It
//! is serialised as JSON, with action items internally tagged by `type`.
//! A [`Record`] is the per-instance state the engine mutates.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use providers::{Channel, RoleId, UserId};

use crate::markers::MarkerStack;

pub type StatusId = String;
pub type ItemId = String;
/// Key of a workflow function (`_receiver`, `_submitter`, ...).
pub type RoleKey = String;

/// Jump target that returns to the most recently marked status.
pub const PREVIOUS: &str = "_previous";

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub initial_status: StatusId,
    pub statuses: Vec<Status>,
    /// Workflow functions and their labels.
    #[serde(default)]
    pub roles: BTreeMap<RoleKey, String>,
    #[serde(default)]
    pub global_actions: Vec<GlobalAction>,
}

impl Workflow {
    pub fn status(&self, id: &str) -> Option<&Status> {
        self.statuses.iter().find(|s| s.id == id)
    }

    pub fn global_action(&self, id: &str) -> Option<&GlobalAction> {
        self.global_actions.iter().find(|a| a.id == id)
    }

    /// Every action item, status items first, then global action items.
    pub fn items(&self) -> impl Iterator<Item = &ActionItem> {
        self.statuses
            .iter()
            .flat_map(|s| s.items.iter())
            .chain(self.global_actions.iter().flat_map(|a| a.items.iter()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub name: String,
    #[serde(default)]
    pub items: Vec<ActionItem>,
    #[serde(default)]
    pub is_endpoint: bool,
}

impl Status {
    pub fn item(&self, id: &str) -> Option<&ActionItem> {
        self.items.iter().find(|i| i.id == id)
    }
}

// ---------------------------------------------------------------------------
// Action items
// ---------------------------------------------------------------------------

/// One configured action attached to a status or a global action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: ItemId,
    /// Gate; an absent condition always holds.
    #[serde(default)]
    pub condition: Option<String>,
    /// Free-form label copied into evolution entries.
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl ActionItem {
    /// Interactive items only fire on an explicit trigger naming them.
    pub fn is_interactive(&self) -> bool {
        matches!(self.kind, ActionKind::Choice(_) | ActionKind::Editable(_))
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.tag()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Jump(Jump),
    Choice(Choice),
    Dispatch(Dispatch),
    Editable(Editable),
    DisplayMessage(DisplayMessage),
    Notify(Notify),
    AddRole(RoleChange),
    RemoveRole(RoleChange),
}

impl ActionKind {
    /// Every accepted `type` tag.
    pub const TAGS: [&'static str; 8] = [
        "jump",
        "choice",
        "dispatch",
        "editable",
        "display_message",
        "notify",
        "add_role",
        "remove_role",
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            ActionKind::Jump(_) => "jump",
            ActionKind::Choice(_) => "choice",
            ActionKind::Dispatch(_) => "dispatch",
            ActionKind::Editable(_) => "editable",
            ActionKind::DisplayMessage(_) => "display_message",
            ActionKind::Notify(_) => "notify",
            ActionKind::AddRole(_) => "add_role",
            ActionKind::RemoveRole(_) => "remove_role",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jump {
    /// Status id or [`PREVIOUS`].
    pub target: StatusId,
    /// Push the current status before leaving so `_previous` can return.
    #[serde(default)]
    pub mark: bool,
    #[serde(default)]
    pub mode: JumpMode,
}

/// When an automatic jump fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JumpMode {
    /// As soon as the pass reaches it.
    #[default]
    Immediate,
    /// Only on an external trigger with this name.
    Trigger { name: String },
    /// In an automatic pass, once the record has been in the status that long.
    Timeout { seconds: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    /// Who may trigger it; empty means anyone.
    #[serde(default)]
    pub by: Vec<String>,
    /// Presentation only: the front-end asks for confirmation.
    #[serde(default)]
    pub require_confirmation: bool,
    #[serde(default)]
    pub confirmation_text: Option<String>,
    pub target: StatusId,
    #[serde(default)]
    pub mark: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    #[default]
    Set,
    Add,
    Remove,
}

/// Routes roles into a workflow function.
///
/// With `variable` set the dispatch is automatic: the expression is
/// computed and the first matching rule decides the role. Otherwise the
/// single `role_spec` is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispatch {
    pub role_key: RoleKey,
    #[serde(default)]
    pub mode: DispatchMode,
    #[serde(default)]
    pub role_spec: Option<String>,
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub rules: Vec<DispatchRule>,
}

impl Dispatch {
    pub fn is_automatic(&self) -> bool {
        self.variable.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRule {
    pub role: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Editable {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub by: Vec<String>,
    /// Status to move to after a successful edit.
    #[serde(default)]
    pub target_status: Option<StatusId>,
    #[serde(default)]
    pub scope: EditScope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditScope {
    #[default]
    Full,
    Fields(Vec<String>),
}

impl EditScope {
    pub fn allows(&self, field: &str) -> bool {
        match self {
            EditScope::Full => true,
            EditScope::Fields(fields) => fields.iter().any(|f| f == field),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayMessage {
    /// Viewers allowed to see it; empty means everyone.
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub level: Option<MessageLevel>,
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notify {
    pub channel: Channel,
    pub recipients_template: String,
    pub body_template: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleChangeMode {
    /// Apply locally, then sync the identity provider after commit.
    #[default]
    Propagate,
    LocalOnly,
}

/// Payload of `add_role` / `remove_role`; applies to the record's submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleChange {
    pub role_spec: String,
    #[serde(default)]
    pub mode: RoleChangeMode,
}

// ---------------------------------------------------------------------------
// Global actions
// ---------------------------------------------------------------------------

/// Items runnable outside the per-status flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalAction {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<GlobalTrigger>,
    #[serde(default)]
    pub items: Vec<ActionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GlobalTrigger {
    /// A person holding one of the roles.
    Manual {
        #[serde(default)]
        by: Vec<String>,
    },
    /// An external call naming the trigger.
    Webservice { name: String },
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// What started a pass or a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    Automatic,
    Interactive,
    Webservice,
    GlobalAction,
    Timeout,
}

/// One line of a record's history. Appended, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEntry {
    pub time: DateTime<Utc>,
    /// New status; `None` for entries that did not change it (edits).
    pub status: Option<StatusId>,
    pub actor: Option<UserId>,
    pub origin: TriggerOrigin,
    pub action_id: Option<ItemId>,
    pub identifier: Option<String>,
}

/// The instance a workflow drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub workflow_id: String,
    pub status: StatusId,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub submitter: Option<UserId>,
    #[serde(default)]
    pub marker_stack: MarkerStack,
    #[serde(default)]
    pub evolution: Vec<EvolutionEntry>,
    #[serde(default)]
    pub workflow_roles: BTreeMap<RoleKey, BTreeSet<RoleId>>,
    pub last_update: DateTime<Utc>,
}

impl Record {
    /// A fresh record in the workflow's initial status.
    pub fn new(workflow: &Workflow, data: Map<String, Value>, submitter: Option<UserId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow.id.clone(),
            status: workflow.initial_status.clone(),
            data,
            submitter,
            marker_stack: MarkerStack::default(),
            evolution: Vec::new(),
            workflow_roles: BTreeMap::new(),
            last_update: Utc::now(),
        }
    }

    pub fn roles_for(&self, key: &str) -> Vec<RoleId> {
        self.workflow_roles
            .get(key)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default()
    }
}
