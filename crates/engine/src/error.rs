//! Engine-level error types.

use thiserror::Error;

use expr::ExpressionError;

/// Errors raised while loading a workflow definition.
///
/// Every variant is fatal to loading; a workflow that fails validation is
/// never executed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two statuses share the same id.
    #[error("duplicate status id: '{0}'")]
    DuplicateStatusId(String),

    /// Two action items share the same id within the workflow.
    #[error("duplicate action item id: '{0}'")]
    DuplicateItemId(String),

    /// Two global actions share the same id.
    #[error("duplicate global action id: '{0}'")]
    DuplicateGlobalActionId(String),

    #[error("initial status '{0}' is not declared")]
    UnknownInitialStatus(String),

    /// A jump, choice or editable item targets a status that does not exist.
    #[error("item '{item}' targets unknown status '{target}'")]
    DanglingJump { item: String, target: String },

    /// A dispatch item with neither a `variable` to match rules against nor
    /// a `role_spec` to assign.
    #[error("dispatch item '{0}' needs a variable or a role_spec")]
    IncompleteDispatch(String),

    /// An item's `type` tag is not a known action kind.
    #[error("item '{item}' has unknown action type '{tag}'")]
    UnknownActionType { item: String, tag: String },

    /// A condition, template or computed value does not validate.
    #[error("item '{item}' has an invalid {field}: {error}")]
    InvalidExpression {
        item: String,
        field: &'static str,
        #[source]
        error: ExpressionError,
    },

    /// The definition is not valid JSON or misses required fields.
    #[error("malformed workflow definition: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors returned by the engine's inbound operations.
///
/// Only interactive triggers can fail this way; recoverable runtime
/// failures go to the failure recorder instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// The record sits in a status the workflow no longer declares.
    #[error("record is in unknown status '{0}'")]
    UnknownStatus(String),

    #[error("record belongs to workflow '{found}', not '{expected}'")]
    WorkflowMismatch { expected: String, found: String },

    #[error("no action item '{0}' in the current status")]
    UnknownItem(String),

    #[error("action item '{0}' cannot be triggered")]
    NotInteractive(String),

    /// The item's condition does not hold for this record.
    #[error("action item '{0}' is not available")]
    Unavailable(String),

    #[error("not authorised to trigger '{0}'")]
    NotAuthorised(String),

    /// A submitted field falls outside the editable scope.
    #[error("field '{0}' is not editable")]
    FieldNotEditable(String),

    #[error("no trigger named '{0}' is available")]
    NoMatchingTrigger(String),

    #[error("unknown global action '{0}'")]
    UnknownGlobalAction(String),
}

impl EngineError {
    /// Whether the error should be shown to the person who triggered it.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            Self::UnknownStatus(_) | Self::WorkflowMismatch { .. }
        )
    }
}
