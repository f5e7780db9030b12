//! Expression-level error type.

use thiserror::Error;

/// Errors produced while validating or evaluating an expression.
///
/// The first group is raised by [`crate::Evaluator::validate`] and is fatal
/// to saving the expression; the second group only appears at evaluation
/// time and is recoverable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    // ------ Validation errors ------

    /// The source does not follow the grammar.
    #[error("could not parse expression at column {column}: {message}")]
    Parse { column: usize, message: String },

    /// A construct outside the expression language (arithmetic, attribute
    /// access, assignment, literal collections, definitions, ...).
    #[error("expression \"{construct}\" is forbidden (column {column})")]
    Forbidden { construct: String, column: usize },

    /// Subscripts must be literal numbers or strings; slices never are.
    #[error("subscript index must be a constant (column {column})")]
    NonConstantSubscript { column: usize },

    /// The identifier starts with `_` or is not part of the catalogue.
    #[error("invalid variable name: '{0}'")]
    InvalidVariable(String),

    /// A call whose callee is not a plain name or whose arguments are not
    /// plain names or literals.
    #[error("call is invalid: '{0}'")]
    InvalidCall(String),

    /// The called function is not registered by the host.
    #[error("unknown function: '{0}'")]
    UnknownFunction(String),

    // ------ Evaluation errors ------

    /// The variable passed validation but is absent from the context.
    #[error("variable is not defined: '{0}'")]
    UndefinedVariable(String),

    /// Type mismatch, missing key, failing function, ...
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

impl ExpressionError {
    /// `true` for errors detected when saving an expression.
    pub fn is_validation_error(&self) -> bool {
        !matches!(self, Self::UndefinedVariable(_) | Self::Evaluation(_))
    }
}

pub type ExprResult<T> = Result<T, ExpressionError>;
