//! # expr
//!
//! A small, side-effect-free condition language used by workflow
//! definitions: conditions on action items, computed dispatch values and
//! `{{ ... }}` templates in role names, messages and recipients.
//!
//! Only names, literals, boolean operators, comparisons, conditional
//! expressions, constant subscripts and whitelisted calls are accepted.
//! Everything else is rejected by [`Evaluator::validate`] before a definition
//! can be stored.

pub mod ast;
pub mod error;
pub mod eval;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod template;
pub mod value;

pub use error::{ExprResult, ExpressionError};
pub use eval::Context;
pub use evaluator::{CompiledExpr, CompiledTemplate, Evaluator, VariableCatalogue};
pub use functions::{FunctionRegistry, HostFunction};
pub use template::is_template;
pub use value::{is_truthy, to_text};
