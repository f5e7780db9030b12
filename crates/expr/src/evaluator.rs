//! `Evaluator`: validation, compiled-expression cache and evaluation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::ast::Expr;
use crate::error::{ExprResult, ExpressionError};
use crate::eval::{evaluate, Context};
use crate::functions::FunctionRegistry;
use crate::parser::Parser;
use crate::template::{self, Segment};
use crate::value::{is_truthy, to_text};

/// Default number of compiled sources kept per cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Variable catalogue
// ---------------------------------------------------------------------------

/// The set of variable names expressions may reference.
#[derive(Debug, Clone, Default)]
pub enum VariableCatalogue {
    /// Any name not starting with `_`.
    #[default]
    Open,
    /// Only the declared names; entries ending with `*` match by prefix.
    Declared {
        names: HashSet<String>,
        prefixes: Vec<String>,
    },
}

impl VariableCatalogue {
    pub fn declared<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = HashSet::new();
        let mut prefixes = Vec::new();
        for entry in entries {
            let entry = entry.into();
            match entry.strip_suffix('*') {
                Some(prefix) => prefixes.push(prefix.to_string()),
                None => {
                    names.insert(entry);
                }
            }
        }
        Self::Declared { names, prefixes }
    }

    pub fn admits(&self, name: &str) -> bool {
        if name.starts_with('_') {
            return false;
        }
        match self {
            Self::Open => true,
            Self::Declared { names, prefixes } => {
                names.contains(name) || prefixes.iter().any(|p| name.starts_with(p.as_str()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled artefacts
// ---------------------------------------------------------------------------

/// A validated expression: immutable tree plus its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    source: String,
    expr: Expr,
}

impl CompiledExpr {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &Expr {
        &self.expr
    }
}

#[derive(Debug, Clone)]
enum TemplatePart {
    Text(String),
    Expr(Arc<CompiledExpr>),
}

/// A validated template.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    source: String,
    parts: Vec<TemplatePart>,
}

impl CompiledTemplate {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The single placeholder of a template that is nothing else.
    fn sole_expression(&self) -> Option<&Arc<CompiledExpr>> {
        let mut found = None;
        for part in &self.parts {
            match part {
                TemplatePart::Text(text) if text.trim().is_empty() => {}
                TemplatePart::Expr(expr) if found.is_none() => found = Some(expr),
                _ => return None,
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

struct Cache<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
    capacity: usize,
}

impl<T> Cache<T> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, source: &str) -> Option<Arc<T>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
            .cloned()
    }

    fn insert(&self, source: &str, value: Arc<T>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(source.to_string(), value);
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Validates and evaluates expressions and templates.
///
/// Compiled results are cached by exact source text. The cache belongs to
/// the evaluator because validity depends on its catalogue and functions.
pub struct Evaluator {
    catalogue: VariableCatalogue,
    functions: FunctionRegistry,
    expressions: Cache<CompiledExpr>,
    templates: Cache<CompiledTemplate>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(VariableCatalogue::Open, FunctionRegistry::with_builtins())
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("catalogue", &self.catalogue)
            .field("functions", &self.functions)
            .field("cached_expressions", &self.expressions.len())
            .finish()
    }
}

impl Evaluator {
    pub fn new(catalogue: VariableCatalogue, functions: FunctionRegistry) -> Self {
        Self::with_cache_capacity(catalogue, functions, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(
        catalogue: VariableCatalogue,
        functions: FunctionRegistry,
        capacity: usize,
    ) -> Self {
        Self {
            catalogue,
            functions,
            expressions: Cache::new(capacity),
            templates: Cache::new(capacity),
        }
    }

    /// Parse and check an expression.
    ///
    /// # Errors
    /// Any validation variant of [`ExpressionError`].
    pub fn validate(&self, source: &str) -> ExprResult<Arc<CompiledExpr>> {
        if let Some(compiled) = self.expressions.get(source) {
            return Ok(compiled);
        }

        debug!(source, "compiling expression");
        let expr = Parser::parse(source)?;
        self.check_references(&expr)?;

        let compiled = Arc::new(CompiledExpr {
            source: source.to_string(),
            expr,
        });
        self.expressions.insert(source, compiled.clone());
        Ok(compiled)
    }

    fn check_references(&self, expr: &Expr) -> ExprResult<()> {
        let mut invalid_name = None;
        expr.walk_names(&mut |name| {
            if invalid_name.is_none() && !self.catalogue.admits(name) {
                invalid_name = Some(name.to_string());
            }
        });
        if let Some(name) = invalid_name {
            return Err(ExpressionError::InvalidVariable(name));
        }

        let mut unknown_function = None;
        expr.walk_calls(&mut |function| {
            if unknown_function.is_none() && !self.functions.contains(function) {
                unknown_function = Some(function.to_string());
            }
        });
        if let Some(function) = unknown_function {
            return Err(ExpressionError::UnknownFunction(function));
        }

        Ok(())
    }

    /// Evaluate a compiled expression.
    pub fn evaluate(&self, compiled: &CompiledExpr, ctx: &dyn Context) -> ExprResult<Value> {
        evaluate(&compiled.expr, ctx, &self.functions)
    }

    /// Validate (through the cache) then evaluate.
    pub fn evaluate_source(&self, source: &str, ctx: &dyn Context) -> ExprResult<Value> {
        let compiled = self.validate(source)?;
        self.evaluate(&compiled, ctx)
    }

    /// Evaluate a condition to a boolean.
    ///
    /// With `on_raise` set, any failure is logged and the default returned.
    pub fn evaluate_condition(
        &self,
        source: &str,
        ctx: &dyn Context,
        on_raise: Option<bool>,
    ) -> ExprResult<bool> {
        match self.evaluate_source(source, ctx) {
            Ok(value) => Ok(is_truthy(&value)),
            Err(error) => match on_raise {
                Some(default) => {
                    warn!(source, %error, default, "condition failed, using default");
                    Ok(default)
                }
                None => Err(error),
            },
        }
    }

    /// Evaluate a condition, downgrading any failure to `default`.
    ///
    /// `on_error` receives the failure so the caller can record it.
    pub fn condition_or(
        &self,
        source: &str,
        ctx: &dyn Context,
        default: bool,
        on_error: impl FnOnce(&ExpressionError),
    ) -> bool {
        match self.evaluate_condition(source, ctx, None) {
            Ok(result) => result,
            Err(error) => {
                on_error(&error);
                default
            }
        }
    }

    // -----------------------------------------------------------------------
    // Template mode
    // -----------------------------------------------------------------------

    /// Validate every placeholder of a template.
    pub fn compile_template(&self, template: &str) -> ExprResult<Arc<CompiledTemplate>> {
        if let Some(compiled) = self.templates.get(template) {
            return Ok(compiled);
        }

        let parts = template::split(template)?
            .into_iter()
            .map(|segment| match segment {
                Segment::Text(text) => Ok(TemplatePart::Text(text)),
                Segment::Placeholder { source, column } => self
                    .validate(&source)
                    .map(TemplatePart::Expr)
                    .map_err(|e| shift_column(e, column)),
            })
            .collect::<ExprResult<Vec<_>>>()?;

        let compiled = Arc::new(CompiledTemplate {
            source: template.to_string(),
            parts,
        });
        self.templates.insert(template, compiled.clone());
        Ok(compiled)
    }

    /// Render a template. A lone placeholder yields its raw value; plain
    /// text without markers is returned as a string.
    pub fn render(&self, template: &str, ctx: &dyn Context) -> ExprResult<Value> {
        if !template::is_template(template) {
            return Ok(Value::String(template.to_string()));
        }
        let compiled = self.compile_template(template)?;
        self.render_compiled(&compiled, ctx)
    }

    pub fn render_compiled(
        &self,
        compiled: &CompiledTemplate,
        ctx: &dyn Context,
    ) -> ExprResult<Value> {
        if let Some(expr) = compiled.sole_expression() {
            return self.evaluate(expr, ctx);
        }

        let mut output = String::new();
        for part in &compiled.parts {
            match part {
                TemplatePart::Text(text) => output.push_str(text),
                TemplatePart::Expr(expr) => output.push_str(&to_text(&self.evaluate(expr, ctx)?)),
            }
        }
        Ok(Value::String(output))
    }

    /// Render a template to text.
    pub fn render_text(&self, template: &str, ctx: &dyn Context) -> ExprResult<String> {
        self.render(template, ctx).map(|value| to_text(&value))
    }
}

fn shift_column(error: ExpressionError, offset: usize) -> ExpressionError {
    match error {
        ExpressionError::Parse { column, message } => ExpressionError::Parse {
            column: column + offset,
            message,
        },
        ExpressionError::Forbidden { construct, column } => ExpressionError::Forbidden {
            construct,
            column: column + offset,
        },
        ExpressionError::NonConstantSubscript { column } => ExpressionError::NonConstantSubscript {
            column: column + offset,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn ctx() -> Map<String, Value> {
        json!({"a": 1, "groups": ["Test"], "name": "Ada", "roles": ["R1", "R2"]})
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn validation_rejects_the_documented_cases() {
        let evaluator = Evaluator::default();
        assert!(matches!(
            evaluator.validate("a + b"),
            Err(ExpressionError::Forbidden { .. })
        ));
        let err = evaluator.validate("a[1:2]").expect_err("slice must be rejected");
        assert!(err.to_string().contains("must be a constant"));
        assert_eq!(
            evaluator.validate("_b"),
            Err(ExpressionError::InvalidVariable("_b".into()))
        );
        assert!(evaluator.validate("func(a[0], b(c), 1, 'x')").is_err());
    }

    #[test]
    fn declared_catalogue_limits_names() {
        let evaluator = Evaluator::new(
            VariableCatalogue::declared(["a", "form_var_*"]),
            FunctionRegistry::new(),
        );
        assert!(evaluator.validate("a == form_var_amount").is_ok());
        assert_eq!(
            evaluator.validate("b"),
            Err(ExpressionError::InvalidVariable("b".into()))
        );
    }

    #[test]
    fn functions_must_be_registered() {
        let evaluator = Evaluator::new(VariableCatalogue::Open, FunctionRegistry::new());
        assert_eq!(
            evaluator.validate("len(a)"),
            Err(ExpressionError::UnknownFunction("len".into()))
        );

        let mut functions = FunctionRegistry::new();
        functions.register("double", |args| match args {
            [Value::Number(n)] => Ok(json!(n.as_i64().unwrap_or(0) * 2)),
            _ => Err("expects a number".into()),
        });
        let evaluator = Evaluator::new(VariableCatalogue::Open, functions);
        assert_eq!(evaluator.evaluate_source("double(a)", &ctx()), Ok(json!(2)));
    }

    #[test]
    fn compiled_expressions_are_cached_by_source() {
        let evaluator = Evaluator::default();
        let first = evaluator.validate("a == 1").expect("valid");
        let second = evaluator.validate("a == 1").expect("valid");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.source(), "a == 1");
    }

    #[test]
    fn cache_is_bounded() {
        let evaluator = Evaluator::with_cache_capacity(
            VariableCatalogue::Open,
            FunctionRegistry::new(),
            2,
        );
        evaluator.validate("a").expect("valid");
        evaluator.validate("b").expect("valid");
        evaluator.validate("c").expect("valid");
        assert!(evaluator.expressions.len() <= 2);
    }

    #[test]
    fn condition_or_downgrades_failures() {
        let evaluator = Evaluator::default();
        let mut seen = None;
        let result = evaluator.condition_or("missing == 1", &ctx(), false, |e| {
            seen = Some(e.clone())
        });
        assert!(!result);
        assert_eq!(
            seen,
            Some(ExpressionError::UndefinedVariable("missing".into()))
        );
    }

    #[test]
    fn on_raise_returns_the_default() {
        let evaluator = Evaluator::default();
        assert_eq!(
            evaluator.evaluate_condition("missing", &ctx(), Some(true)),
            Ok(true)
        );
        assert!(evaluator.evaluate_condition("missing", &ctx(), None).is_err());
        assert_eq!(
            evaluator.evaluate_condition("'Test' in groups", &ctx(), None),
            Ok(true)
        );
    }

    #[test]
    fn lone_placeholder_keeps_raw_value() {
        let evaluator = Evaluator::default();
        assert_eq!(
            evaluator.render("{{ roles }}", &ctx()),
            Ok(json!(["R1", "R2"]))
        );
        assert_eq!(
            evaluator.render_text("Hello {{ name }} ({{ a }})", &ctx()),
            Ok("Hello Ada (1)".to_string())
        );
        assert_eq!(
            evaluator.render("no markers", &ctx()),
            Ok(json!("no markers"))
        );
    }

    #[test]
    fn template_placeholders_are_validated() {
        let evaluator = Evaluator::default();
        assert!(matches!(
            evaluator.compile_template("x {{ a.b }}"),
            Err(ExpressionError::Forbidden { .. })
        ));
    }
}
