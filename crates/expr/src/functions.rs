//! Host-registered function whitelist.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::value::{to_text, type_name};

/// Signature of a callable exposed to expressions. Errors are plain
/// messages; the evaluator wraps them in `ExpressionError::Evaluation`.
pub type HostFunction = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Functions callable from expressions. Anything not registered here is
/// rejected at validation time.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, HostFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `len`, `lower`, `upper`, `str` and `int`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("len", |args| {
            let [value] = args else {
                return Err("len() takes exactly one argument".into());
            };
            match value {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(map) => Ok(Value::from(map.len())),
                other => Err(format!("object of type {} has no len()", type_name(other))),
            }
        });
        registry.register("lower", |args| match args {
            [Value::String(s)] => Ok(Value::String(s.to_lowercase())),
            _ => Err("lower() takes one string argument".into()),
        });
        registry.register("upper", |args| match args {
            [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
            _ => Err("upper() takes one string argument".into()),
        });
        registry.register("str", |args| match args {
            [value] => Ok(Value::String(to_text(value))),
            _ => Err("str() takes exactly one argument".into()),
        });
        registry.register("int", |args| match args {
            [Value::Number(n)] => n
                .as_i64()
                .or_else(|| n.as_f64().map(|x| x.trunc() as i64))
                .map(Value::from)
                .ok_or_else(|| format!("invalid literal for int(): {n}")),
            [Value::String(s)] => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("invalid literal for int(): '{s}'")),
            [Value::Bool(b)] => Ok(Value::from(i64::from(*b))),
            _ => Err("int() takes one number or string argument".into()),
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&HostFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}
