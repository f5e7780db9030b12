//! Tree-walking evaluation against a read-only context.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::ast::{Arg, CmpOp, Expr};
use crate::error::{ExprResult, ExpressionError};
use crate::functions::FunctionRegistry;
use crate::value::{compare, contains, is_identical, is_truthy, subscript, type_name, values_equal};

/// Read-only variable namespace an expression is evaluated against.
pub trait Context {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl Context for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Context for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Context for Map<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

pub(crate) fn evaluate(
    expr: &Expr,
    ctx: &dyn Context,
    functions: &FunctionRegistry,
) -> ExprResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Name { name, .. } => ctx
            .lookup(name)
            .cloned()
            .ok_or_else(|| ExpressionError::UndefinedVariable(name.clone())),

        Expr::Subscript { target, key } => {
            let target = evaluate(target, ctx, functions)?;
            subscript(&target, key)
        }

        Expr::Call { function, args, .. } => {
            let callable = functions
                .get(function)
                .ok_or_else(|| ExpressionError::UnknownFunction(function.clone()))?;
            let values = args
                .iter()
                .map(|arg| match arg {
                    Arg::Literal(value) => Ok(value.clone()),
                    Arg::Name(name) => ctx
                        .lookup(name)
                        .cloned()
                        .ok_or_else(|| ExpressionError::UndefinedVariable(name.clone())),
                })
                .collect::<ExprResult<Vec<_>>>()?;
            callable(&values)
                .map_err(|message| ExpressionError::Evaluation(format!("{function}(): {message}")))
        }

        Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&evaluate(inner, ctx, functions)?))),

        Expr::Negate(inner) => match evaluate(inner, ctx, functions)? {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    // `-i64::MIN` does not fit in an i64.
                    Ok(i.checked_neg().map_or_else(|| Value::from(-(i as f64)), Value::from))
                } else {
                    Ok(Value::from(-n.as_f64().unwrap_or(0.0)))
                }
            }
            Value::Bool(b) => Ok(Value::from(-i64::from(b))),
            other => Err(ExpressionError::Evaluation(format!(
                "bad operand type for unary -: '{}'",
                type_name(&other)
            ))),
        },

        Expr::Positive(inner) => match evaluate(inner, ctx, functions)? {
            value @ Value::Number(_) => Ok(value),
            Value::Bool(b) => Ok(Value::from(i64::from(b))),
            other => Err(ExpressionError::Evaluation(format!(
                "bad operand type for unary +: '{}'",
                type_name(&other)
            ))),
        },

        // `and` / `or` short-circuit and yield the deciding operand.
        Expr::And(items) => {
            let mut last = Value::Bool(true);
            for item in items {
                last = evaluate(item, ctx, functions)?;
                if !is_truthy(&last) {
                    break;
                }
            }
            Ok(last)
        }
        Expr::Or(items) => {
            let mut last = Value::Bool(false);
            for item in items {
                last = evaluate(item, ctx, functions)?;
                if is_truthy(&last) {
                    break;
                }
            }
            Ok(last)
        }

        Expr::Compare { first, rest } => {
            let mut left = evaluate(first, ctx, functions)?;
            for (op, operand) in rest {
                let right = evaluate(operand, ctx, functions)?;
                if !apply_comparison(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }

        Expr::IfElse {
            condition,
            then,
            otherwise,
        } => {
            if is_truthy(&evaluate(condition, ctx, functions)?) {
                evaluate(then, ctx, functions)
            } else {
                evaluate(otherwise, ctx, functions)
            }
        }
    }
}

fn apply_comparison(op: CmpOp, left: &Value, right: &Value) -> ExprResult<bool> {
    Ok(match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::NotEq => !values_equal(left, right),
        CmpOp::Lt => compare(left, right)? == Ordering::Less,
        CmpOp::LtE => compare(left, right)? != Ordering::Greater,
        CmpOp::Gt => compare(left, right)? == Ordering::Greater,
        CmpOp::GtE => compare(left, right)? != Ordering::Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => is_identical(left, right),
        CmpOp::IsNot => !is_identical(left, right),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use serde_json::json;

    fn eval(source: &str, ctx: &Map<String, Value>) -> ExprResult<Value> {
        let expr = Parser::parse(source).expect("valid expression");
        evaluate(&expr, ctx, &FunctionRegistry::with_builtins())
    }

    fn ctx() -> Map<String, Value> {
        json!({
            "a": 1,
            "b": "foo",
            "groups": ["Test", "Other"],
            "form": {"amount": 12.5, "tags": ["x"]},
            "empty": "",
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    #[test]
    fn comparisons_and_boolean_operators() {
        let ctx = ctx();
        assert_eq!(eval("a == 1 and b == 'foo'", &ctx), Ok(json!(true)));
        assert_eq!(eval("a > 1 or 'Test' in groups", &ctx), Ok(json!(true)));
        assert_eq!(eval("not groups", &ctx), Ok(json!(false)));
        assert_eq!(eval("0 < a <= 1", &ctx), Ok(json!(true)));
        assert_eq!(eval("'x' not in form['tags']", &ctx), Ok(json!(false)));
    }

    #[test]
    fn and_or_return_deciding_operand() {
        let ctx = ctx();
        assert_eq!(eval("empty or b", &ctx), Ok(json!("foo")));
        assert_eq!(eval("a and empty", &ctx), Ok(json!("")));
    }

    #[test]
    fn short_circuit_skips_undefined_names() {
        let ctx = ctx();
        assert_eq!(eval("a == 2 and missing", &ctx), Ok(json!(false)));
    }

    #[test]
    fn undefined_variable_is_reported() {
        assert_eq!(
            eval("missing == 1", &ctx()),
            Err(ExpressionError::UndefinedVariable("missing".into()))
        );
    }

    #[test]
    fn subscripts_and_calls() {
        let ctx = ctx();
        assert_eq!(eval("form['amount'] > 10", &ctx), Ok(json!(true)));
        assert_eq!(eval("groups[0]", &ctx), Ok(json!("Test")));
        assert_eq!(eval("len(groups)", &ctx), Ok(json!(2)));
        assert_eq!(eval("upper(b) == 'FOO'", &ctx), Ok(json!(true)));
        assert!(matches!(
            eval("groups[5]", &ctx),
            Err(ExpressionError::Evaluation(_))
        ));
    }

    #[test]
    fn conditional_expression_and_negation() {
        let ctx = ctx();
        assert_eq!(eval("'yes' if a else 'no'", &ctx), Ok(json!("yes")));
        assert_eq!(eval("-a", &ctx), Ok(json!(-1)));
        assert!(eval("-b", &ctx).is_err());
    }

    #[test]
    fn negating_the_smallest_integer_widens_to_float() {
        let ctx = json!({"a": i64::MIN}).as_object().cloned().unwrap_or_default();
        assert_eq!(eval("-a", &ctx), Ok(json!(-(i64::MIN as f64))));
        assert_eq!(eval("-a > 0", &ctx), Ok(json!(true)));
    }

    #[test]
    fn is_compares_without_coercion() {
        let ctx = ctx();
        assert_eq!(eval("a is not None", &ctx), Ok(json!(true)));
        assert_eq!(eval("None is None", &ctx), Ok(json!(true)));
    }
}
