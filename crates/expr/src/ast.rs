//! Syntax tree of the expression language.
//!
//! The tree can only represent what the grammar permits: there is no node
//! for arithmetic, attribute access, assignment or literal collections.

use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name {
        name: String,
        column: usize,
    },
    /// `target[key]` with a literal key.
    Subscript {
        target: Box<Expr>,
        key: Value,
    },
    Call {
        function: String,
        args: Vec<Arg>,
        column: usize,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    /// Unary plus; kept so the evaluator can reject non-numbers.
    Positive(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// `first op1 second op2 third ...`, evaluated pairwise.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    IfElse {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// Call arguments are restricted to plain names and literals.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Name(String),
    Literal(Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl Expr {
    /// Visit every variable name referenced by the expression.
    pub fn walk_names<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match self {
            Expr::Literal(_) => {}
            Expr::Name { name, .. } => visit(name),
            Expr::Subscript { target, .. } => target.walk_names(visit),
            Expr::Call { args, .. } => {
                for arg in args {
                    if let Arg::Name(name) = arg {
                        visit(name);
                    }
                }
            }
            Expr::Not(inner) | Expr::Negate(inner) | Expr::Positive(inner) => {
                inner.walk_names(visit)
            }
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.walk_names(visit);
                }
            }
            Expr::Compare { first, rest } => {
                first.walk_names(visit);
                for (_, operand) in rest {
                    operand.walk_names(visit);
                }
            }
            Expr::IfElse {
                condition,
                then,
                otherwise,
            } => {
                condition.walk_names(visit);
                then.walk_names(visit);
                otherwise.walk_names(visit);
            }
        }
    }

    /// Visit every function name called by the expression.
    pub fn walk_calls<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match self {
            Expr::Literal(_) | Expr::Name { .. } => {}
            Expr::Subscript { target, .. } => target.walk_calls(visit),
            Expr::Call { function, .. } => visit(function),
            Expr::Not(inner) | Expr::Negate(inner) | Expr::Positive(inner) => {
                inner.walk_calls(visit)
            }
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.walk_calls(visit);
                }
            }
            Expr::Compare { first, rest } => {
                first.walk_calls(visit);
                for (_, operand) in rest {
                    operand.walk_calls(visit);
                }
            }
            Expr::IfElse {
                condition,
                then,
                otherwise,
            } => {
                condition.walk_calls(visit);
                then.walk_calls(visit);
                otherwise.walk_calls(visit);
            }
        }
    }
}
