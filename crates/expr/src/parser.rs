//! Parser: recursive descent over the token stream.
//!
//! The grammar only has productions for allowed constructs. Tokens that
//! would start a disallowed construct are reported as
//! [`ExpressionError::Forbidden`] with the offending source text.

use serde_json::{Number, Value};

use crate::ast::{Arg, CmpOp, Expr};
use crate::error::{ExprResult, ExpressionError};
use crate::lexer::{Lexer, Token, TokenKind};

/// Nesting limit for parentheses and unary chains.
const MAX_DEPTH: usize = 64;

pub struct Parser {
    source: Vec<char>,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Parse expression source into a syntax tree.
    pub fn parse(source: &str) -> ExprResult<Expr> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = Self {
            source: source.chars().collect(),
            tokens,
            pos: 0,
            depth: 0,
        };

        if parser.check(&TokenKind::Eof) {
            return Err(ExpressionError::Parse {
                column: 0,
                message: "empty expression".into(),
            });
        }

        let expr = parser.parse_expr()?;
        if !parser.check(&TokenKind::Eof) {
            return Err(parser.unexpected());
        }
        Ok(expr)
    }

    fn parse_expr(&mut self) -> ExprResult<Expr> {
        self.enter()?;
        let start = self.column();
        let value = self.parse_or()?;

        let result = if self.check(&TokenKind::If) {
            self.advance();
            let condition = self.parse_or()?;
            if !self.check(&TokenKind::Else) {
                return Err(ExpressionError::Parse {
                    column: self.column(),
                    message: "expected 'else' in conditional expression".into(),
                });
            }
            self.advance();
            let otherwise = self.parse_expr()?;
            Expr::IfElse {
                condition: Box::new(condition),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            }
        } else {
            value
        };

        if matches!(self.peek(), TokenKind::Op(op) if op == "=" || op == ":=") {
            return Err(self.forbidden_from(start));
        }

        self.depth -= 1;
        Ok(result)
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let first = self.parse_and()?;
        if !self.check(&TokenKind::Or) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.check(&TokenKind::Or) {
            self.advance();
            items.push(self.parse_and()?);
        }
        Ok(Expr::Or(items))
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let first = self.parse_not()?;
        if !self.check(&TokenKind::And) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.check(&TokenKind::And) {
            self.advance();
            items.push(self.parse_not()?);
        }
        Ok(Expr::And(items))
    }

    fn parse_not(&mut self) -> ExprResult<Expr> {
        if self.check(&TokenKind::Not) {
            self.enter()?;
            self.advance();
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ExprResult<Expr> {
        let first = self.parse_unary()?;
        let mut rest = Vec::new();

        loop {
            let op = match self.peek() {
                TokenKind::EqEq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::NotEq,
                TokenKind::Lt => CmpOp::Lt,
                TokenKind::LtE => CmpOp::LtE,
                TokenKind::Gt => CmpOp::Gt,
                TokenKind::GtE => CmpOp::GtE,
                TokenKind::In => CmpOp::In,
                TokenKind::Not if self.peek_at(1) == &TokenKind::In => {
                    self.advance();
                    CmpOp::NotIn
                }
                TokenKind::Is if self.peek_at(1) == &TokenKind::Not => {
                    self.advance();
                    CmpOp::IsNot
                }
                TokenKind::Is => CmpOp::Is,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_unary()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        let start = self.column();
        let expr = match self.peek() {
            TokenKind::Minus | TokenKind::Plus => {
                self.enter()?;
                let negate = self.check(&TokenKind::Minus);
                self.advance();
                let inner = Box::new(self.parse_unary()?);
                self.depth -= 1;
                if negate {
                    Expr::Negate(inner)
                } else {
                    Expr::Positive(inner)
                }
            }
            _ => self.parse_postfix()?,
        };

        // Binary arithmetic is not part of the language.
        if matches!(self.peek(), TokenKind::Plus | TokenKind::Minus)
            || matches!(self.peek(), TokenKind::Op(op) if op != "=" && op != ":=")
        {
            return Err(self.forbidden_from(start));
        }

        Ok(expr)
    }

    fn parse_postfix(&mut self) -> ExprResult<Expr> {
        let start = self.column();
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek() {
                TokenKind::LBracket => {
                    let column = self.column();
                    self.advance();
                    let key = match (self.peek().clone(), self.peek_at(1)) {
                        (kind, TokenKind::RBracket) => match literal_value(&kind) {
                            Some(value) => value,
                            None => return Err(ExpressionError::NonConstantSubscript { column }),
                        },
                        _ => return Err(ExpressionError::NonConstantSubscript { column }),
                    };
                    self.advance(); // key
                    self.advance(); // ]
                    expr = Expr::Subscript {
                        target: Box::new(expr),
                        key,
                    };
                }
                TokenKind::LParen => {
                    // only `name(...)` is callable, handled in parse_primary
                    return Err(ExpressionError::InvalidCall(self.text_from(start)));
                }
                TokenKind::Op(op) if op == "." => {
                    return Err(self.forbidden_from(start));
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let token = self.tokens[self.pos].clone();

        if let Some(value) = literal_value(&token.kind) {
            self.advance();
            return Ok(Expr::Literal(value));
        }

        match token.kind {
            TokenKind::Name(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    return self.parse_call(name, token.column);
                }
                Ok(Expr::Name {
                    name,
                    column: token.column,
                })
            }
            TokenKind::LParen => {
                self.enter()?;
                self.advance();
                let inner = self.parse_expr()?;
                if self.check(&TokenKind::Comma) {
                    // tuple literal
                    return Err(self.forbidden_from(token.column));
                }
                if !self.check(&TokenKind::RParen) {
                    return Err(self.unexpected());
                }
                self.advance();
                self.depth -= 1;
                Ok(inner)
            }
            TokenKind::LBracket | TokenKind::Reserved(_) | TokenKind::Op(_) => {
                Err(self.forbidden_from(token.column))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_call(&mut self, function: String, column: usize) -> ExprResult<Expr> {
        self.advance(); // (
        let mut args = Vec::new();

        if self.check(&TokenKind::RParen) {
            self.advance();
            return Ok(Expr::Call {
                function,
                args,
                column,
            });
        }

        loop {
            let arg_token = self.peek().clone();
            let closes = matches!(self.peek_at(1), TokenKind::Comma | TokenKind::RParen);
            let arg = match (&arg_token, closes) {
                (TokenKind::Name(name), true) => Arg::Name(name.clone()),
                (kind, true) if literal_value(kind).is_some() => {
                    Arg::Literal(literal_value(kind).unwrap_or(Value::Null))
                }
                _ => return Err(ExpressionError::InvalidCall(self.text_from(column))),
            };
            args.push(arg);
            self.advance();

            if self.check(&TokenKind::Comma) {
                self.advance();
                continue;
            }
            self.advance(); // )
            break;
        }

        Ok(Expr::Call {
            function,
            args,
            column,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn enter(&mut self) -> ExprResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::Parse {
                column: self.column(),
                message: "expression is nested too deeply".into(),
            });
        }
        Ok(())
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)].kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn column(&self) -> usize {
        self.tokens[self.pos].column
    }

    fn text_from(&self, column: usize) -> String {
        self.source[column.min(self.source.len())..]
            .iter()
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn forbidden_from(&self, column: usize) -> ExpressionError {
        ExpressionError::Forbidden {
            construct: self.text_from(column),
            column,
        }
    }

    fn unexpected(&self) -> ExpressionError {
        let token = &self.tokens[self.pos];
        match &token.kind {
            TokenKind::Op(_) | TokenKind::Reserved(_) => self.forbidden_from(token.column),
            TokenKind::Eof => ExpressionError::Parse {
                column: token.column,
                message: "unexpected end of input".into(),
            },
            other => ExpressionError::Parse {
                column: token.column,
                message: format!("unexpected token '{other}'"),
            },
        }
    }
}

fn literal_value(kind: &TokenKind) -> Option<Value> {
    match kind {
        TokenKind::Int(i) => Some(Value::from(*i)),
        TokenKind::Float(x) => Number::from_f64(*x).map(Value::Number),
        TokenKind::Str(s) => Some(Value::String(s.clone())),
        TokenKind::True => Some(Value::Bool(true)),
        TokenKind::False => Some(Value::Bool(false)),
        TokenKind::None => Some(Value::Null),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_boolean_structure() {
        let expr = Parser::parse("a == 1 and not b or c").expect("valid");
        assert!(matches!(expr, Expr::Or(ref items) if items.len() == 2));
    }

    #[test]
    fn parses_conditional_expression() {
        let expr = Parser::parse("'x' if a else 'y'").expect("valid");
        assert!(matches!(expr, Expr::IfElse { .. }));
    }

    #[test]
    fn parses_not_in_and_is_not() {
        let expr = Parser::parse("a not in b").expect("valid");
        assert!(matches!(expr, Expr::Compare { ref rest, .. } if rest[0].0 == CmpOp::NotIn));
        let expr = Parser::parse("a is not None").expect("valid");
        assert!(matches!(expr, Expr::Compare { ref rest, .. } if rest[0].0 == CmpOp::IsNot));
    }

    #[test]
    fn constant_subscript_is_accepted() {
        let expr = Parser::parse("a['key'][0]").expect("valid");
        match expr {
            Expr::Subscript { key, target } => {
                assert_eq!(key, json!(0));
                assert!(matches!(*target, Expr::Subscript { .. }));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn binary_arithmetic_is_forbidden() {
        assert_eq!(
            Parser::parse("a + b"),
            Err(ExpressionError::Forbidden {
                construct: "a + b".into(),
                column: 0
            })
        );
        assert!(matches!(
            Parser::parse("'aaa' * 99999999"),
            Err(ExpressionError::Forbidden { .. })
        ));
    }

    #[test]
    fn slices_and_variable_subscripts_must_be_constant() {
        assert_eq!(
            Parser::parse("a[1:2]"),
            Err(ExpressionError::NonConstantSubscript { column: 1 })
        );
        assert!(matches!(
            Parser::parse("a[b]"),
            Err(ExpressionError::NonConstantSubscript { .. })
        ));
        assert!(matches!(
            Parser::parse("a[:]"),
            Err(ExpressionError::NonConstantSubscript { .. })
        ));
    }

    #[test]
    fn attribute_access_and_assignment_are_forbidden() {
        assert!(matches!(
            Parser::parse("a.__class__"),
            Err(ExpressionError::Forbidden { .. })
        ));
        assert!(matches!(
            Parser::parse("a = 1"),
            Err(ExpressionError::Forbidden { .. })
        ));
        assert!(matches!(
            Parser::parse("lambda: 1"),
            Err(ExpressionError::Forbidden { .. })
        ));
        assert!(matches!(
            Parser::parse("[1, 2]"),
            Err(ExpressionError::Forbidden { .. })
        ));
        assert!(matches!(
            Parser::parse("(1, 2)"),
            Err(ExpressionError::Forbidden { .. })
        ));
    }

    #[test]
    fn nested_calls_in_arguments_are_rejected() {
        assert!(matches!(
            Parser::parse("func(a[0], b(c), 1, 'x')"),
            Err(ExpressionError::InvalidCall(_))
        ));
        assert!(matches!(
            Parser::parse("func(b(c))"),
            Err(ExpressionError::InvalidCall(_))
        ));
        assert!(matches!(
            Parser::parse("func(x=1)"),
            Err(ExpressionError::InvalidCall(_))
        ));
    }

    #[test]
    fn simple_calls_are_accepted() {
        let expr = Parser::parse("func(a, 1, 'x', None)").expect("valid");
        assert_eq!(
            expr,
            Expr::Call {
                function: "func".into(),
                args: vec![
                    Arg::Name("a".into()),
                    Arg::Literal(json!(1)),
                    Arg::Literal(json!("x")),
                    Arg::Literal(Value::Null),
                ],
                column: 0,
            }
        );
    }

    #[test]
    fn deep_nesting_is_refused() {
        let source = format!("{}a{}", "(".repeat(200), ")".repeat(200));
        assert!(matches!(
            Parser::parse(&source),
            Err(ExpressionError::Parse { .. })
        ));
    }

    #[test]
    fn empty_and_dangling_inputs_are_parse_errors() {
        assert!(matches!(Parser::parse("  "), Err(ExpressionError::Parse { .. })));
        assert!(matches!(Parser::parse("a and"), Err(ExpressionError::Parse { .. })));
        assert!(matches!(Parser::parse("a b"), Err(ExpressionError::Parse { .. })));
    }
}
