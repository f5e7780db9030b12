//! Lexer: turns expression source into tokens.
//!
//! Every character sequence that could appear in a general-purpose language
//! is tokenized, including the operators the grammar refuses. That lets the
//! parser report "forbidden" instead of a generic syntax error.

use crate::error::{ExprResult, ExpressionError};

/// A token with its column (0-based char offset) in the source.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub column: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),

    // Keywords
    And,
    Or,
    Not,
    In,
    Is,
    If,
    Else,
    True,
    False,
    None,
    /// A reserved word the language never accepts (`lambda`, `import`, ...).
    Reserved(String),

    // Comparison
    EqEq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,

    // Structural
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Plus,
    Minus,

    /// Any other operator (`*`, `.`, `=`, `{`, ...). Always forbidden.
    Op(String),

    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(n) => write!(f, "{n}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "'{s}'"),
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
            Self::Not => write!(f, "not"),
            Self::In => write!(f, "in"),
            Self::Is => write!(f, "is"),
            Self::If => write!(f, "if"),
            Self::Else => write!(f, "else"),
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::None => write!(f, "None"),
            Self::Reserved(word) => write!(f, "{word}"),
            Self::EqEq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::LtE => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtE => write!(f, ">="),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::LBracket => write!(f, "["),
            Self::RBracket => write!(f, "]"),
            Self::Comma => write!(f, ","),
            Self::Colon => write!(f, ":"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Op(op) => write!(f, "{op}"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

const RESERVED: &[&str] = &[
    "lambda", "import", "from", "def", "class", "for", "while", "yield", "await", "async",
    "del", "global", "nonlocal", "return", "with", "as", "assert", "pass", "raise", "try",
    "except", "finally", "exec", "eval",
];

// Longest first so `**` wins over `*`.
const OTHER_OPS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "**", "//", "<<", ">>", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", ":=", "->", "*", "/", "%", "@", "&", "|", "^", "~", ".", "=", "{", "}", ";",
    "!", "$", "?", "`",
];

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    pub fn tokenize(&mut self) -> ExprResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            if self.pos >= self.input.len() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    column: self.pos,
                });
                break;
            }

            tokens.push(self.next_token()?);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> ExprResult<Token> {
        let column = self.pos;
        let ch = self.input[self.pos];

        let kind = match ch {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            ',' => self.single(TokenKind::Comma),
            '=' if self.peek_at(1) == Some('=') => self.double(TokenKind::EqEq),
            '!' if self.peek_at(1) == Some('=') => self.double(TokenKind::NotEq),
            '<' if self.peek_at(1) == Some('=') => self.double(TokenKind::LtE),
            '>' if self.peek_at(1) == Some('=') => self.double(TokenKind::GtE),
            '<' if self.peek_at(1) != Some('<') => self.single(TokenKind::Lt),
            '>' if self.peek_at(1) != Some('>') => self.single(TokenKind::Gt),
            '+' if self.peek_at(1) != Some('=') => self.single(TokenKind::Plus),
            '-' if !matches!(self.peek_at(1), Some('=') | Some('>')) => {
                self.single(TokenKind::Minus)
            }
            ':' if self.peek_at(1) != Some('=') => self.single(TokenKind::Colon),
            '"' | '\'' => self.read_string(ch)?,
            c if c.is_ascii_digit() => self.read_number()?,
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.read_number()?,
            c if c.is_alphabetic() || c == '_' => self.read_word(),
            _ => self.read_operator()?,
        };

        Ok(Token { kind, column })
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 2;
        kind
    }

    fn read_operator(&mut self) -> ExprResult<TokenKind> {
        for op in OTHER_OPS {
            let len = op.chars().count();
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c));
            if matches {
                self.pos += len;
                return Ok(TokenKind::Op((*op).to_string()));
            }
        }

        Err(ExpressionError::Parse {
            column: self.pos,
            message: format!("unexpected character '{}'", self.input[self.pos]),
        })
    }

    fn read_string(&mut self, quote: char) -> ExprResult<TokenKind> {
        let column = self.pos;
        self.pos += 1; // opening quote

        let mut text = String::new();
        loop {
            let Some(c) = self.peek_at(0) else {
                return Err(ExpressionError::Parse {
                    column,
                    message: "unterminated string literal".into(),
                });
            };
            self.pos += 1;

            if c == quote {
                break;
            }
            if c == '\\' {
                let escaped = self.peek_at(0).ok_or_else(|| ExpressionError::Parse {
                    column,
                    message: "unterminated string literal".into(),
                })?;
                self.pos += 1;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            } else {
                text.push(c);
            }
        }

        Ok(TokenKind::Str(text))
    }

    fn read_number(&mut self) -> ExprResult<TokenKind> {
        let column = self.pos;
        let mut text = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek_at(0) {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    text.push(c);
                }
            } else if c == '.' && !is_float && self.peek_at(1).map_or(true, |n| n.is_ascii_digit()) {
                is_float = true;
                text.push(c);
            } else if (c == 'e' || c == 'E') && !text.is_empty() {
                is_float = true;
                text.push(c);
                if let Some(sign @ ('+' | '-')) = self.peek_at(1) {
                    self.pos += 1;
                    text.push(sign);
                }
            } else {
                break;
            }
            self.pos += 1;
        }

        if self.peek_at(0).is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(ExpressionError::Parse {
                column,
                message: format!("invalid number literal '{text}'"),
            });
        }

        let invalid = || ExpressionError::Parse {
            column,
            message: format!("invalid number literal '{text}'"),
        };
        if is_float {
            text.parse::<f64>().map(TokenKind::Float).map_err(|_| invalid())
        } else {
            text.parse::<i64>().map(TokenKind::Int).map_err(|_| invalid())
        }
    }

    fn read_word(&mut self) -> TokenKind {
        let mut word = String::new();
        while let Some(c) = self.peek_at(0) {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }

        match word.as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            w if RESERVED.contains(&w) => TokenKind::Reserved(word),
            _ => TokenKind::Name(word),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .expect("should tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_comparison_with_keywords() {
        assert_eq!(
            kinds("a >= 2 and not b"),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::GtE,
                TokenKind::Int(2),
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Name("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_support_both_quotes_and_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "x""#),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::Str("x".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn forbidden_operators_are_still_tokens() {
        assert_eq!(
            kinds("a ** b.c"),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::Op("**".into()),
                TokenKind::Name("b".into()),
                TokenKind::Op(".".into()),
                TokenKind::Name("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reserved_words_are_flagged() {
        assert_eq!(kinds("lambda")[0], TokenKind::Reserved("lambda".into()));
    }

    #[test]
    fn floats_and_ints() {
        assert_eq!(
            kinds("1.5 42"),
            vec![TokenKind::Float(1.5), TokenKind::Int(42), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_is_a_parse_error() {
        assert!(matches!(
            Lexer::new("'abc").tokenize(),
            Err(ExpressionError::Parse { column: 0, .. })
        ));
    }
}
