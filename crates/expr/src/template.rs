//! Template mode: text with `{{ expression }}` placeholders.
//!
//! A template made of a single placeholder yields the raw value, so a
//! template can produce a list (e.g. several role names). Anything else is
//! rendered to text.

use crate::error::{ExprResult, ExpressionError};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// `true` when the text contains template markers.
pub fn is_template(text: &str) -> bool {
    text.contains(OPEN) || text.contains("{%")
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    /// Expression source between the markers, trimmed.
    Placeholder { source: String, column: usize },
}

/// Split a template into text and placeholder segments.
pub(crate) fn split(template: &str) -> ExprResult<Vec<Segment>> {
    if let Some(column) = template.find("{%") {
        return Err(ExpressionError::Forbidden {
            construct: template[column..].to_string(),
            column,
        });
    }

    let mut segments = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(ExpressionError::Parse {
                column: offset + start,
                message: "unterminated template placeholder".into(),
            });
        };
        let source = after_open[..end].trim();
        if source.is_empty() {
            return Err(ExpressionError::Parse {
                column: offset + start,
                message: "empty template placeholder".into(),
            });
        }
        segments.push(Segment::Placeholder {
            source: source.to_string(),
            column: offset + start,
        });

        let consumed = start + OPEN.len() + end + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Ok(segments)
}
