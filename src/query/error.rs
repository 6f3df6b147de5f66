//! Query pipeline errors
//!
//! Every variant carries enough context (character position, expected token,
//! offending field) for the calling agent to correct its query without seeing
//! protocol traces.

use serde_json::{Value, json};
use thiserror::Error;

/// Failure while turning query text into search criteria
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Character the lexer cannot place, or an unterminated quoted string
    #[error("unexpected character {found:?} at position {position}: {reason}")]
    Lex {
        position: usize,
        found: char,
        reason: &'static str,
    },
    /// Token stream does not match the grammar
    #[error("syntax error at position {position}: expected {expected}, found {found}")]
    Syntax {
        position: usize,
        expected: String,
        found: String,
    },
    /// Well-formed query that names an unknown field or carries a bad value
    #[error("invalid query field '{field}': {reason}")]
    Validation { field: String, reason: String },
}

impl QueryError {
    /// Shorthand for a validation failure on `field`
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lex { .. } => "lex_error",
            Self::Syntax { .. } => "syntax_error",
            Self::Validation { .. } => "validation_error",
        }
    }

    /// Structured context attached to MCP error responses
    pub fn context(&self) -> Value {
        match self {
            Self::Lex {
                position, found, ..
            } => json!({
                "code": self.code(),
                "position": position,
                "char": found.to_string(),
            }),
            Self::Syntax {
                position,
                expected,
                found,
            } => json!({
                "code": self.code(),
                "position": position,
                "expected": expected,
                "found": found,
            }),
            Self::Validation { field, reason } => json!({
                "code": self.code(),
                "field": field,
                "reason": reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QueryError;

    #[test]
    fn context_carries_position_for_syntax_errors() {
        let err = QueryError::Syntax {
            position: 5,
            expected: "value".to_owned(),
            found: "end of input".to_owned(),
        };
        let ctx = err.context();
        assert_eq!(ctx["code"], "syntax_error");
        assert_eq!(ctx["position"], 5);
        assert_eq!(ctx["found"], "end of input");
    }

    #[test]
    fn validation_message_names_field() {
        let err = QueryError::validation("unknownfield", "unknown field");
        assert!(err.to_string().contains("'unknownfield'"));
        assert_eq!(err.context()["field"], "unknownfield");
    }
}
