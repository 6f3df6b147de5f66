//! Search query language
//!
//! Agents write queries such as
//!
//! ```text
//! from:alice@example.com (subject:invoice OR subject:receipt) since:2024-01-01 NOT is:seen
//! ```
//!
//! which pass through four stages before reaching the server:
//!
//! - [`lexer`]: text → tokens
//! - [`parser`]: tokens → [`QueryNode`] tree (implicit AND between terms)
//! - [`validator`]: field table, value shapes, complexity bound
//! - [`compiler`]: validated tree → [`CompiledCriteria`] for `UID SEARCH`

pub mod ast;
pub mod compiler;
pub mod error;
pub mod fields;
pub mod lexer;
pub mod parser;
pub mod validator;

pub use ast::QueryNode;
pub use compiler::CompiledCriteria;
pub use error::QueryError;

use lexer::TokenKind;

/// Run the full pipeline on raw query text
///
/// A blank query matches every message and compiles to `ALL`.
///
/// # Errors
///
/// Returns the first lex, syntax, or validation error encountered.
pub fn compile_query(raw: &str) -> Result<CompiledCriteria, QueryError> {
    let tokens = lexer::tokenize(raw)?;
    if tokens.iter().all(|t| t.kind == TokenKind::Eof) {
        return Ok(CompiledCriteria::all());
    }
    let ast = parser::parse(&tokens)?;
    let validated = validator::validate(&ast)?;
    Ok(compiler::compile(&validated))
}

#[cfg(test)]
mod tests {
    use super::{QueryError, compile_query, lexer, parser};

    #[test]
    fn end_to_end_from_and_subject() {
        let raw = r#"from:"alice@example.com" AND subject:invoice"#;
        let ast = parser::parse(&lexer::tokenize(raw).expect("lexes")).expect("parses");
        assert_eq!(ast.to_string(), "And(from:alice@example.com, subject:invoice)");

        let criteria = compile_query(raw).expect("compiles");
        assert_eq!(
            criteria.tokens(),
            ["FROM", "alice@example.com", "SUBJECT", "invoice"]
        );
    }

    #[test]
    fn blank_query_matches_everything() {
        assert_eq!(compile_query("").expect("compiles").to_string(), "ALL");
        assert_eq!(compile_query("  \t ").expect("compiles").to_string(), "ALL");
    }

    #[test]
    fn errors_surface_from_each_stage() {
        assert!(matches!(
            compile_query("subject:\"open"),
            Err(QueryError::Lex { .. })
        ));
        assert!(matches!(
            compile_query("from:"),
            Err(QueryError::Syntax { position: 5, .. })
        ));
        assert!(matches!(
            compile_query("unknownfield:x"),
            Err(QueryError::Validation { ref field, .. }) if field == "unknownfield"
        ));
    }

    #[test]
    fn mixed_query_compiles_like_the_dictionary_form() {
        let criteria = compile_query(
            "from:important@example.com NOT subject:unimportant (subject:urgent OR to:important@example.com)",
        )
        .expect("compiles");
        assert_eq!(
            criteria.to_string(),
            "FROM important@example.com NOT SUBJECT unimportant OR SUBJECT urgent TO important@example.com"
        );
    }

    #[test]
    fn pipeline_is_deterministic() {
        let raw = "sender:bob OR (to:carol date<2024-06-01) NOT is:answered";
        assert_eq!(
            compile_query(raw).expect("compiles"),
            compile_query(raw).expect("compiles")
        );
    }
}
