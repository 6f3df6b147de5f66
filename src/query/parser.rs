//! Recursive-descent query parser
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! Expr       := OrExpr
//! OrExpr     := AndExpr (OR AndExpr)*
//! AndExpr    := NotExpr (AND? NotExpr)*
//! NotExpr    := NOT NotExpr | Term
//! Term       := '(' Expr ')' | Comparison
//! Comparison := FIELD OP VALUE
//! ```
//!
//! Adjacent terms without a connective are joined with AND, so
//! `from:alice subject:report` parses exactly like
//! `from:alice AND subject:report`.

use crate::query::ast::{Comparison, Literal, Operator, QueryNode};
use crate::query::error::QueryError;
use crate::query::lexer::{Token, TokenKind};

/// Maximum nesting of parentheses and NOT before parsing gives up
pub const MAX_NESTING: usize = 128;

/// Parse a token stream produced by [`tokenize`](crate::query::lexer::tokenize)
///
/// # Errors
///
/// Returns [`QueryError::Syntax`] for unmatched parentheses, dangling
/// keywords, comparisons without a value, or any other token out of place.
pub fn parse(tokens: &[Token]) -> Result<QueryNode, QueryError> {
    let end = tokens.last().map_or(0, |t| t.position + t.text.chars().count());
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        eof: Token {
            kind: TokenKind::Eof,
            text: String::new(),
            position: end,
        },
    };

    let node = parser.parse_or()?;
    let current = parser.current();
    match current.kind {
        TokenKind::Eof => Ok(node),
        TokenKind::RParen => Err(parser.error_at(current.position, "end of input (unmatched ')')")),
        _ => Err(parser.error_at(current.position, "AND, OR or end of input")),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    eof: Token,
}

impl Parser<'_> {
    fn parse_or(&mut self) -> Result<QueryNode, QueryError> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = QueryNode::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<QueryNode, QueryError> {
        let mut left = self.parse_not()?;
        loop {
            match self.current().kind {
                TokenKind::Or | TokenKind::RParen | TokenKind::Eof => break,
                TokenKind::And => self.advance(),
                // Anything else starts the next juxtaposed term; parse_term
                // reports it if it cannot.
                _ => {}
            }
            let right = self.parse_not()?;
            left = QueryNode::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<QueryNode, QueryError> {
        if self.check(TokenKind::Not) {
            let position = self.current().position;
            self.advance();
            self.descend(position)?;
            let child = self.parse_not();
            self.depth -= 1;
            return Ok(QueryNode::negate(child?));
        }
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<QueryNode, QueryError> {
        let (kind, position) = (self.current().kind, self.current().position);
        match kind {
            TokenKind::LParen => {
                self.advance();
                self.descend(position)?;
                let inner = self.parse_or();
                self.depth -= 1;
                let inner = inner?;
                if !self.check(TokenKind::RParen) {
                    return Err(self.error_here("')'"));
                }
                self.advance();
                Ok(inner)
            }
            TokenKind::Field => self.parse_comparison(),
            _ => Err(self.error_here("a comparison such as field:value, '(' or NOT")),
        }
    }

    fn parse_comparison(&mut self) -> Result<QueryNode, QueryError> {
        let field = self.current().clone();
        self.advance();

        let op_token = self.current().clone();
        let operator = match (op_token.kind, Operator::from_symbol(&op_token.text)) {
            (TokenKind::Op, Some(op)) => op,
            _ => return Err(self.error_here("an operator after the field name")),
        };
        self.advance();

        // The value must be glued to the operator: `from: bob` has no value.
        let after_op = op_token.position + op_token.text.chars().count();
        let value_token = self.current();
        let value = match value_token.kind {
            TokenKind::String if value_token.position == after_op => {
                Literal::Text(value_token.text.clone())
            }
            TokenKind::Date if value_token.position == after_op => {
                Literal::Date(value_token.text.clone())
            }
            _ => {
                return Err(self.error_at(
                    after_op,
                    &format!("a value after '{}{}'", field.text, op_token.text),
                ));
            }
        };
        self.advance();

        Ok(QueryNode::Comparison(Comparison {
            field: field.text,
            operator,
            value,
            position: field.position,
        }))
    }

    fn descend(&mut self, position: usize) -> Result<(), QueryError> {
        if self.depth >= MAX_NESTING {
            return Err(QueryError::Syntax {
                position,
                expected: format!("at most {MAX_NESTING} levels of nesting"),
                found: "deeper nesting".to_owned(),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error_here(&self, expected: &str) -> QueryError {
        self.error_at(self.current().position, expected)
    }

    fn error_at(&self, position: usize, expected: &str) -> QueryError {
        QueryError::Syntax {
            position,
            expected: expected.to_owned(),
            found: self.current().to_string(),
        }
    }
}
