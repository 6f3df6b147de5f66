//! Query lexer
//!
//! Splits query text into a flat token stream. Positions are 0-based
//! character offsets so they line up with what an agent sees in its own
//! query string, including for non-ASCII input.

use std::fmt;

use crate::query::error::QueryError;

/// Token categories produced by [`tokenize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Field name directly followed by an operator (`from` in `from:alice`)
    Field,
    /// Comparison operator (`:`, `=`, `<`, `>`, `<=`, `>=`)
    Op,
    And,
    Or,
    Not,
    LParen,
    RParen,
    /// Quoted string or unquoted word
    String,
    /// Unquoted `YYYY-MM-DD` literal
    Date,
    /// End of input, always the last token
    Eof,
}

/// One lexed token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Token text; quoted strings are stored unescaped without the quotes
    pub text: String,
    /// Character offset of the first character of the token
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => f.write_str("end of input"),
            TokenKind::String => write!(f, "{:?}", self.text),
            _ => write!(f, "'{}'", self.text),
        }
    }
}

/// Tokenize raw query text
///
/// # Errors
///
/// Returns [`QueryError::Lex`] on a control character, an operator with no
/// field name before it, or an unterminated quoted string.
pub fn tokenize(raw: &str) -> Result<Vec<Token>, QueryError> {
    Lexer {
        chars: raw.chars().collect(),
        pos: 0,
        tokens: Vec::new(),
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn run(mut self) -> Result<Vec<Token>, QueryError> {
        while let Some(ch) = self.peek() {
            match ch {
                c if c.is_whitespace() => self.pos += 1,
                '(' => self.push_single(TokenKind::LParen, ch),
                ')' => self.push_single(TokenKind::RParen, ch),
                '"' => {
                    let start = self.pos;
                    let text = self.read_quoted()?;
                    self.tokens.push(Token::new(TokenKind::String, text, start));
                }
                c if c.is_control() => {
                    return Err(self.error(c, "control characters are not allowed"));
                }
                c if is_operator_char(c) => {
                    return Err(self.error(c, "operator must follow a field name"));
                }
                _ => self.read_word()?,
            }
        }
        let end = self.chars.len();
        self.tokens.push(Token::new(TokenKind::Eof, "", end));
        Ok(self.tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn push_single(&mut self, kind: TokenKind, ch: char) {
        self.tokens.push(Token::new(kind, ch, self.pos));
        self.pos += 1;
    }

    fn error(&self, found: char, reason: &'static str) -> QueryError {
        QueryError::Lex {
            position: self.pos,
            found,
            reason,
        }
    }

    /// Read a bare word: a keyword, a stray value, or a field name when an
    /// operator follows immediately
    fn read_word(&mut self) -> Result<(), QueryError> {
        let start = self.pos;
        let word = self.take_while(is_word_char);

        if self.peek().is_some_and(is_operator_char) {
            self.tokens.push(Token::new(TokenKind::Field, word, start));
            self.read_operator();
            return self.read_value();
        }

        let kind = match word.to_ascii_uppercase().as_str() {
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            _ => TokenKind::String,
        };
        self.tokens.push(Token::new(kind, word, start));
        Ok(())
    }

    fn read_operator(&mut self) {
        let start = self.pos;
        let mut op = String::new();
        if let Some(first) = self.peek() {
            op.push(first);
            self.pos += 1;
            if matches!(first, '<' | '>') && self.peek() == Some('=') {
                op.push('=');
                self.pos += 1;
            }
        }
        self.tokens.push(Token::new(TokenKind::Op, op, start));
    }

    /// Read the value glued to an operator. Nothing is pushed when the
    /// operator is followed by whitespace or end of input; the parser reports
    /// the missing value.
    fn read_value(&mut self) -> Result<(), QueryError> {
        let start = self.pos;
        match self.peek() {
            Some('"') => {
                let text = self.read_quoted()?;
                self.tokens.push(Token::new(TokenKind::String, text, start));
            }
            Some(c) if is_value_char(c) => {
                let text = self.take_while(is_value_char);
                let kind = if looks_like_date(&text) {
                    TokenKind::Date
                } else {
                    TokenKind::String
                };
                self.tokens.push(Token::new(kind, text, start));
            }
            _ => {}
        }
        Ok(())
    }

    /// Read a double-quoted string starting at the current position
    fn read_quoted(&mut self) -> Result<String, QueryError> {
        let start = self.pos;
        self.pos += 1;
        let unterminated = QueryError::Lex {
            position: start,
            found: '"',
            reason: "unterminated quoted string",
        };

        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(unterminated),
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    let Some(escaped) = self.peek() else {
                        return Err(unterminated);
                    };
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn take_while(&mut self, pred: fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn is_operator_char(ch: char) -> bool {
    matches!(ch, ':' | '=' | '<' | '>')
}

fn is_word_char(ch: char) -> bool {
    !ch.is_whitespace() && !ch.is_control() && !matches!(ch, '(' | ')' | '"') && !is_operator_char(ch)
}

fn is_value_char(ch: char) -> bool {
    !ch.is_whitespace() && !ch.is_control() && !matches!(ch, '(' | ')' | '"')
}

/// `YYYY-MM-DD` shape check; calendar validity is the validator's job
fn looks_like_date(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}
