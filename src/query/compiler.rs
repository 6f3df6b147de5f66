//! Validated query → IMAP SEARCH criteria
//!
//! IMAP ANDs adjacent search keys implicitly, so `And` is plain
//! concatenation. `OR` and `NOT` each take single search keys; an `And`
//! operand is grouped in parentheses to stay one key.

use std::fmt;

use chrono::NaiveDate;

use crate::query::validator::{SearchKey, ValidatedNode};

/// Ordered IMAP search tokens, submitted verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCriteria {
    tokens: Vec<String>,
}

impl CompiledCriteria {
    /// Criteria matching every message in the folder
    pub fn all() -> Self {
        Self {
            tokens: vec!["ALL".to_owned()],
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether every token is 7-bit; otherwise the search needs a charset
    pub fn is_ascii(&self) -> bool {
        self.tokens.iter().all(|t| t.is_ascii())
    }
}

/// Wire form: tokens separated by spaces, parentheses attached to their
/// contents (`OR (FROM a SUBJECT b) TO c`)
impl fmt::Display for CompiledCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prev: Option<&str> = None;
        for token in self.tokens() {
            if prev.is_some_and(|p| p != "(") && token != ")" {
                f.write_str(" ")?;
            }
            f.write_str(token)?;
            prev = Some(token);
        }
        Ok(())
    }
}

/// Compile a validated query; deterministic for a given tree
pub fn compile(node: &ValidatedNode) -> CompiledCriteria {
    let mut tokens = Vec::new();
    emit(node, &mut tokens);
    CompiledCriteria { tokens }
}

fn emit(node: &ValidatedNode, out: &mut Vec<String>) {
    match node {
        ValidatedNode::Key(key) => emit_key(key, out),
        ValidatedNode::And(l, r) => {
            emit(l, out);
            emit(r, out);
        }
        ValidatedNode::Or(l, r) => {
            out.push("OR".to_owned());
            emit_operand(l, out);
            emit_operand(r, out);
        }
        ValidatedNode::Not(child) => {
            out.push("NOT".to_owned());
            emit_operand(child, out);
        }
    }
}

fn emit_operand(node: &ValidatedNode, out: &mut Vec<String>) {
    if matches!(node, ValidatedNode::And(..)) {
        out.push("(".to_owned());
        emit(node, out);
        out.push(")".to_owned());
    } else {
        emit(node, out);
    }
}

fn emit_key(key: &SearchKey, out: &mut Vec<String>) {
    match key {
        SearchKey::Text { keyword, value } => {
            out.push((*keyword).to_owned());
            out.push(astring(value));
        }
        SearchKey::Date { keyword, date } => {
            out.push((*keyword).to_owned());
            out.push(imap_date(*date));
        }
        SearchKey::Size { keyword, octets } => {
            out.push((*keyword).to_owned());
            out.push(octets.to_string());
        }
        SearchKey::Header { name, value } => {
            out.push("HEADER".to_owned());
            out.push(astring(name));
            out.push(astring(value));
        }
        SearchKey::Flag(keyword) => out.push((*keyword).to_owned()),
    }
}

/// Atom when every byte is atom-safe, quoted string otherwise
fn astring(value: &str) -> String {
    if !value.is_empty() && !value.bytes().any(needs_quoting) {
        return value.to_owned();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'}' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}

/// IMAP SEARCH date, e.g. `1-Jan-2025`
fn imap_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}
