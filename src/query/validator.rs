//! Semantic validation of parsed queries
//!
//! Resolves every comparison against the field table, checks the value shape
//! and operator, and produces a tree of typed search keys that the compiler
//! can translate without any failure path.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::query::ast::{Comparison, Literal, Operator, QueryNode};
use crate::query::error::QueryError;
use crate::query::fields::{self, FieldSpec, Keyword, ValueShape};

/// Upper bound on nodes in one query
pub const MAX_QUERY_NODES: usize = 64;
/// Upper bound on characters in a single text value
pub const MAX_TEXT_CHARS: usize = 256;

/// `local@domain`, optionally in angle brackets
static MESSAGE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^<?([^<>@\s]+@[^<>@\s]+)>?$").ok());

/// Resolved IMAP search key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    /// `FROM`, `SUBJECT`, `TEXT`, ... followed by a string
    Text { keyword: &'static str, value: String },
    /// `SINCE`, `BEFORE` or `ON` followed by a date
    Date { keyword: &'static str, date: NaiveDate },
    /// `LARGER` or `SMALLER` followed by an octet count
    Size { keyword: &'static str, octets: u32 },
    /// `HEADER <name> <value>`
    Header { name: &'static str, value: String },
    /// Flag key without argument (`SEEN`, `UNSEEN`, ...)
    Flag(&'static str),
}

/// Validated query tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedNode {
    Key(SearchKey),
    And(Box<ValidatedNode>, Box<ValidatedNode>),
    Or(Box<ValidatedNode>, Box<ValidatedNode>),
    Not(Box<ValidatedNode>),
}

/// Validate a parsed query
///
/// # Errors
///
/// Returns [`QueryError::Validation`] naming the offending field, or
/// `complexity` when every field is valid but the tree exceeds
/// [`MAX_QUERY_NODES`]. Field errors are reported first.
pub fn validate(node: &QueryNode) -> Result<ValidatedNode, QueryError> {
    let validated = validate_node(node)?;
    let count = node.node_count();
    if count > MAX_QUERY_NODES {
        return Err(QueryError::validation(
            "complexity",
            format!("query has {count} nodes; at most {MAX_QUERY_NODES} are allowed"),
        ));
    }
    Ok(validated)
}

fn validate_node(node: &QueryNode) -> Result<ValidatedNode, QueryError> {
    Ok(match node {
        QueryNode::Comparison(c) => ValidatedNode::Key(validate_comparison(c)?),
        QueryNode::And(l, r) => {
            ValidatedNode::And(Box::new(validate_node(l)?), Box::new(validate_node(r)?))
        }
        QueryNode::Or(l, r) => {
            ValidatedNode::Or(Box::new(validate_node(l)?), Box::new(validate_node(r)?))
        }
        QueryNode::Not(c) => ValidatedNode::Not(Box::new(validate_node(c)?)),
    })
}

/// Value after shape checks, before it is paired with a keyword
enum TypedValue {
    Text(String),
    Date(NaiveDate),
    Size(u32),
    MessageId(String),
    Flag(&'static str),
}

fn validate_comparison(c: &Comparison) -> Result<SearchKey, QueryError> {
    let field = c.field.as_str();
    let spec = fields::lookup(field).ok_or_else(|| {
        QueryError::validation(
            field,
            format!(
                "unknown field at position {}; expected one of {}",
                c.position,
                fields::field_names().join(", ")
            ),
        )
    })?;

    if !spec.accepts(c.operator) {
        return Err(QueryError::validation(
            field,
            format!(
                "operator '{}' is not supported; use {}",
                c.operator,
                spec.operator_hint()
            ),
        ));
    }

    let value = check_value(field, spec.shape, &c.value)?;
    to_search_key(field, spec, c.operator, value)
}

fn check_value(field: &str, shape: ValueShape, literal: &Literal) -> Result<TypedValue, QueryError> {
    let raw = literal.as_str();
    match shape {
        ValueShape::Text => check_text(field, raw).map(TypedValue::Text),
        ValueShape::Address => check_address(field, raw).map(TypedValue::Text),
        ValueShape::Date => parse_date(field, raw).map(TypedValue::Date),
        ValueShape::Size => parse_size(field, raw).map(TypedValue::Size),
        ValueShape::MessageId => check_message_id(field, raw).map(TypedValue::MessageId),
        ValueShape::Flag => fields::flag_keyword(raw).map(TypedValue::Flag).ok_or_else(|| {
            QueryError::validation(
                field,
                format!(
                    "unknown flag '{raw}'; expected one of {}",
                    fields::flag_names().join(", ")
                ),
            )
        }),
    }
}

fn to_search_key(
    field: &str,
    spec: &FieldSpec,
    op: Operator,
    value: TypedValue,
) -> Result<SearchKey, QueryError> {
    match (spec.keyword, value) {
        (Keyword::Search(keyword), TypedValue::Text(value)) => {
            Ok(SearchKey::Text { keyword, value })
        }
        (Keyword::Search(keyword), TypedValue::Date(date)) => Ok(SearchKey::Date {
            keyword,
            date: four_digit_year(field, date)?,
        }),
        (Keyword::Header(name), TypedValue::MessageId(value)) => {
            Ok(SearchKey::Header { name, value })
        }
        (Keyword::DateRange, TypedValue::Date(date)) => date_range(field, op, date),
        (Keyword::SizeRange, TypedValue::Size(octets)) => Ok(SearchKey::Size {
            keyword: if op == Operator::Gt { "LARGER" } else { "SMALLER" },
            octets,
        }),
        (Keyword::FlagName, TypedValue::Flag(key)) => Ok(SearchKey::Flag(key)),
        _ => Err(QueryError::validation(
            field,
            "field has no search key for this value",
        )),
    }
}

/// IMAP dates have day granularity: SINCE is inclusive, BEFORE exclusive
fn date_range(field: &str, op: Operator, date: NaiveDate) -> Result<SearchKey, QueryError> {
    let next_day = || {
        date.succ_opt()
            .ok_or_else(|| QueryError::validation(field, "date is out of range"))
    };
    let (keyword, date) = match op {
        Operator::Colon | Operator::Eq => ("ON", date),
        Operator::Lt => ("BEFORE", date),
        Operator::Ge => ("SINCE", date),
        Operator::Gt => ("SINCE", next_day()?),
        Operator::Le => ("BEFORE", next_day()?),
    };
    Ok(SearchKey::Date {
        keyword,
        date: four_digit_year(field, date)?,
    })
}

/// IMAP date-year is exactly four digits
fn four_digit_year(field: &str, date: NaiveDate) -> Result<NaiveDate, QueryError> {
    if (1..=9999).contains(&date.year()) {
        Ok(date)
    } else {
        Err(QueryError::validation(
            field,
            format!("date {date} is outside the searchable range 0001-01-01..9999-12-31"),
        ))
    }
}

fn check_text(field: &str, raw: &str) -> Result<String, QueryError> {
    if raw.is_empty() {
        return Err(QueryError::validation(field, "value must not be empty"));
    }
    if raw.chars().count() > MAX_TEXT_CHARS {
        return Err(QueryError::validation(
            field,
            format!("value must be at most {MAX_TEXT_CHARS} characters"),
        ));
    }
    if raw.chars().any(char::is_control) {
        return Err(QueryError::validation(
            field,
            "value must not contain control characters",
        ));
    }
    Ok(raw.to_owned())
}

fn check_address(field: &str, raw: &str) -> Result<String, QueryError> {
    let value = check_text(field, raw)?;
    if value.contains(['<', '>', ',', ';']) {
        return Err(QueryError::validation(
            field,
            "expected a single address or name fragment without '<', '>', ',' or ';'",
        ));
    }
    Ok(value)
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        QueryError::validation(
            field,
            format!("invalid date '{raw}', expected a calendar date as YYYY-MM-DD"),
        )
    })
}

fn parse_size(field: &str, raw: &str) -> Result<u32, QueryError> {
    let lower = raw.to_ascii_lowercase();
    let (digits, multiplier) = if let Some(d) = lower.strip_suffix("kb").or(lower.strip_suffix('k')) {
        (d, 1024_u64)
    } else if let Some(d) = lower.strip_suffix("mb").or(lower.strip_suffix('m')) {
        (d, 1024 * 1024)
    } else {
        (lower.as_str(), 1)
    };

    let invalid = || {
        QueryError::validation(
            field,
            format!("invalid size '{raw}', expected octets such as 5000, 20k or 2m"),
        )
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(invalid)
}

/// Accepts `local@domain` with or without angle brackets and returns the
/// bracketed form used in Message-ID headers
fn check_message_id(field: &str, raw: &str) -> Result<String, QueryError> {
    let pattern = MESSAGE_ID
        .as_ref()
        .ok_or_else(|| QueryError::validation(field, "message-id pattern failed to compile"))?;
    let inner = pattern
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            QueryError::validation(
                field,
                format!("invalid message-id '{raw}', expected <local@domain>"),
            )
        })?;
    Ok(format!("<{inner}>"))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{MAX_QUERY_NODES, SearchKey, ValidatedNode, validate};
    use crate::query::error::QueryError;
    use crate::query::lexer::tokenize;
    use crate::query::parser::parse;

    fn validate_str(raw: &str) -> Result<ValidatedNode, QueryError> {
        validate(&parse(&tokenize(raw).expect("lexes")).expect("parses"))
    }

    fn single_key(raw: &str) -> SearchKey {
        match validate_str(raw).expect("validates") {
            ValidatedNode::Key(key) => key,
            other => panic!("expected a single key, got {other:?}"),
        }
    }

    fn failing_field(raw: &str) -> String {
        match validate_str(raw).expect_err("must fail") {
            QueryError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn unknown_field_is_named_as_written() {
        assert_eq!(failing_field("unknownfield:x"), "unknownfield");
        assert_eq!(failing_field("from:alice Colour:red"), "Colour");
    }

    #[test]
    fn every_rejection_names_its_field() {
        for (raw, field) in [
            ("since:2024-02-30", "since"),
            ("before:yesterday", "before"),
            ("is:important", "is"),
            ("size:100", "size"),
            ("size>lots", "size"),
            ("subject<x", "subject"),
            ("message-id:not-an-id", "message-id"),
            ("from:\"a@x.com, b@y.com\"", "from"),
            ("subject:\"\"", "subject"),
            ("NOT (to:bob OR DATE:2024-13-01)", "DATE"),
        ] {
            assert_eq!(failing_field(raw), field, "{raw}");
        }
    }

    #[test]
    fn resolves_aliases_and_case() {
        assert_eq!(
            single_key("SENDER:alice@example.com"),
            SearchKey::Text {
                keyword: "FROM",
                value: "alice@example.com".to_owned(),
            }
        );
    }

    #[test]
    fn dates_accept_quoted_and_bare_forms() {
        let expected = SearchKey::Date {
            keyword: "SINCE",
            date: ymd(2023, 1, 15),
        };
        assert_eq!(single_key("since:2023-01-15"), expected);
        assert_eq!(single_key("since:\"2023-01-15\""), expected);
    }

    #[test]
    fn date_comparators_map_to_day_granular_keys() {
        let cases = [
            ("date:2024-03-01", "ON", ymd(2024, 3, 1)),
            ("date<2024-03-01", "BEFORE", ymd(2024, 3, 1)),
            ("date>=2024-03-01", "SINCE", ymd(2024, 3, 1)),
            ("date>2024-02-29", "SINCE", ymd(2024, 3, 1)),
            ("date<=2024-12-31", "BEFORE", ymd(2025, 1, 1)),
        ];
        for (raw, keyword, date) in cases {
            assert_eq!(single_key(raw), SearchKey::Date { keyword, date }, "{raw}");
        }
    }

    #[test]
    fn sizes_accept_suffixes() {
        assert_eq!(
            single_key("size>20k"),
            SearchKey::Size {
                keyword: "LARGER",
                octets: 20 * 1024,
            }
        );
        assert_eq!(
            single_key("size<2MB"),
            SearchKey::Size {
                keyword: "SMALLER",
                octets: 2 * 1024 * 1024,
            }
        );
        assert_eq!(failing_field("size>99999999999"), "size");
    }

    #[test]
    fn message_ids_are_normalized_to_bracketed_form() {
        let expected = SearchKey::Header {
            name: "Message-ID",
            value: "<abc.123@mail.example.com>".to_owned(),
        };
        assert_eq!(single_key("message-id:abc.123@mail.example.com"), expected);
        assert_eq!(single_key("msgid:<abc.123@mail.example.com>"), expected);
    }

    #[test]
    fn flags_resolve_to_keys() {
        assert_eq!(single_key("is:unread"), SearchKey::Flag("UNSEEN"));
        assert_eq!(single_key("flag:Flagged"), SearchKey::Flag("FLAGGED"));
    }

    #[test]
    fn rejects_overly_complex_queries() {
        let raw = vec!["subject:x"; MAX_QUERY_NODES].join(" OR ");
        let err = validate_str(&raw).expect_err("must fail");
        assert!(matches!(err, QueryError::Validation { ref field, .. } if field == "complexity"));

        let raw = vec!["subject:x"; MAX_QUERY_NODES / 2].join(" OR ");
        validate_str(&raw).expect("within bound");
    }

    #[test]
    fn dates_past_year_9999_are_rejected() {
        assert_eq!(failing_field("date<=9999-12-31"), "date");
        assert_eq!(failing_field("date>9999-12-31"), "date");
        assert_eq!(failing_field("on:0000-06-01"), "on");
        assert_eq!(
            single_key("date<9999-12-31"),
            SearchKey::Date {
                keyword: "BEFORE",
                date: ymd(9999, 12, 31),
            }
        );
    }

    #[test]
    fn field_errors_win_over_complexity() {
        let mut terms = vec!["subject:x"; MAX_QUERY_NODES];
        terms.push("unknownfield:x");
        assert_eq!(failing_field(&terms.join(" OR ")), "unknownfield");
    }

    #[test]
    fn rejects_overlong_text() {
        let raw = format!("subject:{}", "x".repeat(300));
        assert_eq!(failing_field(&raw), "subject");
    }
}
