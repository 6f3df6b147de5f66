//! Closed table of searchable fields
//!
//! Adding a field is one [`FieldSpec`] entry: its name and aliases, the value
//! shape the validator enforces, and the IMAP keyword it compiles to.

use crate::query::ast::Operator;

/// Value shape a field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// Free text, substring-matched by the server
    Text,
    /// Address or display-name fragment
    Address,
    /// Calendar date, `YYYY-MM-DD`
    Date,
    /// Octet count with optional `k`/`m` suffix
    Size,
    /// `<local@domain>` message identifier
    MessageId,
    /// Message flag name from [`FLAGS`]
    Flag,
}

/// How a field maps onto IMAP search keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// Fixed search key followed by the value (`FROM alice`)
    Search(&'static str),
    /// `HEADER <name> <value>`
    Header(&'static str),
    /// Operator picks ON / BEFORE / SINCE
    DateRange,
    /// Operator picks LARGER / SMALLER
    SizeRange,
    /// Value picks the flag key (`SEEN`, `UNSEEN`, ...)
    FlagName,
}

/// One searchable field
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub shape: ValueShape,
    pub keyword: Keyword,
}

impl FieldSpec {
    /// Whether `op` is meaningful for this field
    pub fn accepts(&self, op: Operator) -> bool {
        match self.keyword {
            Keyword::DateRange => true,
            Keyword::SizeRange => matches!(op, Operator::Lt | Operator::Gt),
            _ => matches!(op, Operator::Colon | Operator::Eq),
        }
    }

    /// Operators to suggest when [`accepts`](Self::accepts) fails
    pub fn operator_hint(&self) -> &'static str {
        match self.keyword {
            Keyword::DateRange => "':', '=', '<', '>', '<=' or '>='",
            Keyword::SizeRange => "'<' or '>'",
            _ => "':' or '='",
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

pub static FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "from",
        aliases: &["sender"],
        shape: ValueShape::Address,
        keyword: Keyword::Search("FROM"),
    },
    FieldSpec {
        name: "to",
        aliases: &["recipient"],
        shape: ValueShape::Address,
        keyword: Keyword::Search("TO"),
    },
    FieldSpec {
        name: "cc",
        aliases: &[],
        shape: ValueShape::Address,
        keyword: Keyword::Search("CC"),
    },
    FieldSpec {
        name: "bcc",
        aliases: &[],
        shape: ValueShape::Address,
        keyword: Keyword::Search("BCC"),
    },
    FieldSpec {
        name: "subject",
        aliases: &[],
        shape: ValueShape::Text,
        keyword: Keyword::Search("SUBJECT"),
    },
    FieldSpec {
        name: "body",
        aliases: &[],
        shape: ValueShape::Text,
        keyword: Keyword::Search("BODY"),
    },
    FieldSpec {
        name: "text",
        aliases: &[],
        shape: ValueShape::Text,
        keyword: Keyword::Search("TEXT"),
    },
    FieldSpec {
        name: "since",
        aliases: &[],
        shape: ValueShape::Date,
        keyword: Keyword::Search("SINCE"),
    },
    FieldSpec {
        name: "before",
        aliases: &[],
        shape: ValueShape::Date,
        keyword: Keyword::Search("BEFORE"),
    },
    FieldSpec {
        name: "on",
        aliases: &[],
        shape: ValueShape::Date,
        keyword: Keyword::Search("ON"),
    },
    FieldSpec {
        name: "date",
        aliases: &[],
        shape: ValueShape::Date,
        keyword: Keyword::DateRange,
    },
    FieldSpec {
        name: "size",
        aliases: &[],
        shape: ValueShape::Size,
        keyword: Keyword::SizeRange,
    },
    FieldSpec {
        name: "message-id",
        aliases: &["msgid"],
        shape: ValueShape::MessageId,
        keyword: Keyword::Header("Message-ID"),
    },
    FieldSpec {
        name: "is",
        aliases: &["flag"],
        shape: ValueShape::Flag,
        keyword: Keyword::FlagName,
    },
];

/// Flag names accepted by `is:` and the search key each compiles to
pub static FLAGS: &[(&str, &str)] = &[
    ("seen", "SEEN"),
    ("read", "SEEN"),
    ("unseen", "UNSEEN"),
    ("unread", "UNSEEN"),
    ("flagged", "FLAGGED"),
    ("starred", "FLAGGED"),
    ("unflagged", "UNFLAGGED"),
    ("answered", "ANSWERED"),
    ("unanswered", "UNANSWERED"),
    ("draft", "DRAFT"),
    ("undraft", "UNDRAFT"),
    ("deleted", "DELETED"),
    ("undeleted", "UNDELETED"),
    ("recent", "RECENT"),
    ("new", "NEW"),
    ("old", "OLD"),
];

/// Case-insensitive lookup by field name or alias
pub fn lookup(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.matches(name))
}

/// Case-insensitive lookup of a flag search key
pub fn flag_keyword(name: &str) -> Option<&'static str> {
    FLAGS
        .iter()
        .find_map(|(flag, key)| flag.eq_ignore_ascii_case(name).then_some(*key))
}

/// Canonical field names, for error messages
pub fn field_names() -> Vec<&'static str> {
    FIELDS.iter().map(|spec| spec.name).collect()
}

/// Flag names, for error messages
pub fn flag_names() -> Vec<&'static str> {
    FLAGS.iter().map(|(flag, _)| *flag).collect()
}
