//! Query abstract syntax tree

use std::fmt;

/// Comparison operator between a field and its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `:`
    Colon,
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

impl Operator {
    /// Map lexed operator text to an operator
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            ":" => Some(Self::Colon),
            "=" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            ">" => Some(Self::Gt),
            "<=" => Some(Self::Le),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Colon => ":",
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Literal value as written in the query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Quoted string or bare word
    Text(String),
    /// Unquoted `YYYY-MM-DD` literal
    Date(String),
}

impl Literal {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Date(s) => s,
        }
    }
}

/// Leaf node: `field <op> value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// Field name exactly as written (resolved by the validator)
    pub field: String,
    pub operator: Operator,
    pub value: Literal,
    /// Character offset of the field name
    pub position: usize,
}

/// Parsed query tree; every internal node owns its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    Comparison(Comparison),
    And(Box<QueryNode>, Box<QueryNode>),
    Or(Box<QueryNode>, Box<QueryNode>),
    Not(Box<QueryNode>),
}

impl QueryNode {
    pub fn and(left: QueryNode, right: QueryNode) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: QueryNode, right: QueryNode) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    pub fn negate(child: QueryNode) -> Self {
        Self::Not(Box::new(child))
    }

    /// Total number of nodes in the tree
    pub fn node_count(&self) -> usize {
        match self {
            Self::Comparison(_) => 1,
            Self::And(l, r) | Self::Or(l, r) => 1 + l.node_count() + r.node_count(),
            Self::Not(c) => 1 + c.node_count(),
        }
    }
}

/// Renders the tree shape without source positions, e.g.
/// `Or(from:alice, And(to:bob, NOT(is:seen)))`
impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison(c) => {
                let value = c.value.as_str();
                if value.is_empty() || value.chars().any(|ch| ch.is_whitespace() || ch == '"') {
                    write!(f, "{}{}{:?}", c.field, c.operator, value)
                } else {
                    write!(f, "{}{}{}", c.field, c.operator, value)
                }
            }
            Self::And(l, r) => write!(f, "And({l}, {r})"),
            Self::Or(l, r) => write!(f, "Or({l}, {r})"),
            Self::Not(c) => write!(f, "NOT({c})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Comparison, Literal, Operator, QueryNode};

    fn cmp(field: &str, value: &str) -> QueryNode {
        QueryNode::Comparison(Comparison {
            field: field.to_owned(),
            operator: Operator::Colon,
            value: Literal::Text(value.to_owned()),
            position: 0,
        })
    }

    #[test]
    fn display_renders_shape_and_quotes_spaced_values() {
        let tree = QueryNode::or(
            cmp("from", "alice"),
            QueryNode::and(cmp("subject", "q3 report"), QueryNode::negate(cmp("is", "seen"))),
        );
        assert_eq!(
            tree.to_string(),
            r#"Or(from:alice, And(subject:"q3 report", NOT(is:seen)))"#
        );
        assert_eq!(tree.node_count(), 6);
    }

    #[test]
    fn operator_symbols_round_trip() {
        for symbol in [":", "=", "<", ">", "<=", ">="] {
            let op = Operator::from_symbol(symbol).expect("known operator");
            assert_eq!(op.symbol(), symbol);
        }
        assert!(Operator::from_symbol("=>").is_none());
    }
}
