//! Input/output DTOs and schema-bearing types
//!
//! Defines all data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Mailbox folder as listed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Folder {
    /// Display name, decoded from modified UTF-7; pass this to `search`/`fetch`
    pub name: String,
    /// Hierarchy delimiter if the server reports one (e.g., `/`, `.`)
    pub delimiter: Option<String>,
    /// Name split on the delimiter (`["Archive", "2024"]`)
    pub path: Vec<String>,
    /// LIST attributes (e.g., `NoSelect`, `HasChildren`)
    pub attributes: Vec<String>,
}

/// Envelope headers of one search hit
///
/// Missing headers are `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HeaderRecord {
    /// Message UID in decimal; accepted by `fetch`
    pub message_id: String,
    /// Decoded From header
    pub sender: Option<String>,
    /// To addresses followed by Cc addresses
    pub recipients: Vec<String>,
    /// Decoded Subject header
    pub subject: Option<String>,
    /// Date header as RFC 3339 UTC when parseable, otherwise verbatim
    pub date: Option<String>,
    /// RFC822 size in octets
    pub size: Option<u32>,
    /// Message-ID header
    pub rfc822_message_id: Option<String>,
}

/// Output of `list_folders`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FolderList {
    pub folders: Vec<Folder>,
}

/// Output of `search`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResult {
    /// Folder that was searched
    pub folder: String,
    /// Query as submitted
    pub query: String,
    /// IMAP search criteria the query compiled to
    pub criteria: String,
    /// Number of messages the server matched
    pub total: usize,
    /// Whether `messages` holds fewer records than `total`
    pub truncated: bool,
    /// Header records in ascending UID order
    pub messages: Vec<HeaderRecord>,
}

/// Output of `fetch`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchResult {
    pub folder: String,
    /// Message UID in decimal
    pub message_id: String,
    /// Full message size in octets
    pub size_bytes: usize,
    /// Whether `content` was cut at `max_bytes`
    pub truncated: bool,
    pub encoding: ContentEncoding,
    /// Raw RFC822 source, possibly truncated
    pub content: String,
}

/// How raw message bytes are carried in [`FetchResult::content`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    /// UTF-8 text; invalid sequences are replaced
    #[default]
    Text,
    /// Standard base64 of the raw bytes
    Base64,
}

/// Input: search a folder with the query language
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchInput {
    /// Folder to search (e.g., `INBOX`, `Archive/2024`)
    pub folder: String,
    /// Query, e.g. `from:alice@example.com (subject:invoice OR subject:receipt) since:2024-01-01 NOT is:seen`.
    /// Fields: from/sender, to/recipient, cc, bcc, subject, body, text, since, before, on,
    /// date (with : = < > <= >=), size (< >, k/m suffix), message-id/msgid, is/flag.
    /// Adjacent terms are ANDed; OR, NOT and parentheses group. Empty matches all.
    #[serde(default)]
    pub query: String,
    /// Maximum records to return; the most recent matches are kept
    pub limit: Option<usize>,
}

/// Input: fetch one raw message
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FetchInput {
    /// Folder holding the message
    pub folder: String,
    /// `message_id` from a search result (`42`, or `42@INBOX`)
    pub message_id: String,
    /// Maximum message bytes to return (1024..1000000, default 200000)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    /// `text` (default) or `base64`
    #[serde(default)]
    pub encoding: ContentEncoding,
}

/// Default value for `max_bytes` in fetch
fn default_max_bytes() -> usize {
    200_000
}
