//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers three tools:
//! `list_folders`, `search` and `fetch`. Handles input validation, owns the
//! single IMAP session, and formats responses.

use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::imap::ImapConnection;
use crate::mailbox;
use crate::message_id::MessageRef;
use crate::models::{
    ContentEncoding, FetchInput, FetchResult, FolderList, Meta, SearchInput, SearchResult,
    ToolEnvelope,
};
use crate::query;

/// Longest query text accepted
const MAX_QUERY_CHARS: usize = 4_096;
/// Bounds for `fetch.max_bytes`
const MIN_FETCH_BYTES: usize = 1_024;
const MAX_FETCH_BYTES: usize = 1_000_000;

/// IMAP query MCP server
///
/// Holds shared configuration and the lazily opened IMAP session. Every tool
/// call locks the session for its whole duration so commands never interleave.
#[derive(Clone)]
pub struct MailQueryServer {
    /// Server config (account, timeouts, limits)
    config: Arc<ServerConfig>,
    /// Live session, `None` until first use or after a transport failure
    connection: Arc<Mutex<Option<ImapConnection>>>,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MailQueryServer {
    /// Create a new MCP server instance; no connection is made yet
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            connection: Arc::new(Mutex::new(None)),
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: List mailbox folders
    #[tool(
        name = "list_folders",
        description = "List mailbox folders with their hierarchy path and attributes"
    )]
    async fn list_folders(&self) -> Result<Json<ToolEnvelope<FolderList>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.list_folders_impl()
                .await
                .map(|data| (format!("{} folder(s)", data.folders.len()), data)),
        )
    }

    /// Tool: Search a folder with the query language
    #[tool(
        name = "search",
        description = "Search a folder with a query such as `from:alice (subject:invoice OR subject:receipt) since:2024-01-01 NOT is:seen` and return envelope headers"
    )]
    async fn search(
        &self,
        Parameters(input): Parameters<SearchInput>,
    ) -> Result<Json<ToolEnvelope<SearchResult>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.search_impl(input).await.map(|data| {
                let summary = if data.truncated {
                    format!(
                        "{} of {} matching message(s) returned",
                        data.messages.len(),
                        data.total
                    )
                } else {
                    format!("{} message(s) returned", data.messages.len())
                };
                (summary, data)
            }),
        )
    }

    /// Tool: Fetch one raw message
    #[tool(
        name = "fetch",
        description = "Fetch the raw RFC822 source of one message by the message_id returned from search"
    )]
    async fn fetch(
        &self,
        Parameters(input): Parameters<FetchInput>,
    ) -> Result<Json<ToolEnvelope<FetchResult>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.fetch_impl(input).await.map(|data| {
                (
                    format!(
                        "message {} in '{}' ({} bytes)",
                        data.message_id, data.folder, data.size_bytes
                    ),
                    data,
                )
            }),
        )
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for MailQueryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Read-only IMAP server. Call list_folders, then search a folder with the query language, then fetch a message_id from the results.",
        )
    }
}

/// Tool implementation methods
///
/// Private methods handle the actual business logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl MailQueryServer {
    async fn list_folders_impl(&self) -> AppResult<FolderList> {
        let mut guard = self.connection.lock().await;
        let conn = self.ensure_connected(&mut guard).await?;
        let result = mailbox::list_folders(conn).await;
        let folders = release_on_failure(&mut guard, result)?;
        Ok(FolderList { folders })
    }

    async fn search_impl(&self, input: SearchInput) -> AppResult<SearchResult> {
        validate_folder(&input.folder)?;
        validate_query(&input.query)?;
        let limit = self.config.search_limit(input.limit)?;
        let criteria = query::compile_query(&input.query)?;
        debug!(folder = %input.folder, query = %input.query, criteria = %criteria, "compiled search");

        let mut guard = self.connection.lock().await;
        let conn = self.ensure_connected(&mut guard).await?;
        let result = mailbox::execute(
            conn,
            &input.folder,
            &criteria,
            limit,
            self.config.fetch_batch_size,
        )
        .await;
        let outcome = release_on_failure(&mut guard, result)?;

        Ok(SearchResult {
            truncated: outcome.truncated(),
            total: outcome.total,
            messages: outcome.records,
            criteria: criteria.to_string(),
            folder: input.folder,
            query: input.query,
        })
    }

    async fn fetch_impl(&self, input: FetchInput) -> AppResult<FetchResult> {
        validate_folder(&input.folder)?;
        validate_range(input.max_bytes, MIN_FETCH_BYTES, MAX_FETCH_BYTES, "max_bytes")?;
        let uid = MessageRef::parse(&input.message_id)?.uid_in(&input.folder)?;

        let mut guard = self.connection.lock().await;
        let conn = self.ensure_connected(&mut guard).await?;
        let result = mailbox::fetch_body(conn, &input.folder, uid).await;
        let raw = release_on_failure(&mut guard, result)?;
        drop(guard);

        let (content, truncated) = encode_content(&raw, input.max_bytes, input.encoding);
        Ok(FetchResult {
            folder: input.folder,
            message_id: uid.to_string(),
            size_bytes: raw.len(),
            truncated,
            encoding: input.encoding,
            content,
        })
    }

    /// Open the session if there is none yet
    async fn ensure_connected<'a>(
        &self,
        slot: &'a mut Option<ImapConnection>,
    ) -> AppResult<&'a mut ImapConnection> {
        if slot.is_none() {
            *slot = Some(ImapConnection::connect(&self.config).await?);
        }
        slot.as_mut()
            .ok_or_else(|| AppError::Internal("IMAP session unavailable".to_owned()))
    }
}

/// Drop the session after a transport failure so the next call reconnects
fn release_on_failure<T>(slot: &mut Option<ImapConnection>, result: AppResult<T>) -> AppResult<T> {
    if let Err(e) = &result
        && e.breaks_session()
    {
        warn!(error = %e, "dropping IMAP session after failure");
        *slot = None;
    }
    result
}

/// Render at most `max_bytes` of the message; the flag reports a cut
fn encode_content(raw: &[u8], max_bytes: usize, encoding: ContentEncoding) -> (String, bool) {
    let kept = &raw[..raw.len().min(max_bytes)];
    let content = match encoding {
        ContentEncoding::Text => String::from_utf8_lossy(kept).into_owned(),
        ContentEncoding::Base64 => STANDARD.encode(kept),
    };
    (content, kept.len() < raw.len())
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}

/// Validate folder name format
fn validate_folder(folder: &str) -> AppResult<()> {
    if folder.is_empty() || folder.chars().count() > 256 {
        return Err(AppError::InvalidInput(
            "folder must be 1..256 characters".to_owned(),
        ));
    }
    validate_no_controls(folder, "folder")
}

/// Bound raw query length; the query pipeline checks everything else
fn validate_query(query: &str) -> AppResult<()> {
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(AppError::InvalidInput(format!(
            "query must be at most {MAX_QUERY_CHARS} characters"
        )));
    }
    Ok(())
}

/// Reject IMAP control characters in user-provided values
fn validate_no_controls(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

/// Validate numeric value in range
fn validate_range(value: usize, min: usize, max: usize, field: &str) -> AppResult<()> {
    if value < min || value > max {
        return Err(AppError::InvalidInput(format!(
            "{field} must be in range {min}..{max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use super::{
        encode_content, release_on_failure, validate_folder, validate_query, validate_range,
    };
    use crate::errors::{AppError, AppResult};
    use crate::models::ContentEncoding;

    #[test]
    fn rejects_control_chars_in_folder() {
        let err = validate_folder("INBOX\r\nA1 DELETE INBOX").expect_err("must fail");
        assert!(err.to_string().contains("control characters"));
        assert!(validate_folder("").is_err());
        assert!(validate_folder("Archive/2024").is_ok());
    }

    #[test]
    fn bounds_query_length() {
        assert!(validate_query("from:alice").is_ok());
        assert!(validate_query(&"a".repeat(5_000)).is_err());
    }

    #[test]
    fn max_bytes_range() {
        assert!(validate_range(200_000, 1_024, 1_000_000, "max_bytes").is_ok());
        assert!(validate_range(10, 1_024, 1_000_000, "max_bytes").is_err());
    }

    #[test]
    fn content_is_cut_at_max_bytes() {
        let raw = b"Subject: hi\r\n\r\nbody";
        let len = raw.len();

        let (content, truncated) = encode_content(raw, len, ContentEncoding::Text);
        assert_eq!(content, "Subject: hi\r\n\r\nbody");
        assert!(!truncated);

        let (content, truncated) = encode_content(raw, len + 1, ContentEncoding::Text);
        assert_eq!(content.len(), len);
        assert!(!truncated);

        let (content, truncated) = encode_content(raw, len - 1, ContentEncoding::Text);
        assert_eq!(content, "Subject: hi\r\n\r\nbod");
        assert!(truncated);
    }

    #[test]
    fn base64_content_decodes_to_kept_bytes() {
        let raw: Vec<u8> = (0u8..=255).collect();

        let (content, truncated) = encode_content(&raw, 1_024, ContentEncoding::Base64);
        assert!(!truncated);
        assert_eq!(STANDARD.decode(content).expect("valid base64"), raw);

        let (content, truncated) = encode_content(&raw, 100, ContentEncoding::Base64);
        assert!(truncated);
        assert_eq!(STANDARD.decode(content).expect("valid base64"), &raw[..100]);
    }

    #[test]
    fn text_content_replaces_invalid_utf8() {
        let (content, truncated) = encode_content(b"a\xffb", 1_024, ContentEncoding::Text);
        assert_eq!(content, "a\u{FFFD}b");
        assert!(!truncated);

        // "é" is two bytes; cutting after the first leaves a partial sequence
        let (content, truncated) = encode_content("xé".as_bytes(), 2, ContentEncoding::Text);
        assert_eq!(content, "x\u{FFFD}");
        assert!(truncated);
    }

    #[test]
    fn caller_errors_keep_empty_slot_empty() {
        let mut slot = None;
        let result: AppResult<()> = Err(AppError::invalid("bad"));
        assert!(release_on_failure(&mut slot, result).is_err());
        assert!(slot.is_none());
    }
}
