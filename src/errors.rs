//! Application error model with MCP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to the appropriate MCP `ErrorData` type for protocol
//! compliance.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

use crate::query::QueryError;

/// Application error type
///
/// Query mistakes and bad tool arguments are caller errors; folder and
/// message lookups are resource errors; everything else is a transport or
/// server failure. Nothing is retried here.
#[derive(Debug, Error)]
pub enum AppError {
    /// Query text failed to lex, parse, or validate
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Invalid tool argument outside the query itself
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Folder does not exist or cannot be opened
    #[error("folder '{folder}' is not available: {reason}")]
    Folder { folder: String, reason: String },
    /// Message identifier does not resolve in the folder
    #[error("message {message_id} not found in folder '{folder}'")]
    NotFound { folder: String, message_id: String },
    /// Server rejected a command or the transport failed
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Operation timeout (TCP connect, TLS handshake, IMAP response)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Authentication failure (bad credentials, account disabled)
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the session that produced this error should be discarded
    ///
    /// Caller and resource errors leave the connection usable; transport
    /// failures do not.
    pub fn breaks_session(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::Timeout(_) | Self::AuthFailed(_) | Self::Internal(_)
        )
    }

    /// Convert to MCP `ErrorData`
    ///
    /// # Mappings
    ///
    /// - `Query`, `InvalidInput` → `invalid_params`
    /// - `Folder`, `NotFound` → `resource_not_found`
    /// - `AuthFailed` → `invalid_request`
    /// - `Protocol`, `Timeout`, `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        let msg = self.to_string();
        match self {
            Self::Query(err) => ErrorData::invalid_params(msg, Some(err.context())),
            Self::InvalidInput(_) => {
                ErrorData::invalid_params(msg, Some(json!({ "code": "invalid_input" })))
            }
            Self::Folder { folder, .. } => ErrorData::resource_not_found(
                msg,
                Some(json!({ "code": "folder_error", "folder": folder })),
            ),
            Self::NotFound { folder, message_id } => ErrorData::resource_not_found(
                msg,
                Some(json!({
                    "code": "not_found",
                    "folder": folder,
                    "message_id": message_id,
                })),
            ),
            Self::Protocol(_) => {
                ErrorData::internal_error(msg, Some(json!({ "code": "protocol_error" })))
            }
            Self::Timeout(_) => ErrorData::internal_error(msg, Some(json!({ "code": "timeout" }))),
            Self::AuthFailed(_) => {
                ErrorData::invalid_request(msg, Some(json!({ "code": "auth_failed" })))
            }
            Self::Internal(_) => {
                ErrorData::internal_error(msg, Some(json!({ "code": "internal" })))
            }
        }
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;
    use crate::query::QueryError;

    #[test]
    fn query_errors_keep_their_context() {
        let err: AppError = QueryError::validation("unknownfield", "unknown field").into();
        let data = err.to_error_data();
        let ctx = data.data.expect("context attached");
        assert_eq!(ctx["code"], "validation_error");
        assert_eq!(ctx["field"], "unknownfield");
        assert!(!err.breaks_session());
    }

    #[test]
    fn not_found_names_folder_and_message() {
        let err = AppError::NotFound {
            folder: "INBOX".to_owned(),
            message_id: "42".to_owned(),
        };
        assert_eq!(err.to_string(), "message 42 not found in folder 'INBOX'");
        let ctx = err.to_error_data().data.expect("context attached");
        assert_eq!(ctx["folder"], "INBOX");
        assert_eq!(ctx["message_id"], "42");
    }

    #[test]
    fn transport_failures_break_the_session() {
        assert!(AppError::Protocol("BAD".to_owned()).breaks_session());
        assert!(AppError::Timeout("UID SEARCH timed out".to_owned()).breaks_session());
        assert!(
            !AppError::Folder {
                folder: "Nope".to_owned(),
                reason: "NO".to_owned(),
            }
            .breaks_session()
        );
    }
}
