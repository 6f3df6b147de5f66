//! Message identifier parsing
//!
//! Search results identify messages by UID within the searched folder. The
//! `fetch` tool accepts that bare UID (`42`) or the folder-qualified form
//! `42@INBOX`; folder names may themselves contain `@`.

use crate::errors::{AppError, AppResult};

/// Reference to one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    /// Message UID within the folder
    pub uid: u32,
    /// Folder named in the identifier, if qualified
    pub folder: Option<String>,
}

impl MessageRef {
    /// Parse `42` or `42@INBOX`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the UID part is not a positive integer or
    /// the folder part is empty.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let raw = raw.trim();
        let (uid_part, folder) = match raw.split_once('@') {
            Some((uid, folder)) if folder.is_empty() => {
                return Err(AppError::invalid(format!(
                    "message_id '{uid}@' has an empty folder"
                )));
            }
            Some((uid, folder)) => (uid, Some(folder.to_owned())),
            None => (raw, None),
        };

        let uid = uid_part
            .parse::<u32>()
            .ok()
            .filter(|uid| *uid > 0)
            .ok_or_else(|| {
                AppError::invalid(format!(
                    "message_id must be a positive UID such as '42' or '42@INBOX', got '{raw}'"
                ))
            })?;

        Ok(Self { uid, folder })
    }

    /// UID to fetch from `folder`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the identifier names a different folder.
    pub fn uid_in(&self, folder: &str) -> AppResult<u32> {
        match &self.folder {
            Some(named) if named != folder => Err(AppError::invalid(format!(
                "message_id refers to folder '{named}' but folder is '{folder}'"
            ))),
            _ => Ok(self.uid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MessageRef;

    #[test]
    fn parses_bare_uid() {
        let id = MessageRef::parse("42").expect("parse succeeds");
        assert_eq!(id.uid, 42);
        assert_eq!(id.folder, None);
        assert_eq!(id.uid_in("Archive").expect("any folder"), 42);
    }

    #[test]
    fn parses_folder_qualified_uid() {
        let id = MessageRef::parse("42@INBOX").expect("parse succeeds");
        assert_eq!(id.uid, 42);
        assert_eq!(id.folder.as_deref(), Some("INBOX"));
        assert_eq!(id.uid_in("INBOX").expect("same folder"), 42);

        let id = MessageRef::parse("7@Lists/dev@example.com").expect("parse succeeds");
        assert_eq!(id.folder.as_deref(), Some("Lists/dev@example.com"));
    }

    #[test]
    fn rejects_folder_mismatch() {
        let id = MessageRef::parse("42@INBOX").expect("parse succeeds");
        let err = id.uid_in("Sent").expect_err("must fail");
        assert!(err.to_string().contains("refers to folder 'INBOX'"));
    }

    #[test]
    fn rejects_malformed_ids() {
        for raw in ["", "abc", "0", "-3", "42@", "imap:default:INBOX:1:2"] {
            assert!(MessageRef::parse(raw).is_err(), "{raw} should be rejected");
        }
    }
}
