//! Search executor, folder lister and message fetcher
//!
//! Everything here is generic over [`MailConnection`]; the caller owns the
//! connection and guarantees exclusive access for the whole operation.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::connection::{FetchedHeaders, ListedFolder, MailConnection};
use crate::errors::{AppError, AppResult};
use crate::headers::header_record;
use crate::models::{Folder, HeaderRecord};
use crate::query::CompiledCriteria;

/// Result of one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Messages the server matched
    pub total: usize,
    /// Header records for the retained matches, ascending UID order
    pub records: Vec<HeaderRecord>,
}

impl SearchOutcome {
    pub fn truncated(&self) -> bool {
        self.records.len() < self.total
    }
}

/// Run compiled criteria against `folder`
///
/// At most `limit` records are fetched; when more messages match, the
/// highest UIDs are kept. Headers are fetched `batch_size` UIDs at a time.
/// Messages expunged between the search and the fetch are skipped.
///
/// # Errors
///
/// - `Folder` if the folder cannot be opened
/// - `Protocol` if the server rejects the search
/// - `Timeout` for slow commands
pub async fn execute<C: MailConnection>(
    conn: &mut C,
    folder: &str,
    criteria: &CompiledCriteria,
    limit: usize,
    batch_size: usize,
) -> AppResult<SearchOutcome> {
    conn.select_folder(folder).await?;
    let uids = conn.search(criteria).await?;
    let total = uids.len();
    let kept = &uids[total.saturating_sub(limit)..];
    debug!(folder, total, kept = kept.len(), "search matched");

    let mut fetched: HashMap<u32, FetchedHeaders> = HashMap::with_capacity(kept.len());
    for batch in kept.chunks(batch_size.max(1)) {
        for headers in conn.fetch_headers(batch).await? {
            fetched.insert(headers.uid, headers);
        }
    }

    let mut records = Vec::with_capacity(kept.len());
    for uid in kept {
        match fetched.get(uid) {
            Some(headers) => records.push(header_record(headers)),
            None => warn!(folder, uid, "message vanished between search and fetch"),
        }
    }

    Ok(SearchOutcome { total, records })
}

/// Every folder the server lists, with its hierarchy path
///
/// # Errors
///
/// Returns `Protocol` or `Timeout` on transport failure.
pub async fn list_folders<C: MailConnection>(conn: &mut C) -> AppResult<Vec<Folder>> {
    let listed = conn.list_folders().await?;
    Ok(listed.into_iter().map(folder_from_listing).collect())
}

/// Raw RFC822 bytes of one message, read without setting `\Seen`
///
/// # Errors
///
/// - `Folder` if the folder cannot be opened
/// - `NotFound` if no message has `uid`
pub async fn fetch_body<C: MailConnection>(
    conn: &mut C,
    folder: &str,
    uid: u32,
) -> AppResult<Vec<u8>> {
    conn.select_folder(folder).await?;
    conn.fetch_body(uid)
        .await?
        .ok_or_else(|| AppError::NotFound {
            folder: folder.to_owned(),
            message_id: uid.to_string(),
        })
}

fn folder_from_listing(listed: ListedFolder) -> Folder {
    let path = match listed.delimiter.as_deref() {
        Some(delim) if !delim.is_empty() => listed
            .name
            .split(delim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => vec![listed.name.clone()],
    };
    Folder {
        name: listed.name,
        delimiter: listed.delimiter,
        path,
        attributes: listed.attributes,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{execute, fetch_body, list_folders};
    use crate::connection::{FetchedHeaders, ListedFolder, MailConnection};
    use crate::errors::{AppError, AppResult};
    use crate::query::{CompiledCriteria, compile_query};

    /// In-memory server: folders of UID → raw message
    #[derive(Default)]
    struct FakeServer {
        folders: BTreeMap<String, BTreeMap<u32, Vec<u8>>>,
        selected: Option<String>,
        /// UIDs returned by SEARCH regardless of criteria
        matches: Vec<u32>,
        reject_search: bool,
        searches: Vec<String>,
        header_batches: Vec<Vec<u32>>,
    }

    impl FakeServer {
        fn with_messages(folder: &str, uids: &[u32]) -> Self {
            let messages = uids
                .iter()
                .map(|uid| {
                    let raw = format!(
                        "From: sender{uid}@example.com\r\nSubject: message {uid}\r\n\r\nbody {uid}"
                    );
                    (*uid, raw.into_bytes())
                })
                .collect();
            let mut folders = BTreeMap::new();
            folders.insert(folder.to_owned(), messages);
            Self {
                folders,
                matches: uids.to_vec(),
                ..Self::default()
            }
        }

        fn selected_messages(&self) -> AppResult<&BTreeMap<u32, Vec<u8>>> {
            self.selected
                .as_ref()
                .and_then(|name| self.folders.get(name))
                .ok_or_else(|| AppError::Protocol("no folder selected".to_owned()))
        }
    }

    impl MailConnection for FakeServer {
        async fn list_folders(&mut self) -> AppResult<Vec<ListedFolder>> {
            Ok(self
                .folders
                .keys()
                .map(|name| ListedFolder {
                    name: name.clone(),
                    delimiter: Some("/".to_owned()),
                    attributes: Vec::new(),
                })
                .collect())
        }

        async fn select_folder(&mut self, folder: &str) -> AppResult<()> {
            if !self.folders.contains_key(folder) {
                return Err(AppError::Folder {
                    folder: folder.to_owned(),
                    reason: "Mailbox doesn't exist".to_owned(),
                });
            }
            self.selected = Some(folder.to_owned());
            Ok(())
        }

        async fn search(&mut self, criteria: &CompiledCriteria) -> AppResult<Vec<u32>> {
            self.searches.push(criteria.to_string());
            if self.reject_search {
                return Err(AppError::Protocol("BAD Invalid search criteria".to_owned()));
            }
            self.selected_messages()?;
            Ok(self.matches.clone())
        }

        async fn fetch_headers(&mut self, uids: &[u32]) -> AppResult<Vec<FetchedHeaders>> {
            self.header_batches.push(uids.to_vec());
            let messages = self.selected_messages()?;
            Ok(uids
                .iter()
                .filter_map(|uid| {
                    messages.get(uid).map(|raw| FetchedHeaders {
                        uid: *uid,
                        size: u32::try_from(raw.len()).ok(),
                        header_bytes: raw.clone(),
                    })
                })
                .collect())
        }

        async fn fetch_body(&mut self, uid: u32) -> AppResult<Option<Vec<u8>>> {
            Ok(self.selected_messages()?.get(&uid).cloned())
        }
    }

    fn criteria(raw: &str) -> CompiledCriteria {
        compile_query(raw).expect("compiles")
    }

    #[tokio::test]
    async fn returns_records_in_uid_order() {
        let mut server = FakeServer::with_messages("INBOX", &[3, 7, 12]);
        let outcome = execute(&mut server, "INBOX", &criteria("from:sender"), 50, 50)
            .await
            .expect("search succeeds");

        assert_eq!(outcome.total, 3);
        assert!(!outcome.truncated());
        let ids: Vec<&str> = outcome.records.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, ["3", "7", "12"]);
        assert_eq!(
            outcome.records[1].sender.as_deref(),
            Some("sender7@example.com")
        );
        assert_eq!(server.searches, ["FROM sender"]);
    }

    #[tokio::test]
    async fn empty_result_is_not_an_error() {
        let mut server = FakeServer::with_messages("INBOX", &[1, 2]);
        server.matches.clear();
        let outcome = execute(&mut server, "INBOX", &criteria("subject:nothing"), 50, 50)
            .await
            .expect("search succeeds");
        assert_eq!(outcome.total, 0);
        assert!(outcome.records.is_empty());
        assert!(server.header_batches.is_empty());
    }

    #[tokio::test]
    async fn limit_keeps_most_recent_matches() {
        let mut server = FakeServer::with_messages("INBOX", &[10, 11, 12, 13, 14]);
        let outcome = execute(&mut server, "INBOX", &CompiledCriteria::all(), 3, 50)
            .await
            .expect("search succeeds");
        assert_eq!(outcome.total, 5);
        assert!(outcome.truncated());
        let ids: Vec<&str> = outcome.records.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, ["12", "13", "14"]);
    }

    #[tokio::test]
    async fn headers_are_fetched_in_batches() {
        let mut server = FakeServer::with_messages("INBOX", &[1, 2, 3, 4, 5]);
        let outcome = execute(&mut server, "INBOX", &CompiledCriteria::all(), 50, 2)
            .await
            .expect("search succeeds");
        assert_eq!(outcome.records.len(), 5);
        let expected: Vec<Vec<u32>> = vec![vec![1, 2], vec![3, 4], vec![5]];
        assert_eq!(server.header_batches, expected);
    }

    #[tokio::test]
    async fn vanished_messages_are_skipped() {
        let mut server = FakeServer::with_messages("INBOX", &[1, 2, 3]);
        server.matches.push(4);
        let outcome = execute(&mut server, "INBOX", &CompiledCriteria::all(), 50, 50)
            .await
            .expect("search succeeds");
        assert_eq!(outcome.total, 4);
        assert_eq!(outcome.records.len(), 3);
    }

    #[tokio::test]
    async fn missing_folder_is_a_folder_error() {
        let mut server = FakeServer::with_messages("INBOX", &[1]);
        let err = execute(&mut server, "Nope", &CompiledCriteria::all(), 50, 50)
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::Folder { ref folder, .. } if folder == "Nope"));
        assert!(server.searches.is_empty());
    }

    #[tokio::test]
    async fn rejected_search_is_a_protocol_error() {
        let mut server = FakeServer::with_messages("INBOX", &[1]);
        server.reject_search = true;
        let err = execute(&mut server, "INBOX", &CompiledCriteria::all(), 50, 50)
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::Protocol(_)));
    }

    #[tokio::test]
    async fn fetch_returns_raw_bytes() {
        let mut server = FakeServer::with_messages("INBOX", &[42]);
        let raw = fetch_body(&mut server, "INBOX", 42)
            .await
            .expect("fetch succeeds");
        assert!(raw.ends_with(b"body 42"));
    }

    #[tokio::test]
    async fn fetching_unknown_uid_is_not_found() {
        let mut server = FakeServer::with_messages("INBOX", &[42]);
        let err = fetch_body(&mut server, "INBOX", 999_999)
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            AppError::NotFound { ref folder, ref message_id }
                if folder == "INBOX" && message_id == "999999"
        ));
    }

    #[tokio::test]
    async fn folders_carry_hierarchy_paths() {
        let mut server = FakeServer::with_messages("INBOX", &[]);
        server
            .folders
            .insert("Archive/2024".to_owned(), BTreeMap::new());
        let folders = list_folders(&mut server).await.expect("list succeeds");
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "Archive/2024");
        assert_eq!(folders[0].path, ["Archive", "2024"]);
        assert_eq!(folders[1].path, ["INBOX"]);
    }
}
