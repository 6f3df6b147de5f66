//! Mail transport seam
//!
//! Core operations in [`crate::mailbox`] are written against
//! [`MailConnection`] so they run unchanged over a live IMAP session or an
//! in-memory fake.

use std::future::Future;

use crate::errors::AppResult;
use crate::query::CompiledCriteria;

/// One entry of a folder listing, name already decoded for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFolder {
    pub name: String,
    pub delimiter: Option<String>,
    pub attributes: Vec<String>,
}

/// Header fields and size for one message, as returned by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedHeaders {
    pub uid: u32,
    pub size: Option<u32>,
    pub header_bytes: Vec<u8>,
}

/// Transport primitives over one authenticated session
///
/// Commands on a connection never interleave: every method takes `&mut self`.
/// A folder stays selected until the next [`select_folder`](Self::select_folder).
pub trait MailConnection: Send {
    /// `LIST "" *`
    fn list_folders(&mut self) -> impl Future<Output = AppResult<Vec<ListedFolder>>> + Send;

    /// Open `folder` read-only; `AppError::Folder` when it cannot be opened
    fn select_folder(&mut self, folder: &str) -> impl Future<Output = AppResult<()>> + Send;

    /// `UID SEARCH` in the selected folder, UIDs in ascending order
    fn search(
        &mut self,
        criteria: &CompiledCriteria,
    ) -> impl Future<Output = AppResult<Vec<u32>>> + Send;

    /// Header fields and size for `uids`; UIDs the server no longer has are
    /// simply absent from the result
    fn fetch_headers(
        &mut self,
        uids: &[u32],
    ) -> impl Future<Output = AppResult<Vec<FetchedHeaders>>> + Send;

    /// Full raw message, `None` when the UID does not resolve
    fn fetch_body(&mut self, uid: u32) -> impl Future<Output = AppResult<Option<Vec<u8>>>> + Send;
}
