//! IMAP transport and session operations
//!
//! [`ImapConnection`] implements [`MailConnection`] over `async-imap`. Every
//! network call is bounded by a timeout derived from server config, and all
//! connections use TLS, either from the first byte or after `STARTTLS`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_imap::error::Error as ImapError;
use async_imap::types::{Fetch, Name};
use async_imap::{Client, Session};
use futures::TryStreamExt;
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};
use utf7_imap::{decode_utf7_imap, encode_utf7_imap};

use crate::config::ServerConfig;
use crate::connection::{FetchedHeaders, ListedFolder, MailConnection};
use crate::errors::{AppError, AppResult};
use crate::query::CompiledCriteria;

/// Authenticated IMAP session over TLS
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

/// Header fields requested for search results
const HEADER_FETCH: &str = "UID RFC822.SIZE BODY.PEEK[HEADER.FIELDS (MESSAGE-ID DATE FROM TO CC SUBJECT)]";
/// Full message without setting `\Seen`
const BODY_FETCH: &str = "UID BODY.PEEK[]";

/// Live IMAP session plus the limits applied to each command
pub struct ImapConnection {
    session: ImapSession,
    socket_timeout: Duration,
}

impl ImapConnection {
    /// Connect to the configured server and authenticate
    ///
    /// Performs full connection sequence with timeouts:
    /// 1. TCP connect (`connect_timeout_ms`)
    /// 2. With `starttls`: read the greeting in plaintext, then `STARTTLS`
    /// 3. TLS handshake with webpki roots (`greeting_timeout_ms`)
    /// 4. Without `starttls`: read the greeting over TLS
    /// 5. LOGIN (`greeting_timeout_ms`)
    ///
    /// All phases after the TCP connect use `greeting_timeout_ms`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `secure` is false or hostname is invalid for TLS SNI
    /// - `Timeout` if any connection phase times out
    /// - `AuthFailed` if the server rejects the credentials
    /// - `Protocol` for TCP, TLS, or greeting failures
    pub async fn connect(config: &ServerConfig) -> AppResult<Self> {
        if !config.secure {
            return Err(AppError::invalid(
                "insecure IMAP is not supported; set IMAP_SECURE=true",
            ));
        }

        let connect_duration = Duration::from_millis(config.connect_timeout_ms);
        let greeting_duration = Duration::from_millis(config.greeting_timeout_ms);

        let tcp = within(
            connect_duration,
            "tcp connect",
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await?
        .map_err(|e| AppError::Protocol(format!("tcp connect failed: {e}")))?;
        let tcp = if config.starttls {
            upgrade_plaintext(tcp, greeting_duration).await?
        } else {
            tcp
        };

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));

        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|_| AppError::invalid("invalid IMAP host for TLS SNI"))?;
        let tls_stream = within(
            greeting_duration,
            "TLS handshake",
            connector.connect(server_name, tcp),
        )
        .await?
        .map_err(|e| AppError::Protocol(format!("TLS handshake failed: {e}")))?;

        let mut client = Client::new(tls_stream);
        if !config.starttls {
            check_greeting(
                within(greeting_duration, "IMAP greeting", client.read_response()).await?,
            )?;
        }

        let pass = config.password.expose_secret();
        let session = within(
            greeting_duration,
            "IMAP login",
            client.login(config.user.as_str(), pass),
        )
        .await?
        .map_err(|(e, _)| match e {
            ImapError::No(msg) | ImapError::Bad(msg) => AppError::AuthFailed(msg),
            other => AppError::Protocol(format!("IMAP login failed: {other}")),
        })?;

        info!(
            host = %config.host,
            port = config.port,
            user = %config.user,
            starttls = config.starttls,
            "IMAP session established"
        );
        Ok(Self {
            session,
            socket_timeout: Duration::from_millis(config.socket_timeout_ms),
        })
    }

    async fn uid_fetch(&mut self, uid_set: String, query: &str) -> AppResult<Vec<Fetch>> {
        let stream = within(
            self.socket_timeout,
            "UID FETCH",
            self.session.uid_fetch(uid_set, query),
        )
        .await?
        .map_err(|e| AppError::Protocol(format!("UID FETCH failed: {e}")))?;
        within(self.socket_timeout, "UID FETCH stream", stream.try_collect())
            .await?
            .map_err(|e| AppError::Protocol(format!("UID FETCH stream failed: {e}")))
    }
}

/// Read the plaintext greeting, send `STARTTLS` and hand back the socket
async fn upgrade_plaintext(tcp: TcpStream, limit: Duration) -> AppResult<TcpStream> {
    let mut client = Client::new(tcp);
    check_greeting(within(limit, "IMAP greeting", client.read_response()).await?)?;
    within(
        limit,
        "STARTTLS",
        client.run_command_and_check_ok("STARTTLS", None),
    )
    .await?
    .map_err(|e| AppError::Protocol(format!("STARTTLS rejected: {e}")))?;
    debug!("STARTTLS accepted, upgrading");
    Ok(client.into_inner())
}

/// The server must send a greeting before anything else
fn check_greeting<R, E: std::fmt::Display>(greeting: Result<Option<R>, E>) -> AppResult<()> {
    match greeting {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(AppError::Protocol(
            "IMAP server closed connection before greeting".to_owned(),
        )),
        Err(e) => Err(AppError::Protocol(format!("IMAP greeting failed: {e}"))),
    }
}

impl MailConnection for ImapConnection {
    async fn list_folders(&mut self) -> AppResult<Vec<ListedFolder>> {
        let stream = within(
            self.socket_timeout,
            "LIST",
            self.session.list(None, Some("*")),
        )
        .await?
        .map_err(|e| AppError::Protocol(format!("LIST failed: {e}")))?;
        let names: Vec<Name> = within(self.socket_timeout, "LIST stream", stream.try_collect())
            .await?
            .map_err(|e| AppError::Protocol(format!("LIST stream failed: {e}")))?;
        Ok(names.iter().map(listed_folder).collect())
    }

    async fn select_folder(&mut self, folder: &str) -> AppResult<()> {
        let wire_name = encode_utf7_imap(folder.to_owned());
        let result = within(
            self.socket_timeout,
            "EXAMINE",
            self.session.examine(&wire_name),
        )
        .await?;
        match result {
            Ok(mailbox) => {
                debug!(folder, exists = mailbox.exists, "folder opened read-only");
                Ok(())
            }
            Err(ImapError::No(reason) | ImapError::Bad(reason)) => Err(AppError::Folder {
                folder: folder.to_owned(),
                reason,
            }),
            Err(e) => Err(AppError::Protocol(format!("EXAMINE failed: {e}"))),
        }
    }

    async fn search(&mut self, criteria: &CompiledCriteria) -> AppResult<Vec<u32>> {
        let query = search_command(criteria);
        let set = within(
            self.socket_timeout,
            "UID SEARCH",
            self.session.uid_search(&query),
        )
        .await?
        .map_err(|e| AppError::Protocol(format!("UID SEARCH rejected: {e}")))?;
        let mut uids: Vec<u32> = set.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_headers(&mut self, uids: &[u32]) -> AppResult<Vec<FetchedHeaders>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let fetches = self.uid_fetch(uid_set(uids), HEADER_FETCH).await?;
        Ok(fetches
            .iter()
            .filter_map(|fetch| {
                let uid = fetch.uid?;
                let header_bytes = fetch.header().or_else(|| fetch.body()).unwrap_or_default();
                Some(FetchedHeaders {
                    uid,
                    size: fetch.size,
                    header_bytes: header_bytes.to_vec(),
                })
            })
            .collect())
    }

    async fn fetch_body(&mut self, uid: u32) -> AppResult<Option<Vec<u8>>> {
        let fetches = self.uid_fetch(uid.to_string(), BODY_FETCH).await?;
        Ok(fetches
            .iter()
            .find(|fetch| fetch.uid == Some(uid))
            .and_then(|fetch| fetch.body().map(<[u8]>::to_vec)))
    }
}

/// Await `fut`, turning an elapsed deadline into `AppError::Timeout`
async fn within<F: Future>(limit: Duration, what: &str, fut: F) -> AppResult<F::Output> {
    timeout(limit, fut)
        .await
        .map_err(|_| AppError::Timeout(format!("{what} timed out")))
}

/// Search command text; non-ASCII criteria need an explicit charset
fn search_command(criteria: &CompiledCriteria) -> String {
    if criteria.is_ascii() {
        criteria.to_string()
    } else {
        format!("CHARSET UTF-8 {criteria}")
    }
}

/// Comma-separated UID set (`3,7,12`)
fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn listed_folder(name: &Name) -> ListedFolder {
    ListedFolder {
        name: decode_utf7_imap(name.name().to_owned()),
        delimiter: name.delimiter().map(|d| d.to_string()),
        attributes: name
            .attributes()
            .iter()
            .map(|attr| format!("{attr:?}"))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{search_command, uid_set};
    use crate::query::compile_query;

    #[test]
    fn ascii_search_has_no_charset() {
        let criteria = compile_query("from:alice subject:invoice").expect("compiles");
        assert_eq!(search_command(&criteria), "FROM alice SUBJECT invoice");
    }

    #[test]
    fn non_ascii_search_declares_utf8() {
        let criteria = compile_query("subject:café").expect("compiles");
        assert_eq!(search_command(&criteria), "CHARSET UTF-8 SUBJECT \"café\"");
    }

    #[test]
    fn uid_sets_are_comma_separated() {
        assert_eq!(uid_set(&[3, 7, 12]), "3,7,12");
        assert_eq!(uid_set(&[42]), "42");
    }
}
