//! Envelope header decoding
//!
//! Turns the header block returned by a `HEADER.FIELDS` fetch into a
//! [`HeaderRecord`] using `mailparse`. Only header fields are read; message
//! bodies are never decoded here.

use chrono::{DateTime, Utc};
use mailparse::{MailAddr, MailHeader, MailHeaderMap, SingleInfo};
use tracing::warn;

use crate::connection::FetchedHeaders;
use crate::models::HeaderRecord;

/// Build the search-result record for one fetched message
///
/// Missing headers become `None`; `recipients` lists `To` then `Cc`.
/// Unparseable header blocks yield a record with only the UID and size.
pub fn header_record(fetched: &FetchedHeaders) -> HeaderRecord {
    let headers = match mailparse::parse_headers(&fetched.header_bytes) {
        Ok((headers, _)) => headers,
        Err(e) => {
            warn!(uid = fetched.uid, error = %e, "unparseable header block");
            Vec::new()
        }
    };

    let mut recipients = addresses(&headers, "To");
    recipients.extend(addresses(&headers, "Cc"));

    HeaderRecord {
        message_id: fetched.uid.to_string(),
        sender: non_empty(headers.get_first_value("From")),
        recipients,
        subject: non_empty(headers.get_first_value("Subject")),
        date: non_empty(headers.get_first_value("Date")).map(|raw| normalize_date(&raw)),
        size: fetched.size,
        rfc822_message_id: non_empty(headers.get_first_value("Message-ID")),
    }
}

/// Every address in every `name` header, rendered as `Name <addr>` or `addr`
fn addresses(headers: &[MailHeader<'_>], name: &str) -> Vec<String> {
    let mut out = Vec::new();
    for header in headers.get_all_headers(name) {
        match mailparse::addrparse_header(header) {
            Ok(list) => {
                for addr in list.iter() {
                    match addr {
                        MailAddr::Single(info) => out.push(render(info)),
                        MailAddr::Group(group) => out.extend(group.addrs.iter().map(render)),
                    }
                }
            }
            Err(_) => {
                if let Some(raw) = non_empty(Some(header.get_value())) {
                    out.push(raw);
                }
            }
        }
    }
    out
}

fn render(info: &SingleInfo) -> String {
    match &info.display_name {
        Some(name) => format!("{name} <{}>", info.addr),
        None => info.addr.clone(),
    }
}

/// RFC 3339 in UTC when the header parses, otherwise the header as sent
fn normalize_date(raw: &str) -> String {
    DateTime::parse_from_rfc2822(raw.trim())
        .map_or_else(|_| raw.to_owned(), |dt| dt.with_timezone(&Utc).to_rfc3339())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
