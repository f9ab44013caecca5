//! IMAP mailbox over TLS.
//!
//! Messages are addressed by UID. Listings fetch only `INTERNALDATE` and
//! the header block; bodies are fetched one message at a time with
//! `BODY.PEEK[]` so nothing is marked as seen.

use std::net::TcpStream;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use super::MailStore;
use crate::error::{FetchError, Result};
use crate::fetch::range::DateRange;
use crate::model::message::{BodyPart, Envelope};
use crate::parser::date::imap_search_date;
use crate::parser::mime::{parse_body, parse_envelope};

/// UIDs per `UID FETCH` command when listing envelopes.
const FETCH_CHUNK: usize = 500;

type Session = imap::Session<TlsStream<TcpStream>>;

/// Mailbox on an IMAP server.
pub struct ImapStore {
    session: Option<Session>,
    host: String,
}

impl ImapStore {
    /// Connect and log in. `implicit_tls` selects IMAPS; otherwise the
    /// plain connection is upgraded with STARTTLS.
    pub fn connect(
        host: &str,
        port: u16,
        implicit_tls: bool,
        user: &str,
        password: &str,
    ) -> Result<Self> {
        let tls = TlsConnector::builder().build()?;
        let client = if implicit_tls {
            imap::connect((host, port), host, &tls)?
        } else {
            imap::connect_starttls((host, port), host, &tls)?
        };

        let session = client
            .login(user, password)
            .map_err(|(e, _client)| FetchError::Connection(format!("login as {user} failed: {e}")))?;

        info!(host, port, user, "Connected to IMAP server");
        Ok(Self {
            session: Some(session),
            host: host.to_string(),
        })
    }

    fn session(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| FetchError::Connection("IMAP session is closed".into()))
    }

    /// Header-only envelopes for `uids` (ascending).
    fn envelopes(&mut self, uids: &[u32]) -> Result<Vec<Envelope>> {
        let session = self.session()?;
        let mut out = Vec::with_capacity(uids.len());

        for chunk in uids.chunks(FETCH_CHUNK) {
            let fetches = session.uid_fetch(uid_set(chunk), "(UID INTERNALDATE BODY.PEEK[HEADER])")?;
            for fetch in fetches.iter() {
                let Some(uid) = fetch.uid else { continue };
                let received = fetch.internal_date().map(|d| d.with_timezone(&Utc));
                match parse_envelope(fetch.header().unwrap_or_default(), u64::from(uid), received) {
                    Ok(envelope) => out.push(envelope),
                    Err(e) => warn!(uid, error = %e, "Skipping unreadable message"),
                }
            }
        }

        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    fn uid_search(&mut self, query: &str) -> Result<Vec<u32>> {
        let mut uids: Vec<u32> = self.session()?.uid_search(query)?.into_iter().collect();
        uids.sort_unstable();
        debug!(query, hits = uids.len(), "IMAP search");
        Ok(uids)
    }
}

impl MailStore for ImapStore {
    fn open_folder(&mut self, name: &str, read_only: bool) -> Result<()> {
        let session = self.session()?;
        let mailbox = if read_only {
            session.examine(name)?
        } else {
            session.select(name)?
        };
        info!(folder = name, exists = mailbox.exists, read_only, "Opened IMAP folder");
        Ok(())
    }

    fn search(&mut self, range: &DateRange) -> Result<Option<Vec<Envelope>>> {
        let query = search_query(range);
        let uids = self.uid_search(&query)?;
        let envelopes = self.envelopes(&uids)?;
        // SINCE/BEFORE work on whole days; trim to the exact bounds.
        Ok(Some(
            envelopes
                .into_iter()
                .filter(|e| range.contains(e.received))
                .collect(),
        ))
    }

    fn messages(&mut self) -> Result<Vec<Envelope>> {
        let uids = self.uid_search("ALL")?;
        self.envelopes(&uids)
    }

    fn fetch_body(&mut self, envelope: &Envelope) -> Result<BodyPart> {
        let uid = envelope.id.to_string();
        let fetches = self.session()?.uid_fetch(&uid, "BODY.PEEK[]")?;
        let raw = fetches
            .iter()
            .find_map(|f| f.body())
            .ok_or_else(|| FetchError::Mime(format!("server returned no body for UID {uid}")))?;
        parse_body(raw)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.logout()?;
            debug!(host = %self.host, "Logged out");
        }
        Ok(())
    }
}

impl Drop for ImapStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "Logout on drop failed");
        }
    }
}

/// `UID SEARCH` criteria for a received-date range.
///
/// `BEFORE` is exclusive, so an inclusive end date searches before the
/// following day.
fn search_query(range: &DateRange) -> String {
    let mut terms = Vec::new();
    if let Some(day) = range.from().and_then(search_day) {
        terms.push(format!("SINCE {}", imap_search_date(day)));
    }
    if let Some(day) = range.to().and_then(search_day) {
        let next = day.checked_add_days(Days::new(1)).unwrap_or(day);
        terms.push(format!("BEFORE {}", imap_search_date(next)));
    }
    if terms.is_empty() {
        "ALL".to_string()
    } else {
        terms.join(" ")
    }
}

/// The UTC day of a bound, when IMAP can express it (four-digit years).
/// Other bounds are left to the client-side range check.
fn search_day(instant: DateTime<Utc>) -> Option<NaiveDate> {
    let day = instant.date_naive();
    (1..=9999).contains(&day.year()).then_some(day)
}

/// Compact an ascending UID list into a sequence set: `1:3,7,9:10`.
fn uid_set(uids: &[u32]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = uids.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        parts.push(if start == end {
            start.to_string()
        } else {
            format!("{start}:{end}")
        });
    }
    parts.join(",")
}
