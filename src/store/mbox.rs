//! Local MBOX files as a mailbox.
//!
//! The store root is a directory; each folder is an MBOX file inside it
//! (`INBOX` → `<root>/INBOX`). Opening a folder scans the file once and
//! keeps the byte range of every message, so bodies are read back with a
//! single seek.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::MailStore;
use crate::error::{FetchError, Result};
use crate::fetch::range::DateRange;
use crate::model::message::{BodyPart, Envelope};
use crate::parser::date::parse_from_line_date;
use crate::parser::mbox::MboxParser;
use crate::parser::mime::{parse_body, parse_envelope};

struct OpenFolder {
    parser: MboxParser,
    /// `(offset, length)` per message; envelope ids index this list.
    locations: Vec<(u64, u64)>,
    envelopes: Vec<Envelope>,
}

/// Mailbox backed by MBOX files under one directory.
pub struct MboxStore {
    root: PathBuf,
    folder: Option<OpenFolder>,
}

impl MboxStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(FetchError::Connection(format!(
                "mailbox directory '{}' does not exist",
                root.display()
            )));
        }
        Ok(Self { root, folder: None })
    }

    fn open(&self) -> Result<&OpenFolder> {
        self.folder
            .as_ref()
            .ok_or_else(|| FetchError::Connection("no folder is open".into()))
    }
}

impl MailStore for MboxStore {
    fn open_folder(&mut self, name: &str, _read_only: bool) -> Result<()> {
        let parser = MboxParser::new(self.root.join(name))?;
        let mut locations = Vec::new();
        let mut envelopes = Vec::new();

        parser.parse(&mut |raw| {
            let id = locations.len() as u64;
            locations.push((raw.offset, raw.length));
            let received = parse_from_line_date(raw.separator_line());
            match parse_envelope(raw.header_bytes(), id, received) {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => warn!(offset = raw.offset, error = %e, "Skipping unreadable message"),
            }
            true
        })?;

        info!(
            path = %parser.path().display(),
            size = parser.file_size(),
            messages = envelopes.len(),
            "Opened MBOX folder"
        );
        self.folder = Some(OpenFolder {
            parser,
            locations,
            envelopes,
        });
        Ok(())
    }

    fn search(&mut self, _range: &DateRange) -> Result<Option<Vec<Envelope>>> {
        debug!("MBOX folders cannot be searched");
        Ok(None)
    }

    fn messages(&mut self) -> Result<Vec<Envelope>> {
        Ok(self.open()?.envelopes.clone())
    }

    fn fetch_body(&mut self, envelope: &Envelope) -> Result<BodyPart> {
        let folder = self.open()?;
        let &(offset, length) = usize::try_from(envelope.id)
            .ok()
            .and_then(|i| folder.locations.get(i))
            .ok_or_else(|| FetchError::Mime(format!("unknown message id {}", envelope.id)))?;
        let raw = folder.parser.read_message_at(offset, length)?;
        parse_body(&raw)
    }

    fn close(&mut self) -> Result<()> {
        self.folder = None;
        Ok(())
    }
}
