//! Mailbox access.
//!
//! The engine only needs four operations from a mailbox: open a folder,
//! list messages (optionally restricted to a date range on the server
//! side), and fetch the body of one message. [`connect`] picks the
//! implementation from `mail.store.protocol`.

pub mod imap;
pub mod mbox;

use crate::config::Cfg;
use crate::error::{FetchError, Result};
use crate::fetch::range::DateRange;
use crate::model::message::{BodyPart, Envelope};

pub use self::imap::ImapStore;
pub use self::mbox::MboxStore;

/// Folder opened when `mail.folder` is not configured.
pub const DEFAULT_FOLDER: &str = "INBOX";

/// A connected mailbox.
///
/// Listings are ordered by arrival, oldest first.
pub trait MailStore {
    /// Open `name` for the following calls. Read-only opens must not
    /// change message flags.
    fn open_folder(&mut self, name: &str, read_only: bool) -> Result<()>;

    /// Messages of the open folder received within `range`.
    ///
    /// Returns `Ok(None)` when the store cannot search; the caller then
    /// filters [`MailStore::messages`] itself.
    fn search(&mut self, range: &DateRange) -> Result<Option<Vec<Envelope>>>;

    /// Every message of the open folder.
    fn messages(&mut self) -> Result<Vec<Envelope>>;

    /// Decoded body tree of one listed message.
    fn fetch_body(&mut self, envelope: &Envelope) -> Result<BodyPart>;

    /// Release the connection. Errors here are not fatal to a run.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Transport named by `mail.store.protocol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// IMAP over implicit TLS.
    Imaps,
    /// IMAP upgraded with STARTTLS.
    Imap,
    /// A local MBOX file.
    Mbox,
}

impl Protocol {
    pub fn from_config(cfg: &Cfg) -> Result<Self> {
        let value = cfg.get_or("mail.store.protocol", "imaps");
        match value.to_lowercase().as_str() {
            "imaps" => Ok(Self::Imaps),
            "imap" => Ok(Self::Imap),
            "mbox" => Ok(Self::Mbox),
            _ => Err(FetchError::InvalidValue {
                key: "mail.store.protocol".to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Imaps => 993,
            Self::Imap => 143,
            Self::Mbox => 0,
        }
    }
}

/// Connect to the mailbox described by the `mail.*` keys.
///
/// Every required key is checked before any network traffic.
pub fn connect(cfg: &Cfg) -> Result<Box<dyn MailStore>> {
    let protocol = Protocol::from_config(cfg)?;
    let host = cfg.require("mail.host")?;

    match protocol {
        Protocol::Mbox => Ok(Box::new(MboxStore::new(host)?)),
        Protocol::Imaps | Protocol::Imap => {
            let user = cfg.require("mail.username")?;
            let password = cfg.require("mail.password")?;
            let port = cfg.int_or("mail.port", i64::from(protocol.default_port()))?;
            let port = u16::try_from(port).map_err(|_| FetchError::InvalidValue {
                key: "mail.port".to_string(),
                value: port.to_string(),
            })?;
            let store = ImapStore::connect(host, port, protocol == Protocol::Imaps, user, password)?;
            Ok(Box::new(store))
        }
    }
}

/// Folder named by `mail.folder`, or [`DEFAULT_FOLDER`].
pub fn folder_name(cfg: &Cfg) -> &str {
    cfg.get_or("mail.folder", DEFAULT_FOLDER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_default_and_parse() {
        assert_eq!(Protocol::from_config(&Cfg::default()).unwrap(), Protocol::Imaps);
        let cfg = Cfg::from_pairs([("mail.store.protocol", "MBOX")]);
        assert_eq!(Protocol::from_config(&cfg).unwrap(), Protocol::Mbox);
        let cfg = Cfg::from_pairs([("mail.store.protocol", "pop3")]);
        assert!(Protocol::from_config(&cfg).is_err());
    }

    #[test]
    fn test_missing_host_is_fatal() {
        let err = connect(&Cfg::default()).err().unwrap();
        assert!(matches!(err, FetchError::MissingKey(ref k) if k == "mail.host"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_imap_requires_credentials_before_connecting() {
        let cfg = Cfg::from_pairs([("mail.host", "imap.invalid"), ("mail.username", "me")]);
        let err = connect(&cfg).err().unwrap();
        assert!(matches!(err, FetchError::MissingKey(ref k) if k == "mail.password"));
    }

    #[test]
    fn test_mbox_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Cfg::from_pairs([
            ("mail.store.protocol", "mbox".to_string()),
            ("mail.host", dir.path().display().to_string()),
        ]);
        assert!(connect(&cfg).is_ok());
        assert_eq!(folder_name(&cfg), "INBOX");
    }
}
