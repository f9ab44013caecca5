//! Message envelope and body structure.

use chrono::{DateTime, Utc};

use super::address::EmailAddress;

/// Header-level snapshot of one message in an opened folder.
///
/// Cheap to list for a whole folder; the body is fetched separately
/// through [`crate::store::MailStore::fetch_body`] only for messages that
/// pass the message filter.
#[derive(Debug, Clone, serde::Serialize, PartialEq)]
pub struct Envelope {
    /// Store-specific handle (IMAP UID, MBOX message index).
    pub id: u64,

    /// When the mailbox received the message. Drives the date window,
    /// the watermark and the modification time of downloaded files.
    pub received: DateTime<Utc>,

    /// The `Date:` header, if present and parseable.
    pub sent: Option<DateTime<Utc>>,

    /// Decoded subject line (empty if missing).
    pub subject: String,

    /// Senders in header order.
    pub from: Vec<EmailAddress>,

    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
}

impl Envelope {
    /// First sender, if any.
    pub fn first_sender(&self) -> Option<&EmailAddress> {
        self.from.first()
    }
}

/// Content of a body node.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyContent {
    /// Message text (`text/*` without a file name), charset-decoded.
    Text(String),
    /// File content with the transfer encoding removed, bytes as sent.
    Stream(Vec<u8>),
    /// A multipart container; children in document order.
    Multipart(Vec<BodyPart>),
    /// An attached `message/rfc822`. Its own parts are not expanded.
    NestedMessage,
}

/// One node of a message body tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyPart {
    /// MIME type, lowercase (`application/pdf`).
    pub content_type: String,
    /// `Content-Disposition` type, lowercase (`attachment`, `inline`).
    pub disposition: Option<String>,
    /// File name from the disposition or content-type parameters.
    pub filename: Option<String>,
    pub content: BodyContent,
}

impl BodyPart {
    /// A plain `text/plain` body without disposition or name.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/plain".to_string(),
            disposition: None,
            filename: None,
            content: BodyContent::Text(body.into()),
        }
    }

    /// A named binary part with `Content-Disposition: attachment`.
    pub fn attachment(filename: &str, content_type: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.to_string(),
            disposition: Some("attachment".to_string()),
            filename: Some(filename.to_string()),
            content: BodyContent::Stream(data.into()),
        }
    }

    /// A `multipart/mixed` container.
    pub fn multipart(children: Vec<BodyPart>) -> Self {
        Self {
            content_type: "multipart/mixed".to_string(),
            disposition: None,
            filename: None,
            content: BodyContent::Multipart(children),
        }
    }

    /// Decoded size of a leaf, or 0 for containers.
    pub fn size(&self) -> u64 {
        self.bytes().map(|b| b.len() as u64).unwrap_or(0)
    }

    /// Raw decoded bytes of a leaf.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            BodyContent::Text(text) => Some(text.as_bytes()),
            BodyContent::Stream(data) => Some(data),
            BodyContent::Multipart(_) | BodyContent::NestedMessage => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_size() {
        assert_eq!(BodyPart::text("hello").size(), 5);
        assert_eq!(BodyPart::attachment("a.bin", "application/octet-stream", vec![0u8; 7]).size(), 7);
        assert_eq!(BodyPart::multipart(vec![BodyPart::text("x")]).size(), 0);
    }
}
