//! Attachment candidates produced by the body walk.

use std::io::Read;

use super::message::BodyPart;

/// A leaf body part proposed for download.
///
/// Borrows from the fetched [`BodyPart`] tree; lives for one message.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentPart<'a> {
    /// File name exactly as declared by the message.
    pub filename: &'a str,

    /// Decoded size in bytes.
    pub size: u64,

    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub content_type: &'a str,

    /// `Content-Disposition` type, if declared.
    pub disposition: Option<&'a str>,

    data: &'a [u8],
}

impl<'a> AttachmentPart<'a> {
    /// Build a candidate from a leaf part. Containers and unnamed parts yield `None`.
    pub fn from_part(part: &'a BodyPart) -> Option<Self> {
        let filename = part.filename.as_deref().filter(|f| !f.is_empty())?;
        let data = part.bytes()?;
        Some(Self {
            filename,
            size: data.len() as u64,
            content_type: &part.content_type,
            disposition: part.disposition.as_deref(),
            data,
        })
    }

    /// `true` if declared `Content-Disposition: attachment`.
    pub fn is_attachment(&self) -> bool {
        self.disposition
            .is_some_and(|d| d.eq_ignore_ascii_case("attachment"))
    }

    /// Readable stream over the decoded content.
    pub fn reader(&self) -> impl Read + 'a {
        std::io::Cursor::new(self.data)
    }
}
