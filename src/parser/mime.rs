//! MIME message parsing: envelope extraction and body-tree conversion.

use chrono::{DateTime, TimeZone, Utc};
use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{Address, Encoding, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::error::{FetchError, Result};
use crate::model::address::EmailAddress;
use crate::model::message::{BodyContent, BodyPart, Envelope};

/// Maximum depth for recursive multipart conversion (to prevent stack overflow on adversarial input).
const MAX_DEPTH: usize = 10;

/// Build an [`Envelope`] from raw message (or header-only) bytes.
///
/// `received` is the store's arrival time. When the store has none, the
/// `Date:` header is used, then the Unix epoch.
pub fn parse_envelope(raw: &[u8], id: u64, received: Option<DateTime<Utc>>) -> Result<Envelope> {
    let bytes = skip_from_line(raw);
    let msg = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| FetchError::Mime(format!("unparseable headers for message {id}")))?;

    let sent = msg
        .date()
        .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single());

    Ok(Envelope {
        id,
        received: received.or(sent).unwrap_or(DateTime::UNIX_EPOCH),
        sent,
        subject: msg.subject().unwrap_or_default().to_string(),
        from: addresses(msg.from()),
        to: addresses(msg.to()),
        cc: addresses(msg.cc()),
        bcc: addresses(msg.bcc()),
    })
}

/// Decode a complete raw message into its body tree.
pub fn parse_body(raw: &[u8]) -> Result<BodyPart> {
    let bytes = skip_from_line(raw);
    let msg = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| FetchError::Mime("failed to parse message body".into()))?;
    convert_part(&msg, 0, 0)
}

/// Convert part `id` of `msg` (and its children) into an owned [`BodyPart`].
fn convert_part(msg: &mail_parser::Message<'_>, id: usize, depth: usize) -> Result<BodyPart> {
    if depth > MAX_DEPTH {
        return Err(FetchError::Mime(format!(
            "multipart nesting deeper than {MAX_DEPTH}"
        )));
    }
    let part = msg
        .parts
        .get(id)
        .ok_or_else(|| FetchError::Mime(format!("dangling part reference {id}")))?;

    let filename = part.attachment_name().map(String::from);
    let is_file = filename.is_some()
        || part
            .content_disposition()
            .is_some_and(|d| d.is_attachment());
    let content = match &part.body {
        // Named text parts are files: keep their bytes, not the charset-decoded text.
        PartType::Text(text) | PartType::Html(text) if is_file => {
            BodyContent::Stream(
                transfer_decoded(msg, part).unwrap_or_else(|| text.as_bytes().to_vec()),
            )
        }
        PartType::Text(text) | PartType::Html(text) => BodyContent::Text(text.to_string()),
        PartType::Binary(data) | PartType::InlineBinary(data) => {
            BodyContent::Stream(data.to_vec())
        }
        PartType::Message(_) => BodyContent::NestedMessage,
        PartType::Multipart(children) => BodyContent::Multipart(
            children
                .iter()
                .map(|&child| convert_part(msg, child, depth + 1))
                .collect::<Result<Vec<_>>>()?,
        ),
    };

    Ok(BodyPart {
        content_type: content_type_of(part),
        disposition: part
            .content_disposition()
            .map(|d| d.ctype().to_lowercase()),
        filename,
        content,
    })
}

/// Body bytes of a leaf with only the transfer encoding removed.
fn transfer_decoded(msg: &mail_parser::Message<'_>, part: &MessagePart<'_>) -> Option<Vec<u8>> {
    let raw = msg
        .raw_message
        .get(part.raw_body_offset()..part.raw_end_offset())?;
    match part.encoding {
        Encoding::Base64 => base64_decode(raw),
        Encoding::QuotedPrintable => quoted_printable_decode(raw),
        Encoding::None => Some(raw.to_vec()),
    }
}

/// `type/subtype` of a part, defaulting per RFC 2045.
fn content_type_of(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| match part.body {
            PartType::Binary(_) | PartType::InlineBinary(_) => {
                "application/octet-stream".to_string()
            }
            _ => "text/plain".to_string(),
        })
}

/// Flatten an address header (plain list or groups) into [`EmailAddress`]es.
fn addresses(header: Option<&Address<'_>>) -> Vec<EmailAddress> {
    let convert = |addr: &mail_parser::Addr<'_>| {
        EmailAddress::new(
            addr.name.as_deref().unwrap_or_default().trim(),
            addr.address.as_deref().unwrap_or_default().trim(),
        )
    };
    match header {
        Some(Address::List(list)) => list.iter().map(convert).collect(),
        Some(Address::Group(groups)) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .map(convert)
            .collect(),
        None => Vec::new(),
    }
}

/// Skip the `From ` separator line at the start of MBOX messages.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
