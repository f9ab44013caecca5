//! `--dump`: print envelopes and body structure of a folder.

use std::io::Write;

use humansize::{format_size, BINARY};

use crate::error::{FetchError, Result};
use crate::model::address::EmailAddress;
use crate::model::message::{BodyContent, BodyPart, Envelope};
use crate::store::MailStore;

const DATE_FMT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Print every message of `folder`, newest first, at most `limit` (0 = all).
///
/// A message whose body cannot be fetched is reported inline and the dump
/// goes on. Returns the number of messages printed.
pub fn dump_folder(
    store: &mut dyn MailStore,
    folder: &str,
    limit: usize,
    out: &mut dyn Write,
) -> Result<usize> {
    store.open_folder(folder, true)?;
    let messages = store.messages()?;
    let take = if limit == 0 { messages.len() } else { limit };

    let mut printed = 0;
    for envelope in messages.iter().rev().take(take) {
        let body = store.fetch_body(envelope);
        write_message(out, envelope, body).map_err(|e| FetchError::io("<stdout>", e))?;
        printed += 1;
    }

    if let Err(e) = store.close() {
        tracing::debug!(error = %e, "Closing the mailbox failed");
    }
    Ok(printed)
}

fn write_message(
    out: &mut dyn Write,
    envelope: &Envelope,
    body: Result<BodyPart>,
) -> std::io::Result<()> {
    writeln!(out, "{}", "-".repeat(72))?;
    writeln!(out, "From:     {}", join(&envelope.from))?;
    if !envelope.to.is_empty() {
        writeln!(out, "To:       {}", join(&envelope.to))?;
    }
    if !envelope.cc.is_empty() {
        writeln!(out, "Cc:       {}", join(&envelope.cc))?;
    }
    writeln!(out, "Received: {}", envelope.received.format(DATE_FMT))?;
    if let Some(sent) = envelope.sent {
        writeln!(out, "Sent:     {}", sent.format(DATE_FMT))?;
    }
    writeln!(out, "Subject:  {}", envelope.subject)?;

    match body {
        Ok(body) => write_part(out, &body, 1),
        Err(e) => writeln!(out, "  <body unavailable: {e}>"),
    }
}

fn write_part(out: &mut dyn Write, part: &BodyPart, depth: usize) -> std::io::Result<()> {
    let indent = "  ".repeat(depth);
    let mut line = format!("{indent}{}", part.content_type);
    if let Some(disposition) = &part.disposition {
        line.push_str(&format!("; {disposition}"));
    }
    if let Some(name) = &part.filename {
        line.push_str(&format!(" \"{name}\""));
    }

    match &part.content {
        BodyContent::Multipart(children) => {
            writeln!(out, "{line}")?;
            for child in children {
                write_part(out, child, depth + 1)?;
            }
            Ok(())
        }
        BodyContent::NestedMessage => writeln!(out, "{line} (attached message)"),
        BodyContent::Text(_) | BodyContent::Stream(_) => {
            writeln!(out, "{line} ({})", format_size(part.size(), BINARY))
        }
    }
}

fn join(list: &[EmailAddress]) -> String {
    list.iter()
        .map(EmailAddress::display)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_message_layout() {
        let envelope = Envelope {
            id: 0,
            received: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            sent: None,
            subject: "Report".to_string(),
            from: vec![EmailAddress::new("Alice", "alice@example.com")],
            to: vec![],
            cc: vec![],
            bcc: vec![],
        };
        let body = BodyPart::multipart(vec![
            BodyPart::text("hi"),
            BodyPart::attachment("r.pdf", "application/pdf", vec![0u8; 2048]),
        ]);

        let mut out = Vec::new();
        write_message(&mut out, &envelope, Ok(body)).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Subject:  Report"));
        assert!(text.contains("alice@example.com"));
        assert!(text.contains("  multipart/mixed\n"));
        assert!(text.contains("    text/plain (2 B)"));
        assert!(text.contains("    application/pdf; attachment \"r.pdf\" (2 KiB)"));
    }

    #[test]
    fn test_body_error_is_reported() {
        let envelope = Envelope {
            id: 0,
            received: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            sent: None,
            subject: String::new(),
            from: vec![],
            to: vec![],
            cc: vec![],
            bcc: vec![],
        };
        let mut out = Vec::new();
        write_message(&mut out, &envelope, Err(FetchError::Mime("broken".into()))).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("<body unavailable"));
    }
}
