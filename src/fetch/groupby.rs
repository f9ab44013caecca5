//! Destination directory layout.
//!
//! Up to three grouping strategies each contribute one path segment,
//! joined in order under the download directory:
//!
//! | strategy  | segment                                       |
//! |-----------|-----------------------------------------------|
//! | `none`    | (nothing)                                     |
//! | `date`    | `YYYY-MM-DD` of the received date             |
//! | `month`   | `YYYY-MM`                                     |
//! | `year`    | `YYYY`                                        |
//! | `from`    | first sender's name, or `NONE`                |
//! | `address` | first sender's address, or `NOADDRESS`        |
//! | `subject` | subject, max 128 characters, or `NOSUBJECT`   |
//!
//! `address` takes the address parsed out of the `From:` header, so a bare
//! `a@b.com` sender groups under `a@b.com` just like `Name <a@b.com>`.
//! Only a message without a usable sender address lands in `NOADDRESS`.
//! Segments that sanitize to nothing, including `.` and `..`, use the
//! same fallbacks.

use std::path::{Path, PathBuf};

use crate::config::Cfg;
use crate::model::message::Envelope;

use super::sanitize::{sanitize_segment, sanitize_truncated};

/// Longest subject segment, in characters.
const MAX_SUBJECT_CHARS: usize = 128;

/// One grouping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Groupby {
    None,
    Date,
    Month,
    Year,
    From,
    Address,
    Subject,
}

impl Groupby {
    /// Parse a strategy name (case-insensitive). Unknown names mean `None`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "date" => Self::Date,
            "month" => Self::Month,
            "year" => Self::Year,
            "from" => Self::From,
            "address" => Self::Address,
            "subject" => Self::Subject,
            "none" | "" => Self::None,
            other => {
                tracing::warn!(strategy = other, "Unknown groupby strategy, ignoring");
                Self::None
            }
        }
    }

    /// The path segment for `envelope`; empty for `None`.
    pub fn segment(self, envelope: &Envelope) -> String {
        match self {
            Self::None => String::new(),
            Self::Date => envelope.received.format("%Y-%m-%d").to_string(),
            Self::Month => envelope.received.format("%Y-%m").to_string(),
            Self::Year => envelope.received.format("%Y").to_string(),
            Self::From => non_empty_or(
                sanitize_segment(
                    envelope
                        .first_sender()
                        .map(|a| a.name_or_address())
                        .unwrap_or_default(),
                ),
                "NONE",
            ),
            Self::Address => non_empty_or(
                sanitize_segment(
                    envelope
                        .first_sender()
                        .map(|a| a.address.as_str())
                        .unwrap_or_default(),
                ),
                "NOADDRESS",
            ),
            Self::Subject => non_empty_or(
                sanitize_truncated(&envelope.subject, MAX_SUBJECT_CHARS),
                "NOSUBJECT",
            ),
        }
    }
}

fn non_empty_or(segment: String, fallback: &str) -> String {
    if segment.is_empty() {
        fallback.to_string()
    } else {
        segment
    }
}

/// The primary/secondary/tertiary grouping chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupbyPath {
    levels: [Groupby; 3],
}

impl GroupbyPath {
    pub fn new(primary: Groupby, secondary: Groupby, tertiary: Groupby) -> Self {
        Self {
            levels: [primary, secondary, tertiary],
        }
    }

    /// Read `download.groupby`, `download.groupby.2nd`, `download.groupby.3rd`.
    pub fn from_config(cfg: &Cfg) -> Self {
        Self::new(
            Groupby::parse(cfg.get_or("download.groupby", "none")),
            Groupby::parse(cfg.get_or("download.groupby.2nd", "none")),
            Groupby::parse(cfg.get_or("download.groupby.3rd", "none")),
        )
    }

    /// Relative directory for `envelope` (empty when every level is `none`).
    pub fn relative(&self, envelope: &Envelope) -> PathBuf {
        self.levels
            .iter()
            .map(|level| level.segment(envelope))
            .filter(|segment| !segment.is_empty())
            .collect()
    }

    /// Absolute destination directory under `base`.
    pub fn resolve(&self, base: &Path, envelope: &Envelope) -> PathBuf {
        let relative = self.relative(envelope);
        if relative.as_os_str().is_empty() {
            base.to_path_buf()
        } else {
            base.join(relative)
        }
    }
}

impl Default for GroupbyPath {
    fn default() -> Self {
        Self::new(Groupby::None, Groupby::None, Groupby::None)
    }
}
