//! Message and attachment filters.
//!
//! Each configured `match.*` key becomes one rule. Absent keys contribute
//! nothing, the remaining rules are AND-ed, and an empty rule list matches
//! everything. Recipient rules (`to`/`cc`/`bcc`) are first OR-ed into a
//! single "any recipient" rule; comma-separated file name and file type
//! lists are OR-ed within their rule.
//!
//! All text comparisons are case-insensitive substring matches.

use crate::config::Cfg;
use crate::model::address::EmailAddress;
use crate::model::attachment::AttachmentPart;
use crate::model::message::Envelope;

/// Which envelope field a text rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Subject,
    /// Display name of any sender.
    FromName,
    /// Address of any sender.
    FromAddress,
    To,
    Cc,
    Bcc,
}

/// "`field` contains `needle`" (needle stored lowercase).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRule {
    pub field: TextField,
    needle: String,
}

impl TextRule {
    pub fn new(field: TextField, needle: &str) -> Self {
        Self {
            field,
            needle: needle.to_lowercase(),
        }
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        match self.field {
            TextField::Subject => contains(&envelope.subject, &self.needle),
            TextField::FromName => envelope
                .from
                .iter()
                .any(|a| contains(&a.display_name, &self.needle)),
            TextField::FromAddress => envelope
                .from
                .iter()
                .any(|a| contains(&a.address, &self.needle)),
            TextField::To => any_address(&envelope.to, &self.needle),
            TextField::Cc => any_address(&envelope.cc, &self.needle),
            TextField::Bcc => any_address(&envelope.bcc, &self.needle),
        }
    }
}

/// One AND-ed category of the message filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRule {
    Text(TextRule),
    /// Passes when any of the inner rules passes.
    AnyOf(Vec<TextRule>),
}

impl MessageRule {
    fn matches(&self, envelope: &Envelope) -> bool {
        match self {
            Self::Text(rule) => rule.matches(envelope),
            Self::AnyOf(rules) => rules.iter().any(|r| r.matches(envelope)),
        }
    }
}

/// One AND-ed category of the attachment filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentRule {
    /// File name contains any of these (lowercase) substrings.
    NameContainsAny(Vec<String>),
    /// Extension (`pdf`) or MIME prefix (`image/`) matches any of these.
    TypeIsAny(Vec<String>),
    SizeLessThan(u64),
    SizeGreaterThan(u64),
}

impl AttachmentRule {
    fn matches(&self, part: &AttachmentPart<'_>) -> bool {
        match self {
            Self::NameContainsAny(needles) => {
                needles.iter().any(|n| contains(part.filename, n))
            }
            Self::TypeIsAny(types) => types.iter().any(|t| type_matches(part, t)),
            Self::SizeLessThan(limit) => part.size < *limit,
            Self::SizeGreaterThan(limit) => part.size > *limit,
        }
    }
}

/// Compiled message filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMatcher {
    rules: Vec<MessageRule>,
}

impl MessageMatcher {
    /// Keep the configured rules; absent ones are dropped.
    pub fn new(rules: impl IntoIterator<Item = Option<MessageRule>>) -> Self {
        Self {
            rules: rules.into_iter().flatten().collect(),
        }
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.rules.iter().all(|r| r.matches(envelope))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Compiled attachment filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentMatcher {
    rules: Vec<AttachmentRule>,
}

impl AttachmentMatcher {
    pub fn new(rules: impl IntoIterator<Item = Option<AttachmentRule>>) -> Self {
        Self {
            rules: rules.into_iter().flatten().collect(),
        }
    }

    pub fn matches(&self, part: &AttachmentPart<'_>) -> bool {
        self.rules.iter().all(|r| r.matches(part))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The raw `match.*` settings of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchCriteria {
    pub subject_contains: Option<String>,
    pub from_name_contains: Option<String>,
    pub from_address_contains: Option<String>,
    pub to_contains: Option<String>,
    pub cc_contains: Option<String>,
    pub bcc_contains: Option<String>,
    pub file_name_contains: Option<String>,
    pub file_type_is: Option<String>,
    pub file_size_less_than: Option<u64>,
    pub file_size_greater_than: Option<u64>,
}

impl MatchCriteria {
    pub fn from_config(cfg: &Cfg) -> Self {
        let text = |key: &str| cfg.get(key).map(String::from);
        // 0, parsed or fallen back to, means no bound.
        let size = |key: &str| {
            cfg.get(key)
                .map(|v| {
                    try_parse_byte_size(v).unwrap_or_else(|| {
                        tracing::warn!(key, value = v, "Unparseable size, ignoring the bound");
                        0
                    })
                })
                .filter(|&bytes| bytes > 0)
        };

        Self {
            subject_contains: text("match.subject.contains"),
            from_name_contains: text("match.from.contains"),
            from_address_contains: text("match.address.contains"),
            to_contains: text("match.to.contains"),
            cc_contains: text("match.cc.contains"),
            bcc_contains: text("match.bcc.contains"),
            file_name_contains: text("match.file.name.contains"),
            file_type_is: text("match.file.type.is"),
            file_size_less_than: size("match.file.size.less.than"),
            file_size_greater_than: size("match.file.size.greater.than"),
        }
    }

    pub fn message_matcher(&self) -> MessageMatcher {
        let text = |field, value: &Option<String>| {
            value.as_deref().map(|v| TextRule::new(field, v))
        };

        let recipients: Vec<TextRule> = [
            text(TextField::To, &self.to_contains),
            text(TextField::Cc, &self.cc_contains),
            text(TextField::Bcc, &self.bcc_contains),
        ]
        .into_iter()
        .flatten()
        .collect();

        MessageMatcher::new([
            text(TextField::Subject, &self.subject_contains).map(MessageRule::Text),
            text(TextField::FromName, &self.from_name_contains).map(MessageRule::Text),
            text(TextField::FromAddress, &self.from_address_contains).map(MessageRule::Text),
            (!recipients.is_empty()).then_some(MessageRule::AnyOf(recipients)),
        ])
    }

    pub fn attachment_matcher(&self) -> AttachmentMatcher {
        AttachmentMatcher::new([
            split_list(self.file_name_contains.as_deref()).map(AttachmentRule::NameContainsAny),
            split_list(self.file_type_is.as_deref()).map(AttachmentRule::TypeIsAny),
            self.file_size_less_than.map(AttachmentRule::SizeLessThan),
            self.file_size_greater_than.map(AttachmentRule::SizeGreaterThan),
        ])
    }
}

/// Lowercased, trimmed, non-empty items of a comma-separated list.
fn split_list(value: Option<&str>) -> Option<Vec<String>> {
    let items: Vec<String> = value?
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Case-insensitive substring test; `needle` must already be lowercase.
fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn any_address(list: &[EmailAddress], needle: &str) -> bool {
    list.iter()
        .any(|a| contains(&a.address, needle) || contains(&a.display_name, needle))
}

fn type_matches(part: &AttachmentPart<'_>, wanted: &str) -> bool {
    if wanted.contains('/') {
        part.content_type.to_lowercase().starts_with(wanted)
    } else {
        let suffix = format!(".{}", wanted.trim_start_matches('.'));
        part.filename.to_lowercase().ends_with(&suffix)
    }
}

/// Parse a human byte size such as `512`, `10K`, `1.5MB` or `2,048 kb`.
///
/// Units are binary multiples of 1024: B, K/KB, M/MB, G/GB, T/TB, P/PB.
/// Commas and spaces are ignored. Returns `None` if unparseable.
pub fn try_parse_byte_size(text: &str) -> Option<u64> {
    let cleaned: String = text
        .chars()
        .filter(|&c| c != ',' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    let split = cleaned
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(cleaned.len());
    let (number, unit) = cleaned.split_at(split);

    let multiplier: u64 = match unit {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        "T" | "TB" => 1 << 40,
        "P" | "PB" => 1 << 50,
        _ => return None,
    };

    let value: f64 = number.parse().ok()?;
    value
        .is_finite()
        .then(|| (value * multiplier as f64) as u64)
}

/// [`try_parse_byte_size`] with a fallback for unparseable input.
pub fn parse_byte_size(text: &str, default: u64) -> u64 {
    try_parse_byte_size(text).unwrap_or(default)
}
