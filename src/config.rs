//! Run configuration.
//!
//! The engine reads a flat, dotted-key map (`download.directory`,
//! `match.subject.contains`, ...). On disk the map is a TOML file; nested
//! tables and quoted dotted keys are flattened into the same map, so
//!
//! ```toml
//! [download]
//! directory = "/srv/att"
//! "groupby.2nd" = "year"
//! ```
//!
//! and `"download.directory" = "/srv/att"` are equivalent.
//!
//! The configuration file is found at:
//! 1. the path given on the command line
//! 2. `$MAILATT_CONFIG` (environment variable)
//! 3. `~/.config/mailatt/default.toml` (Linux/macOS)
//!    `%APPDATA%\mailatt\default.toml` (Windows)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{FetchError, Result};
use crate::parser::date;

/// Name of the default configuration; also the default state-file stem.
pub const DEFAULT_CONFIG_NAME: &str = "default";

/// Flat string-keyed configuration.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    values: BTreeMap<String, String>,
}

impl Cfg {
    /// Build a configuration from literal key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse TOML text and flatten it into dotted keys.
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(text)?;
        let mut values = BTreeMap::new();
        for (key, value) in &table {
            flatten_into(key, value, &mut values);
        }
        Ok(Self { values })
    }

    /// Load and flatten a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FetchError::io(path, e))?;
        let cfg = Self::from_toml_str(&text).map_err(|e| FetchError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), keys = cfg.len(), "Loaded config");
        Ok(cfg)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no key is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set (or replace) a key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Trimmed value of `key`. Blank values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Value of `key`, or a configuration error naming the key.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| FetchError::MissingKey(key.to_string()))
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// `true`/`yes` (any case) are true, anything else false.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => {
                let v = v.to_lowercase();
                v == "true" || v == "yes"
            }
            None => default,
        }
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key) {
            Some(v) => v.parse().map_err(|_| invalid(key, v)),
            None => Ok(default),
        }
    }

    /// A configured calendar date, as the start of that day (UTC).
    pub fn date(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.get(key) {
            Some(v) => date::parse_config_date(v)
                .map(|d| Some(date::start_of_day(d)))
                .ok_or_else(|| invalid(key, v)),
            None => Ok(None),
        }
    }

    /// A configured calendar date, as the last instant of that day (UTC).
    pub fn end_date(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.get(key) {
            Some(v) => date::parse_config_date(v)
                .map(|d| Some(date::end_of_day(d)))
                .ok_or_else(|| invalid(key, v)),
            None => Ok(None),
        }
    }

    /// Iterate over all keys and values, sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn invalid(key: &str, value: &str) -> FetchError {
    FetchError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Flatten one TOML value under `prefix`. Arrays become comma-separated lists.
fn flatten_into(prefix: &str, value: &toml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                flatten_into(&format!("{prefix}.{key}"), child, out);
            }
        }
        toml::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        toml::Value::Array(items) => {
            let joined = items
                .iter()
                .map(|item| match item {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

// ── Locations ───────────────────────────────────────────────────

/// Determine the config file path (explicit path, then env var, then standard dirs).
pub fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("MAILATT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| {
        d.join("mailatt")
            .join(format!("{DEFAULT_CONFIG_NAME}.toml"))
    })
}

/// Name used for the state file of a configuration: the file stem.
///
/// `/etc/mailatt/invoices.toml` → `invoices`.
pub fn config_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_NAME.to_string())
}

/// Directory holding watermark state files.
pub fn state_dir(cfg: &Cfg) -> PathBuf {
    if let Ok(dir) = std::env::var("MAILATT_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = cfg.get("state.directory") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailatt")
}

/// State file for the configuration called `name`.
pub fn state_file_path(cfg: &Cfg, name: &str) -> PathBuf {
    state_dir(cfg).join(format!("{name}.state"))
}

/// Return the cache directory for logs.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailatt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_flatten_nested_tables() {
        let cfg = Cfg::from_toml_str(
            r#"
[download]
directory = "/tmp/att"
groupby = "year"
"groupby.2nd" = "address"
inline = true

[process]
mail.limit = 25
"#,
        )
        .expect("parse");
        assert_eq!(cfg.get("download.directory"), Some("/tmp/att"));
        assert_eq!(cfg.get("download.groupby"), Some("year"));
        assert_eq!(cfg.get("download.groupby.2nd"), Some("address"));
        assert!(cfg.bool_or("download.inline", false));
        assert_eq!(cfg.int_or("process.mail.limit", 0).unwrap(), 25);
    }

    #[test]
    fn test_quoted_dotted_keys() {
        let cfg = Cfg::from_toml_str(r#""match.subject.contains" = "invoice""#).unwrap();
        assert_eq!(cfg.get("match.subject.contains"), Some("invoice"));
    }

    #[test]
    fn test_arrays_become_comma_lists() {
        let cfg = Cfg::from_toml_str(r#""match.file.type.is" = ["pdf", "xlsx"]"#).unwrap();
        assert_eq!(cfg.get("match.file.type.is"), Some("pdf,xlsx"));
    }

    #[test]
    fn test_blank_values_are_absent() {
        let cfg = Cfg::from_pairs([("download.groupby", "  ")]);
        assert_eq!(cfg.get("download.groupby"), None);
        assert_eq!(cfg.get_or("download.groupby", "none"), "none");
    }

    #[test]
    fn test_require_missing_key() {
        let cfg = Cfg::default();
        let err = cfg.require("mail.host").unwrap_err();
        assert!(matches!(err, FetchError::MissingKey(ref k) if k == "mail.host"));
    }

    #[test]
    fn test_bool_accepts_yes() {
        let cfg = Cfg::from_pairs([("a", "YES"), ("b", "no"), ("c", "True")]);
        assert!(cfg.bool_or("a", false));
        assert!(!cfg.bool_or("b", true));
        assert!(cfg.bool_or("c", false));
        assert!(cfg.bool_or("missing", true));
    }

    #[test]
    fn test_int_invalid_is_error() {
        let cfg = Cfg::from_pairs([("process.mail.limit", "ten")]);
        assert!(cfg.int_or("process.mail.limit", 0).is_err());
    }

    #[test]
    fn test_date_bounds() {
        let cfg = Cfg::from_pairs([("from", "2024/03/01"), ("to", "03-05-2024")]);
        let from = cfg.date("from").unwrap().unwrap();
        assert_eq!((from.year(), from.month(), from.day()), (2024, 3, 1));
        assert_eq!(from.hour(), 0);
        let to = cfg.end_date("to").unwrap().unwrap();
        assert_eq!((to.month(), to.day()), (3, 5));
        assert_eq!((to.hour(), to.minute(), to.second()), (23, 59, 59));
        assert!(cfg.date("missing").unwrap().is_none());
    }

    #[test]
    fn test_date_invalid_is_error() {
        let cfg = Cfg::from_pairs([("process.from.date", "yesterday")]);
        assert!(cfg.date("process.from.date").is_err());
    }

    #[test]
    fn test_sample_config_parses() {
        let cfg = Cfg::from_toml_str(include_str!("../conf/default.toml")).unwrap();
        assert_eq!(cfg.get("mail.store.protocol"), Some("imaps"));
        assert_eq!(cfg.get("download.groupby.2nd"), Some("from"));
        assert_eq!(cfg.int_or("process.mail.limit", 0).unwrap(), 500);
        assert!(cfg.bool_or("process.resume.from.last", false));
        assert_eq!(cfg.get("match.subject.contains"), None);
    }

    #[test]
    fn test_config_name_from_path() {
        assert_eq!(config_name(Path::new("/etc/mailatt/invoices.toml")), "invoices");
        assert_eq!(config_name(Path::new("plain")), "plain");
    }

    #[test]
    fn test_state_file_from_config_key() {
        let cfg = Cfg::from_pairs([("state.directory", "/var/lib/mailatt")]);
        if std::env::var("MAILATT_STATE_DIR").is_err() {
            assert_eq!(
                state_file_path(&cfg, "invoices"),
                PathBuf::from("/var/lib/mailatt/invoices.state")
            );
        }
    }
}
