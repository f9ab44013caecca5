//! Persisted "last downloaded" date.
//!
//! One state file per configuration, holding a single TOML record:
//!
//! ```toml
//! "download.last.date" = "2024-03-01T08:15:00Z"
//! ```
//!
//! The file is rewritten through a temporary sibling and a rename, so an
//! interrupted run leaves either the old or the new value.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, Result};

/// Load/save access to the watermark of one configuration.
pub trait WatermarkStore {
    /// The stored watermark; `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<DateTime<Utc>>>;

    /// Replace the stored watermark.
    fn save(&mut self, watermark: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateRecord {
    #[serde(
        rename = "download.last.date",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    last_date: Option<DateTime<Utc>>,
}

/// Watermark kept in a TOML state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the state file. A missing file is not an error.
    pub fn reset(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Removed state file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FetchError::io(&self.path, e)),
        }
    }

    fn error(&self, reason: impl ToString) -> FetchError {
        FetchError::Watermark {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl WatermarkStore for StateFile {
    fn load(&self) -> Result<Option<DateTime<Utc>>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FetchError::io(&self.path, e)),
        };
        let record: StateRecord = toml::from_str(&text).map_err(|e| self.error(e))?;
        tracing::debug!(path = %self.path.display(), last = ?record.last_date, "Loaded watermark");
        Ok(record.last_date)
    }

    fn save(&mut self, watermark: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
        }

        let record = StateRecord {
            last_date: Some(watermark),
        };
        let contents = toml::to_string_pretty(&record).map_err(|e| self.error(e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, contents).map_err(|e| FetchError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| FetchError::io(&self.path, e))?;

        tracing::info!(path = %self.path.display(), watermark = %watermark, "Saved watermark");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_missing_file_is_no_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::new(dir.path().join("none.state"));
        assert_eq!(state.load().unwrap(), None);
        assert!(!state.reset().unwrap());
    }

    #[test]
    fn test_save_then_load_keeps_full_precision() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateFile::new(dir.path().join("nested").join("invoices.state"));
        let when = Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 42).unwrap();

        state.save(when).unwrap();
        assert_eq!(state.load().unwrap(), Some(when));

        let text = std::fs::read_to_string(state.path()).unwrap();
        assert!(text.contains("\"download.last.date\""), "{text}");
        assert!(!dir.path().join("nested").join("invoices.state.tmp").exists());
    }

    #[test]
    fn test_reset_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateFile::new(dir.path().join("x.state"));
        state.save(Utc::now()).unwrap();
        assert!(state.reset().unwrap());
        assert_eq!(state.load().unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.state");
        std::fs::write(&path, "\"download.last.date\" = \"not a date\"").unwrap();
        assert!(matches!(
            StateFile::new(&path).load(),
            Err(FetchError::Watermark { .. })
        ));
    }
}
