//! Centralized error types for mailatt.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailatt library.
#[derive(Error, Debug)]
pub enum FetchError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A required configuration key is missing.
    #[error("Entry for '{0}' is not defined")]
    MissingKey(String),

    /// A configuration value could not be interpreted.
    #[error("Invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },

    /// The configuration file could not be read or parsed.
    #[error("Configuration error in '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// Connecting, authenticating or opening a folder failed.
    #[error("Mailbox connection error: {0}")]
    Connection(String),

    /// The MBOX file does not exist or cannot be used as a mailbox.
    #[error("Not a usable MBOX file: {0}")]
    InvalidMbox(PathBuf),

    /// A message or body part could not be decoded.
    #[error("MIME decoding error: {0}")]
    Mime(String),

    /// The watermark state file could not be read or written.
    #[error("State file '{path}': {reason}")]
    Watermark { path: PathBuf, reason: String },
}

/// Convenience alias for `Result<T, FetchError>`.
pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error must abort the run.
    ///
    /// Configuration and connection problems stop everything before the
    /// watermark can move; everything else is recovered per message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingKey(_)
                | Self::InvalidValue { .. }
                | Self::Config { .. }
                | Self::Connection(_)
                | Self::InvalidMbox(_)
        )
    }
}

impl From<imap::Error> for FetchError {
    fn from(e: imap::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<native_tls::Error> for FetchError {
    fn from(e: native_tls::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FetchError::MissingKey("mail.host".into()).is_fatal());
        assert!(FetchError::Connection("refused".into()).is_fatal());
        assert!(!FetchError::Mime("bad part".into()).is_fatal());
        let io = FetchError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(!io.is_fatal());
    }

    #[test]
    fn test_missing_key_message() {
        let e = FetchError::MissingKey("download.directory".into());
        assert_eq!(e.to_string(), "Entry for 'download.directory' is not defined");
    }
}
