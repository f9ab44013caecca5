//! Streaming MBOX parser.
//!
//! Reads MBOX files line-by-line with a 1 MB buffer.
//! Never loads the entire file into memory. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{FetchError, Result};

/// Size of the internal read buffer (1 MB for fast sequential reads on modern SSDs).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size kept in memory while scanning (256 MB).
const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// One message boundary found by [`MboxParser::parse`].
#[derive(Debug)]
pub struct RawMessage<'a> {
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    /// Full on-disk length, separator line included.
    pub length: u64,
    /// Message bytes as read (truncated past the size limit).
    pub bytes: &'a [u8],
}

impl RawMessage<'_> {
    /// The `From ` separator line, without line terminator.
    pub fn separator_line(&self) -> &str {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(self.bytes.len());
        std::str::from_utf8(&self.bytes[..end])
            .unwrap_or_default()
            .trim_end_matches('\r')
    }

    /// Everything up to (not including) the first blank line.
    pub fn header_bytes(&self) -> &[u8] {
        let b = self.bytes;
        (0..b.len())
            .find(|&i| b[i..].starts_with(b"\n\n") || b[i..].starts_with(b"\n\r\n"))
            .map(|i| &b[..=i])
            .unwrap_or(b)
    }
}

/// Streaming MBOX parser.
///
/// Reads through the file sequentially, invoking a caller-supplied callback for
/// every message boundary it finds. The parser is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - UTF-8 BOM at the start of the file
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    max_message_size: usize,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    ///
    /// Verifies that the file exists and is a regular file, but does NOT
    /// validate that it is actually an MBOX.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::InvalidMbox(path.clone())
            } else {
                FetchError::io(&path, e)
            }
        })?;
        if !metadata.is_file() {
            return Err(FetchError::InvalidMbox(path));
        }
        Ok(Self {
            path,
            file_size: metadata.len(),
            max_message_size: MAX_MESSAGE_SIZE,
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path to the MBOX file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the whole MBOX, calling `on_message` for each message found.
    ///
    /// The callback returns `true` to continue or `false` to stop early.
    /// Returns the number of messages delivered.
    pub fn parse(&self, on_message: &mut dyn FnMut(RawMessage<'_>) -> bool) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| FetchError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut message_start: u64 = 0;
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);
        let mut prev_line_was_empty = true;
        let mut first_line = true;
        let mut truncated = false;

        loop {
            line_buf.clear();
            let line_len = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| FetchError::io(&self.path, e))?;
            if line_len == 0 {
                break;
            }

            if is_mbox_separator(&line_buf) {
                if !first_line && !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if !message_buf.is_empty() {
                    let raw = RawMessage {
                        offset: message_start,
                        length: current_offset - message_start,
                        bytes: &message_buf,
                    };
                    if !on_message(raw) {
                        return Ok(count);
                    }
                    count += 1;
                }
                message_start = current_offset;
                message_buf.clear();
                truncated = false;
                message_buf.extend_from_slice(strip_bom(&line_buf));
            } else if message_buf.len() + line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&line_buf);
            } else if !truncated {
                warn!(
                    offset = message_start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                truncated = true;
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            first_line = false;
            current_offset += line_len as u64;
        }

        if !message_buf.is_empty() {
            let raw = RawMessage {
                offset: message_start,
                length: current_offset - message_start,
                bytes: &message_buf,
            };
            if on_message(raw) {
                count += 1;
            }
        }

        Ok(count)
    }

    /// Read a single message at the given offset and length.
    ///
    /// Uses `seek` to jump directly to the message without scanning the file.
    pub fn read_message_at(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path).map_err(|e| FetchError::io(&self.path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FetchError::io(&self.path, e))?;
        let mut buffer = vec![0u8; length as usize];
        file.read_exact(&mut buffer)
            .map_err(|e| FetchError::io(&self.path, e))?;
        Ok(buffer)
    }
}

fn strip_bom(line: &[u8]) -> &[u8] {
    line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line)
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    strip_bom(line).starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
