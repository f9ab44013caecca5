//! Parsers for MBOX files, MIME messages, and dates.

pub mod date;
pub mod mbox;
pub mod mime;
