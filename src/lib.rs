//! `mailatt`: incrementally fetch mail attachments.
//!
//! This crate provides the fetch engine (date-range resolution, message and
//! attachment filters, the attachment walk, directory grouping and the
//! persisted watermark) together with IMAP and MBOX mailbox stores.

pub mod config;
pub mod dump;
pub mod error;
pub mod fetch;
pub mod model;
pub mod parser;
pub mod store;
