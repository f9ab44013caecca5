//! Core data model types for envelopes, body trees, and attachments.

pub mod address;
pub mod attachment;
pub mod message;
