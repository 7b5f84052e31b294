//! Shared domain types for the Resolvr platform.
//!
//! Everything that crosses a crate boundary lives here: the inbound and
//! outbound message contracts, the durable conversation record, the VOC
//! (voice-of-customer) analysis types, the LLM response contract, the
//! tool result envelope, the configuration tree, the shared error enum,
//! and the structured trace events.

pub mod channel;
pub mod config;
pub mod contract;
pub mod conversation;
pub mod error;
pub mod redact;
pub mod tool;
pub mod trace;
pub mod voc;

pub use error::{Error, Result};
