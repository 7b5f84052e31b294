//! Durable state for the Resolvr platform.
//!
//! Every store rides on the same [`kv::KvBackend`] abstraction: a
//! durable external KV transport when one is injected at startup, or the
//! bounded in-memory backend otherwise. The stores themselves are
//! backend-agnostic — TTLs, namespacing, and failure-swallowing live
//! here, not in the backend.

pub mod audit;
pub mod cache;
pub mod conversation;
pub mod customer;
pub mod kv;
pub mod vault;

pub use audit::{AuditCategory, AuditChain, AuditEvent, AuditQuery, IntegrityReport, NewAuditEvent};
pub use cache::{CacheStats, CacheStore};
pub use conversation::ConversationStore;
pub use customer::CustomerSessionIndex;
pub use kv::{open_backend, InMemoryKv, KvBackend};
pub use vault::{PiiSeverity, PiiVault};
