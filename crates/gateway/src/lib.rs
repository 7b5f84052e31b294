//! The Resolvr gateway: the per-message orchestration pipeline, its
//! runtime services, and the HTTP surface (inbound webhooks, admin,
//! copilot).

pub mod api;
pub mod collaborators;
pub mod metrics;
pub mod runtime;
pub mod state;
