//! The tool registry and runtime: every side effect the agent can take
//! goes through [`runtime::ToolRuntime::execute`], which layers
//! governance (feature flags, channel allowlists, rate limits, circuit
//! breakers), schema validation, timeouts, retries, caching, metrics,
//! and audit logging around the actual handler.

pub mod clients;
pub mod definition;
pub mod failure;
pub mod health;
pub mod ratelimit;
pub mod registry;
pub mod retail;
pub mod runtime;
pub mod schema;

pub use clients::{KnowledgeApi, OmsApi, PaymentApi, TrackingApi};
pub use definition::{ToolContext, ToolDefinition, ToolHandler};
pub use failure::{classify_failure, FailureContext, FailureKind};
pub use health::{DegradationLevel, DependencyHealth};
pub use registry::ToolRegistry;
pub use retail::{order_index_key, register_retail_tools, RetailServices, FAST_PATH_TOOLS};
pub use runtime::ToolRuntime;
