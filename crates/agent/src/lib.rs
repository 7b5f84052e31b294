//! The agent core: structured-JSON LLM invocation.
//!
//! [`core::AgentCore`] owns the two LLM passes of the pipeline — the
//! initial response and the tool-result refinement — plus the response
//! contract parser and the deterministic fallbacks used when the model
//! is unavailable or the fast path applies.

pub mod contract;
pub mod core;
pub mod fallback;
pub mod prompts;
pub mod provider;

pub use contract::parse_agent_response;
pub use core::{AgentCore, AgentInput};
pub use fallback::{build_tool_results_fallback, generic_fallback, static_fallback};
pub use provider::{ChatMessage, ChatRequest, LlmProvider, OpenAiCompatProvider, Role};
