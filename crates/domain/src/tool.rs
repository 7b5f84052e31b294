//! Tool envelopes shared between the runtime, the agent, and the
//! orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Auth level a tool requires. `Service` tools can only run on behalf of
/// an authenticated internal actor (copilot execute-action, proactive
/// checks); `None` tools run for any customer turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    #[default]
    None,
    Service,
}

/// External dependency a tool (or pipeline step) leans on; each one is
/// tracked by the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependency {
    Redis,
    Oms,
    Tracking,
    Ticketing,
    Llm,
    Search,
    Payment,
}

impl Dependency {
    pub const ALL: [Dependency; 7] = [
        Dependency::Redis,
        Dependency::Oms,
        Dependency::Tracking,
        Dependency::Ticketing,
        Dependency::Llm,
        Dependency::Search,
        Dependency::Payment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Redis => "redis",
            Dependency::Oms => "oms",
            Dependency::Tracking => "tracking",
            Dependency::Ticketing => "ticketing",
            Dependency::Llm => "llm",
            Dependency::Search => "search",
            Dependency::Payment => "payment",
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The typed result envelope every tool execution produces. Governance
/// rejections and handler failures are both encoded as `Failure` — the
/// runtime never panics or throws into the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { data: Value },
    Failure { error: String },
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        ToolResult::Success { data }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ToolResult::Failure { error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ToolResult::Success { data } => Some(data),
            ToolResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ToolResult::Success { .. } => None,
            ToolResult::Failure { error } => Some(error),
        }
    }
}

/// A tool execution paired with the call that produced it, as handed
/// back to the agent for the refinement pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedTool {
    pub tool: String,
    pub args: Value,
    pub result: ToolResult,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_tagged() {
        let ok = ToolResult::success(serde_json::json!({"orders": []}));
        let json = serde_json::to_string(&ok).unwrap();
        assert!(json.contains(r#""status":"success""#));
        let back: ToolResult = serde_json::from_str(&json).unwrap();
        assert!(back.is_success());

        let bad = ToolResult::failure("rate limit exceeded for lookup_customer_orders");
        assert_eq!(bad.error(), Some("rate limit exceeded for lookup_customer_orders"));
        assert!(bad.data().is_none());
    }
}
