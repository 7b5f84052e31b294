//! Tool definitions and the handler trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use rv_domain::channel::Channel;
use rv_domain::tool::{AuthLevel, Dependency};
use rv_domain::Result;

/// The execution context the runtime threads into every handler.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub tenant_id: String,
    pub channel: Channel,
    pub conversation_id: Option<String>,
    pub request_id: String,
    /// The caller's auth level — customer turns run at `None`, copilot
    /// actions at `Service`.
    pub auth: AuthLevel,
}

impl ToolContext {
    pub fn for_conversation(
        tenant_id: &str,
        channel: Channel,
        conversation_id: &str,
        request_id: &str,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_owned(),
            channel,
            conversation_id: Some(conversation_id.to_owned()),
            request_id: request_id.to_owned(),
            auth: AuthLevel::None,
        }
    }
}

/// The uniform handler seam. Per-tool argument typing is a
/// deserialization step inside the handler, not part of the signature.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value>;
}

/// A registered tool: metadata, governance knobs, schemas, handler.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub version: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    pub auth_level: AuthLevel,
    pub rate_limit_per_minute: u32,
    /// Empty = allowed on every channel.
    pub allowed_channels: Vec<Channel>,
    /// When set, the flag must not be explicitly disabled in config.
    pub feature_flag: Option<String>,
    pub cacheable: bool,
    pub cache_ttl: Option<Duration>,
    pub retryable: bool,
    pub retry_delay: Duration,
    /// The circuit-breaker dependency this tool leans on, if any.
    pub dependency: Option<Dependency>,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    /// A definition with defaults every retail tool starts from.
    pub fn new(
        name: &str,
        description: &str,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            version: "1.0".to_owned(),
            description: description.to_owned(),
            input_schema,
            output_schema: None,
            auth_level: AuthLevel::None,
            rate_limit_per_minute: 30,
            allowed_channels: Vec::new(),
            feature_flag: None,
            cacheable: false,
            cache_ttl: None,
            retryable: true,
            retry_delay: Duration::from_secs(1),
            dependency: None,
            handler,
        }
    }

    pub fn allows_channel(&self, channel: Channel) -> bool {
        self.allowed_channels.is_empty() || self.allowed_channels.contains(&channel)
    }
}
