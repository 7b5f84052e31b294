/// Shared error type used across all Resolvr crates.
///
/// Variants mirror the platform failure taxonomy: tool governance
/// rejections, dependency/circuit failures, LLM and parse failures, and
/// store transport errors. The orchestrator maps each of these to a
/// degraded-but-safe outcome; only startup code is allowed to abort on
/// them.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("feature not enabled: {0}")]
    FeatureDisabled(String),

    #[error("tool {tool} not supported on channel {channel}")]
    ChannelNotAllowed { tool: String, channel: String },

    #[error("rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("{0} is temporarily unavailable")]
    DependencyUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("handler: {0}")]
    HandlerFailure(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("LLM: {0}")]
    Llm(String),

    #[error("parse: {0}")]
    Parse(String),

    #[error("store: {0}")]
    Store(String),

    #[error("audit chain integrity broken at {0}")]
    IntegrityBroken(String),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
