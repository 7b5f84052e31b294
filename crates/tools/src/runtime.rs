//! Governed tool execution.
//!
//! [`ToolRuntime::execute`] wraps every handler in the full governance
//! stack, in order: existence, auth + feature flag, channel allowlist,
//! rate limit, circuit breaker, cache lookup, input validation, timed
//! attempt, one retry, health recording, cache store, output
//! validation, metrics, structured log, audit. It never returns an
//! error — every failure is encoded in the [`ToolResult`] envelope.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};

use rv_domain::redact::Redactor;
use rv_domain::tool::{AuthLevel, ToolResult};
use rv_domain::trace::TraceEvent;
use rv_domain::{Error, Result};
use rv_stores::audit::{AuditCategory, NewAuditEvent};
use rv_stores::{AuditChain, CacheStore};

use crate::definition::ToolContext;
use crate::health::DependencyHealth;
use crate::ratelimit::RateLimiter;
use crate::registry::{RegisteredTool, ToolRegistry};
use crate::schema::canonical_json;

pub struct ToolRuntime {
    registry: ToolRegistry,
    cache: Arc<CacheStore>,
    audit: Arc<AuditChain>,
    health: Arc<DependencyHealth>,
    limiter: RateLimiter,
    redactor: Redactor,
    feature_flags: std::collections::HashMap<String, bool>,
    timeout: Duration,
}

struct ExecMeta {
    cached: bool,
    retried: bool,
}

impl ToolRuntime {
    pub fn new(
        registry: ToolRegistry,
        cache: Arc<CacheStore>,
        audit: Arc<AuditChain>,
        health: Arc<DependencyHealth>,
        feature_flags: std::collections::HashMap<String, bool>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            audit,
            health,
            limiter: RateLimiter::new(),
            redactor: Redactor::new(),
            feature_flags,
            timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn health(&self) -> &DependencyHealth {
        &self.health
    }

    /// Execute a tool under full governance.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        let started = Instant::now();
        let version = self
            .registry
            .get(name)
            .map(|t| t.def.version.clone())
            .unwrap_or_else(|| "-".into());

        let (result, meta) = match self.run(name, &args, ctx).await {
            Ok((result, meta)) => (result, meta),
            Err(e) => {
                if matches!(e, Error::InvalidInput(_)) {
                    TraceEvent::ToolValidationFailed {
                        tool: name.to_owned(),
                        detail: e.to_string(),
                    }
                    .emit();
                }
                (
                    ToolResult::failure(e.to_string()),
                    ExecMeta { cached: false, retried: false },
                )
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        let status = if result.is_success() { "success" } else { "failure" };

        TraceEvent::ToolExecuted {
            tool: name.to_owned(),
            version: version.clone(),
            status: status.to_owned(),
            duration_ms,
            cached: meta.cached,
            retried: meta.retried,
        }
        .emit();

        // Result payloads may hold order contents, addresses, tracking
        // details — the log gets redacted args and no data.
        let redacted_args = self.redactor.redact_json(&args);
        tracing::info!(
            tool = name,
            version = %version,
            status,
            duration_ms,
            request_id = %ctx.request_id,
            conversation_id = ctx.conversation_id.as_deref().unwrap_or("-"),
            tenant_id = %ctx.tenant_id,
            args = %redacted_args,
            data = "[redacted]",
            "tool call"
        );

        self.audit.append(NewAuditEvent {
            actor: "tool_runtime".into(),
            action: "tool_executed".into(),
            category: AuditCategory::ToolExecution,
            conversation_id: ctx.conversation_id.clone(),
            tenant_id: Some(ctx.tenant_id.clone()),
            details: serde_json::json!({
                "tool": name,
                "version": version,
                "status": status,
                "duration_ms": duration_ms,
                "args": redacted_args,
                "error": result.error(),
            }),
        });

        result
    }

    async fn run(
        &self,
        name: &str,
        args: &Value,
        ctx: &ToolContext,
    ) -> Result<(ToolResult, ExecMeta)> {
        // 1. Existence.
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_owned()))?;

        // 2. Auth level and feature flag.
        if tool.def.auth_level == AuthLevel::Service && ctx.auth != AuthLevel::Service {
            return Err(Error::FeatureDisabled(format!(
                "{name} requires service authorization"
            )));
        }
        if let Some(flag) = &tool.def.feature_flag {
            // Flags are kill switches: absent means enabled.
            if !self.feature_flags.get(flag).copied().unwrap_or(true) {
                return Err(Error::FeatureDisabled(flag.clone()));
            }
        }

        // 3. Channel allowlist.
        if !tool.def.allows_channel(ctx.channel) {
            return Err(Error::ChannelNotAllowed {
                tool: name.to_owned(),
                channel: ctx.channel.as_str().to_owned(),
            });
        }

        // 4. Rate limit, fixed one-minute window per (tool, tenant).
        if !self.limiter.try_acquire(name, &ctx.tenant_id, tool.def.rate_limit_per_minute) {
            return Err(Error::RateLimited(name.to_owned()));
        }

        let cache_key = cache_key(name, args);

        // 5. Circuit breaker. While a dependency is down, cacheable
        //    tools may still serve an existing cached result — the
        //    refresh is what's suspended, not the answer.
        if let Some(dep) = tool.def.dependency {
            if !self.health.is_available(dep) {
                if tool.def.cacheable {
                    if let Some(data) = self.cache.get::<Value>(&cache_key).await {
                        TraceEvent::ToolCacheHit { tool: name.to_owned() }.emit();
                        return Ok((
                            ToolResult::success(data),
                            ExecMeta { cached: true, retried: false },
                        ));
                    }
                }
                return Err(Error::DependencyUnavailable(dep.as_str().to_owned()));
            }
        }

        // 6. Cache lookup.
        if tool.def.cacheable && tool.def.cache_ttl.is_some() {
            if let Some(data) = self.cache.get::<Value>(&cache_key).await {
                TraceEvent::ToolCacheHit { tool: name.to_owned() }.emit();
                return Ok((
                    ToolResult::success(data),
                    ExecMeta { cached: true, retried: false },
                ));
            }
        }

        // 7. Input schema.
        if let Err(detail) = tool.input.validate(args) {
            return Err(Error::InvalidInput(detail));
        }

        // 8–9. Attempt, then one retry unless the tool opted out.
        let mut retried = false;
        let mut outcome = self.attempt(&tool, args, ctx).await;
        if outcome.is_err() && tool.def.retryable {
            tokio::time::sleep(tool.def.retry_delay).await;
            retried = true;
            outcome = self.attempt(&tool, args, ctx).await;
        }

        // 10. Record dependency health.
        if let Some(dep) = tool.def.dependency {
            match &outcome {
                Ok(_) => self.health.record_success(dep),
                Err(_) => self.health.record_failure(dep),
            }
        }

        let data = match outcome {
            Ok(data) => data,
            Err(e) => {
                return Ok((
                    ToolResult::failure(e.to_string()),
                    ExecMeta { cached: false, retried },
                ));
            }
        };

        // 11. Cache store on success.
        if tool.def.cacheable {
            if let Some(ttl) = tool.def.cache_ttl {
                self.cache.set(&cache_key, &data, Some(ttl), false).await;
            }
        }

        // 12. Output schema, best-effort.
        if let Some(output) = &tool.output {
            if let Err(detail) = output.validate(&data) {
                tracing::warn!(tool = name, detail, "tool output does not match its schema");
            }
        }

        Ok((ToolResult::success(data), ExecMeta { cached: false, retried }))
    }

    async fn attempt(
        &self,
        tool: &RegisteredTool,
        args: &Value,
        ctx: &ToolContext,
    ) -> Result<Value> {
        match tokio::time::timeout(self.timeout, tool.def.handler.call(args.clone(), ctx)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} exceeded {}s",
                tool.def.name,
                self.timeout.as_secs_f32()
            ))),
        }
    }
}

/// `tool:{name}:{first 16 hex chars of sha256(canonical args)}`.
fn cache_key(name: &str, args: &Value) -> String {
    let digest = hex::encode(Sha256::digest(canonical_json(args).as_bytes()));
    format!("tool:{name}:{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ToolDefinition, ToolHandler};
    use async_trait::async_trait;
    use rv_domain::channel::Channel;
    use rv_domain::tool::Dependency;
    use rv_stores::InMemoryKv;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ToolHandler for CountingHandler {
        async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"echo": args}))
        }
    }

    struct FlakyHandler {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ToolHandler for FlakyHandler {
        async fn call(&self, _args: Value, _ctx: &ToolContext) -> Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(Error::HandlerFailure("transient".into()))
            } else {
                Ok(serde_json::json!({"ok": true}))
            }
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl ToolHandler for SlowHandler {
        async fn call(&self, _args: Value, _ctx: &ToolContext) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::for_conversation("default", Channel::Web, "c1", "req1")
    }

    fn runtime_with(defs: Vec<ToolDefinition>) -> ToolRuntime {
        runtime_with_timeout(defs, Duration::from_secs(15))
    }

    fn runtime_with_timeout(defs: Vec<ToolDefinition>, timeout: Duration) -> ToolRuntime {
        let mut registry = ToolRegistry::new();
        for def in defs {
            registry.register(def).unwrap();
        }
        let backend = Arc::new(InMemoryKv::new(1000));
        ToolRuntime::new(
            registry,
            Arc::new(CacheStore::new(backend)),
            Arc::new(AuditChain::new()),
            Arc::new(DependencyHealth::new(5, Duration::from_secs(30))),
            Default::default(),
            timeout,
        )
    }

    fn object_schema() -> Value {
        serde_json::json!({"type": "object"})
    }

    #[tokio::test]
    async fn unknown_tool_fails_cleanly() {
        let runtime = runtime_with(vec![]);
        let result = runtime.execute("ghost", Value::Null, &ctx()).await;
        assert_eq!(result.error(), Some("unknown tool: ghost"));
    }

    #[tokio::test]
    async fn cacheable_tool_invokes_handler_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = ToolDefinition::new(
            "lookup",
            "test",
            object_schema(),
            Arc::new(CountingHandler { calls: calls.clone() }),
        );
        def.cacheable = true;
        def.cache_ttl = Some(Duration::from_secs(60));
        let runtime = runtime_with(vec![def]);

        let args = serde_json::json!({"order_no": "Q1"});
        let first = runtime.execute("lookup", args.clone(), &ctx()).await;
        let second = runtime.execute("lookup", args, &ctx()).await;
        assert!(first.is_success() && second.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Different args miss the cache.
        let third = runtime
            .execute("lookup", serde_json::json!({"order_no": "Q2"}), &ctx())
            .await;
        assert!(third.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn argument_key_order_shares_cache_entry() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = ToolDefinition::new(
            "lookup",
            "test",
            object_schema(),
            Arc::new(CountingHandler { calls: calls.clone() }),
        );
        def.cacheable = true;
        def.cache_ttl = Some(Duration::from_secs(60));
        let runtime = runtime_with(vec![def]);

        runtime
            .execute("lookup", serde_json::json!({"a": 1, "b": 2}), &ctx())
            .await;
        runtime
            .execute("lookup", serde_json::json!({"b": 2, "a": 1}), &ctx())
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_rejects_excess() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = ToolDefinition::new(
            "limited",
            "test",
            object_schema(),
            Arc::new(CountingHandler { calls }),
        );
        def.rate_limit_per_minute = 2;
        let runtime = runtime_with(vec![def]);

        assert!(runtime.execute("limited", serde_json::json!({}), &ctx()).await.is_success());
        assert!(runtime.execute("limited", serde_json::json!({}), &ctx()).await.is_success());
        let third = runtime.execute("limited", serde_json::json!({}), &ctx()).await;
        assert_eq!(third.error(), Some("rate limit exceeded for limited"));
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = ToolDefinition::new(
            "flaky",
            "test",
            object_schema(),
            Arc::new(FlakyHandler { calls: calls.clone() }),
        );
        def.retry_delay = Duration::from_millis(5);
        let runtime = runtime_with(vec![def]);

        let result = runtime.execute("flaky", serde_json::json!({}), &ctx()).await;
        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_fails_on_first_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = ToolDefinition::new(
            "refund",
            "test",
            object_schema(),
            Arc::new(FlakyHandler { calls: calls.clone() }),
        );
        def.retryable = false;
        let runtime = runtime_with(vec![def]);

        let result = runtime.execute("refund", serde_json::json!({}), &ctx()).await;
        assert!(!result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_is_enforced() {
        let mut def = ToolDefinition::new("slow", "test", object_schema(), Arc::new(SlowHandler));
        def.retryable = false;
        let runtime = runtime_with_timeout(vec![def], Duration::from_millis(20));

        let result = runtime.execute("slow", serde_json::json!({}), &ctx()).await;
        assert!(result.error().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn input_schema_gates_execution() {
        let calls = Arc::new(AtomicU32::new(0));
        let def = ToolDefinition::new(
            "strict",
            "test",
            serde_json::json!({
                "type": "object",
                "properties": {"order_no": {"type": "string"}},
                "required": ["order_no"],
                "additionalProperties": false
            }),
            Arc::new(CountingHandler { calls: calls.clone() }),
        );
        let runtime = runtime_with(vec![def]);

        let result = runtime.execute("strict", serde_json::json!({}), &ctx()).await;
        assert!(result.error().unwrap().starts_with("invalid input"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn channel_allowlist_enforced() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = ToolDefinition::new(
            "web_only",
            "test",
            object_schema(),
            Arc::new(CountingHandler { calls }),
        );
        def.allowed_channels = vec![Channel::Web];
        let runtime = runtime_with(vec![def]);

        assert!(runtime.execute("web_only", serde_json::json!({}), &ctx()).await.is_success());

        let wa_ctx = ToolContext::for_conversation("default", Channel::Whatsapp, "c1", "r1");
        let denied = runtime.execute("web_only", serde_json::json!({}), &wa_ctx).await;
        assert!(denied.error().unwrap().contains("not supported on channel"));
    }

    #[tokio::test]
    async fn disabled_feature_flag_blocks() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = ToolDefinition::new(
            "flagged",
            "test",
            object_schema(),
            Arc::new(CountingHandler { calls }),
        );
        def.feature_flag = Some("ar_sessions".into());

        let mut registry = ToolRegistry::new();
        registry.register(def).unwrap();
        let mut flags = std::collections::HashMap::new();
        flags.insert("ar_sessions".to_string(), false);
        let runtime = ToolRuntime::new(
            registry,
            Arc::new(CacheStore::new(Arc::new(InMemoryKv::new(100)))),
            Arc::new(AuditChain::new()),
            Arc::new(DependencyHealth::new(5, Duration::from_secs(30))),
            flags,
            Duration::from_secs(15),
        );

        let result = runtime.execute("flagged", serde_json::json!({}), &ctx()).await;
        assert!(result.error().unwrap().contains("feature not enabled"));
    }

    #[tokio::test]
    async fn open_circuit_still_serves_cached_results() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = ToolDefinition::new(
            "lookup",
            "test",
            object_schema(),
            Arc::new(CountingHandler { calls: calls.clone() }),
        );
        def.dependency = Some(Dependency::Oms);
        def.cacheable = true;
        def.cache_ttl = Some(Duration::from_secs(60));
        let runtime = runtime_with(vec![def]);

        let args = serde_json::json!({"order_no": "Q1"});
        assert!(runtime.execute("lookup", args.clone(), &ctx()).await.is_success());

        for _ in 0..5 {
            runtime.health().record_failure(Dependency::Oms);
        }
        // Cached args still answer; uncached args hit the open circuit.
        assert!(runtime.execute("lookup", args, &ctx()).await.is_success());
        let fresh = runtime
            .execute("lookup", serde_json::json!({"order_no": "Q2"}), &ctx())
            .await;
        assert!(fresh.error().unwrap().contains("temporarily unavailable"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_circuit_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = ToolDefinition::new(
            "oms_tool",
            "test",
            object_schema(),
            Arc::new(CountingHandler { calls: calls.clone() }),
        );
        def.dependency = Some(Dependency::Oms);
        let runtime = runtime_with(vec![def]);

        for _ in 0..5 {
            runtime.health().record_failure(Dependency::Oms);
        }
        let result = runtime.execute("oms_tool", serde_json::json!({}), &ctx()).await;
        assert!(result.error().unwrap().contains("temporarily unavailable"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn every_execution_is_audited() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new(
                "echo",
                "test",
                object_schema(),
                Arc::new(CountingHandler { calls: Arc::new(AtomicU32::new(0)) }),
            ))
            .unwrap();
        let audit = Arc::new(AuditChain::new());
        let runtime = ToolRuntime::new(
            registry,
            Arc::new(CacheStore::new(Arc::new(InMemoryKv::new(100)))),
            audit.clone(),
            Arc::new(DependencyHealth::new(5, Duration::from_secs(30))),
            Default::default(),
            Duration::from_secs(15),
        );

        runtime.execute("echo", serde_json::json!({}), &ctx()).await;
        runtime.execute("ghost", serde_json::json!({}), &ctx()).await;
        assert_eq!(audit.len(), 2);
        assert!(audit.verify_integrity(None).valid);
    }
}
