//! Speculative tool calls issued in parallel with the first LLM pass.
//!
//! High-confidence order-number and phone entities kick off their
//! lookups before the model decides what it needs. When the model then
//! requests the same lookup, the in-flight result is reused; otherwise
//! the task finishes on its own and its output is discarded — prefetch
//! tasks never touch conversation state.

use std::collections::HashMap;

use tokio::task::JoinHandle;

use rv_domain::tool::ToolResult;
use rv_domain::trace::TraceEvent;

/// Per-message map of `"<kind>:<value>"` → in-flight tool call.
#[derive(Default)]
pub struct PrefetchMap {
    tasks: HashMap<String, JoinHandle<ToolResult>>,
}

impl PrefetchMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(kind: &str, value: &str) -> String {
        format!("{kind}:{value}")
    }

    /// Start a prefetch unless one with this key is already running.
    pub fn spawn<F>(&mut self, key: String, fut: F)
    where
        F: std::future::Future<Output = ToolResult> + Send + 'static,
    {
        self.tasks.entry(key).or_insert_with(|| tokio::spawn(fut));
    }

    /// Await and consume the prefetched result for a key, if any.
    pub async fn take(&mut self, key: &str) -> Option<ToolResult> {
        let handle = self.tasks.remove(key)?;
        match handle.await {
            Ok(result) => {
                TraceEvent::PrefetchReused { key: key.to_owned() }.emit();
                Some(result)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "prefetch task failed; falling back to direct call");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

// Dropping the map detaches any unconsumed tasks: they run to
// completion and their results are discarded.
