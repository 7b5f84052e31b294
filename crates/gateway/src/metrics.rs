//! Lightweight in-process counters backing the admin metrics snapshot.
//!
//! Structured per-event telemetry goes through `TraceEvent`; these
//! counters exist so operators can see totals without a log pipeline.

use std::collections::BTreeMap;

use parking_lot::RwLock;

pub struct Metrics {
    counters: RwLock<BTreeMap<String, u64>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn incr(&self, key: &str) {
        *self.counters.write().entry(key.to_owned()).or_insert(0) += 1;
    }

    /// `incr` with a dynamic label suffix, e.g.
    /// `escalation.reason.legal_threat`.
    pub fn incr_labeled(&self, key: &str, label: &str) {
        self.incr(&format!("{key}.{label}"));
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate() {
        let metrics = Metrics::new();
        metrics.incr("messages.processed");
        metrics.incr("messages.processed");
        metrics.incr_labeled("escalation.reason", "legal_threat");
        let snap = metrics.snapshot();
        assert_eq!(snap["messages.processed"], 2);
        assert_eq!(snap["escalation.reason.legal_threat"], 1);
    }
}
