//! Fire-and-forget sinks: the learning collector and the VOC record
//! log. Both ride [`BackgroundQueue`]s so the pipeline never waits on
//! them.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rv_domain::conversation::ConversationRecord;
use rv_domain::trace::TraceEvent;
use rv_domain::voc::VocRecord;
use rv_stores::KvBackend;

use super::background::BackgroundQueue;

const RETENTION: Duration = Duration::from_secs(90 * 86_400);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Learning collector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A terminal conversation plus its VOC trail, queued for the learning
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSample {
    pub record: ConversationRecord,
    pub voc_records: Vec<VocRecord>,
}

#[derive(Clone)]
pub struct LearningCollector {
    queue: BackgroundQueue<LearningSample>,
}

impl LearningCollector {
    /// Build the collector and start its drain worker.
    pub fn start(backend: Arc<dyn KvBackend>) -> Self {
        let queue: BackgroundQueue<LearningSample> = BackgroundQueue::new("learning", 256);
        let sink = backend;
        queue.start(move |sample| {
            let sink = sink.clone();
            async move {
                let key = format!("resolvr:learning:{}", sample.record.conversation_id);
                let Ok(raw) = serde_json::to_string(&sample) else {
                    return;
                };
                if let Err(e) = sink.set(&key, raw, Some(RETENTION)).await {
                    tracing::warn!(error = %e, "learning sample write failed");
                    return;
                }
                TraceEvent::LearningCollected {
                    conversation_id: sample.record.conversation_id.clone(),
                    state: sample.record.state.as_str().to_owned(),
                    voc_records: sample.voc_records.len(),
                }
                .emit();
            }
        });
        Self { queue }
    }

    pub fn collect(&self, sample: LearningSample) {
        self.queue.push(sample);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VOC record log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct VocLog {
    backend: Arc<dyn KvBackend>,
    queue: BackgroundQueue<VocRecord>,
}

impl VocLog {
    pub fn start(backend: Arc<dyn KvBackend>) -> Self {
        let queue: BackgroundQueue<VocRecord> = BackgroundQueue::new("voc_log", 1024);
        let sink = backend.clone();
        queue.start(move |record| {
            let sink = sink.clone();
            async move {
                let Ok(raw) = serde_json::to_string(&record) else {
                    return;
                };
                let key = format!("resolvr:voc:{}", record.message_id);
                if let Err(e) = sink.set(&key, raw, Some(RETENTION)).await {
                    tracing::warn!(error = %e, "voc record write failed");
                    return;
                }

                // Append-only per-conversation index.
                let index_key = format!("resolvr:voc:conv:{}", record.conversation_id);
                let mut ids: Vec<String> = match sink.get(&index_key).await {
                    Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
                    _ => Vec::new(),
                };
                ids.push(record.message_id.clone());
                if let Ok(raw) = serde_json::to_string(&ids) {
                    let _ = sink.set(&index_key, raw, Some(RETENTION)).await;
                }
            }
        });
        Self { backend, queue }
    }

    pub fn save(&self, record: VocRecord) {
        self.queue.push(record);
    }

    /// The VOC trail for a conversation, oldest first.
    pub async fn for_conversation(&self, conversation_id: &str) -> Vec<VocRecord> {
        let index_key = format!("resolvr:voc:conv:{conversation_id}");
        let ids: Vec<String> = match self.backend.get(&index_key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            _ => return Vec::new(),
        };
        let mut records = Vec::new();
        for id in ids {
            if let Ok(Some(raw)) = self.backend.get(&format!("resolvr:voc:{id}")).await {
                if let Ok(record) = serde_json::from_str(&raw) {
                    records.push(record);
                }
            }
        }
        records
    }
}
