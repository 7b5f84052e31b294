//! Prompt-version A/B assignment.
//!
//! Assignment is sticky per conversation: a stable hash of the
//! conversation id buckets it into 0–99, variants claim contiguous
//! ranges in name order, and the remainder uses the configured default.

use std::collections::HashMap;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use rv_domain::config::ExperimentsConfig;

pub struct ExperimentEngine {
    /// (variant, percent) in deterministic name order.
    rollout: Vec<(String, u8)>,
    assignments: RwLock<HashMap<String, String>>,
}

impl ExperimentEngine {
    pub fn new(config: &ExperimentsConfig) -> Self {
        let mut rollout: Vec<(String, u8)> = config
            .prompt_version_rollout
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        rollout.sort();
        Self {
            rollout,
            assignments: RwLock::new(HashMap::new()),
        }
    }

    /// The prompt version for a conversation, assigned once and cached.
    pub fn prompt_version_for(&self, conversation_id: &str, default: &str) -> String {
        if let Some(version) = self.assignments.read().get(conversation_id) {
            return version.clone();
        }

        let bucket = bucket_of(conversation_id);
        let mut floor = 0u32;
        let mut chosen = default.to_owned();
        for (variant, percent) in &self.rollout {
            let ceil = floor + *percent as u32;
            if (bucket as u32) >= floor && (bucket as u32) < ceil {
                chosen = variant.clone();
                break;
            }
            floor = ceil;
        }

        self.assignments
            .write()
            .insert(conversation_id.to_owned(), chosen.clone());
        chosen
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.read().len()
    }
}

/// Stable bucket 0–99 from the conversation id.
fn bucket_of(conversation_id: &str) -> u8 {
    let digest = Sha256::digest(conversation_id.as_bytes());
    (u16::from_be_bytes([digest[0], digest[1]]) % 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rollout: &[(&str, u8)]) -> ExperimentsConfig {
        ExperimentsConfig {
            prompt_version_rollout: rollout
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn assignment_is_sticky() {
        let engine = ExperimentEngine::new(&config(&[("v3", 50)]));
        let first = engine.prompt_version_for("c1", "v2");
        for _ in 0..10 {
            assert_eq!(engine.prompt_version_for("c1", "v2"), first);
        }
        assert_eq!(engine.assignment_count(), 1);
    }

    #[test]
    fn zero_rollout_always_defaults() {
        let engine = ExperimentEngine::new(&config(&[]));
        assert_eq!(engine.prompt_version_for("anything", "v2"), "v2");
    }

    #[test]
    fn full_rollout_always_assigns_variant() {
        let engine = ExperimentEngine::new(&config(&[("v3", 100)]));
        for i in 0..20 {
            assert_eq!(engine.prompt_version_for(&format!("c{i}"), "v2"), "v3");
        }
    }

    #[test]
    fn split_roughly_matches_percentages() {
        let engine = ExperimentEngine::new(&config(&[("v3", 50)]));
        let assigned = (0..200)
            .filter(|i| engine.prompt_version_for(&format!("conv-{i}"), "v2") == "v3")
            .count();
        // Stable-hash split: not exact, but nowhere near 0 or 200.
        assert!((60..=140).contains(&assigned), "assigned = {assigned}");
    }
}
