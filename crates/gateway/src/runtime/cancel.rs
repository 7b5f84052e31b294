//! Per-conversation cancellation tokens.
//!
//! Each running pipeline registers a token; `POST
//! /v1/conversations/:id/cancel` flips it. The orchestrator checks the
//! token between steps and abandons the turn cleanly — prefetched tool
//! tasks are left to finish and discard their output.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Active cancellation tokens keyed by conversation id.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conversation_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens
            .lock()
            .insert(conversation_id.to_owned(), token.clone());
        token
    }

    /// Returns true when a running pipeline was found and signalled.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        match self.tokens.lock().get(conversation_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, conversation_id: &str) {
        self.tokens.lock().remove(conversation_id);
    }

    pub fn is_running(&self, conversation_id: &str) -> bool {
        self.tokens.lock().contains_key(conversation_id)
    }
}
