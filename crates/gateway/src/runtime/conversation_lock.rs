//! Per-conversation concurrency control.
//!
//! Turns within one conversation run strictly in arrival order; turns
//! across conversations run freely in parallel. Each conversation maps
//! to a `Semaphore(1)` with a FIFO wait queue; at most one turn may be
//! queued behind the running one — a third concurrent message is
//! rejected so queues stay bounded.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct Entry {
    sem: Arc<Semaphore>,
    /// Running turn + queued waiters that hold a ticket.
    in_flight: u32,
}

struct Inner {
    locks: Mutex<HashMap<String, Entry>>,
}

/// Manages per-conversation run locks.
pub struct ConversationLockMap {
    inner: Arc<Inner>,
}

impl Default for ConversationLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLockMap {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Reserve a slot for a turn. Succeeds when the conversation has at
    /// most one turn in flight (the runner); fails with
    /// [`ConversationBusy`] when a waiter is already queued.
    ///
    /// The returned ticket must be driven with [`LockTicket::acquire`]
    /// to actually take the lock (it waits FIFO behind the runner).
    pub fn begin(&self, conversation_id: &str) -> Result<LockTicket, ConversationBusy> {
        let mut locks = self.inner.locks.lock();
        let entry = locks
            .entry(conversation_id.to_owned())
            .or_insert_with(|| Entry {
                sem: Arc::new(Semaphore::new(1)),
                in_flight: 0,
            });
        if entry.in_flight >= 2 {
            return Err(ConversationBusy);
        }
        entry.in_flight += 1;
        Ok(LockTicket {
            inner: self.inner.clone(),
            key: conversation_id.to_owned(),
            sem: entry.sem.clone(),
            consumed: false,
        })
    }

    /// Number of tracked conversations (monitoring).
    pub fn conversation_count(&self) -> usize {
        self.inner.locks.lock().len()
    }

    /// Drop entries with no turns in flight.
    pub fn prune_idle(&self) {
        self.inner.locks.lock().retain(|_, e| e.in_flight > 0);
    }
}

fn release(inner: &Inner, key: &str) {
    let mut locks = inner.locks.lock();
    if let Some(entry) = locks.get_mut(key) {
        entry.in_flight = entry.in_flight.saturating_sub(1);
    }
}

/// A reserved slot; await [`acquire`](Self::acquire) to take the lock.
pub struct LockTicket {
    inner: Arc<Inner>,
    key: String,
    sem: Arc<Semaphore>,
    consumed: bool,
}

impl LockTicket {
    pub async fn acquire(mut self) -> ConversationGuard {
        self.consumed = true;
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .expect("conversation semaphore never closes");
        ConversationGuard {
            _permit: permit,
            inner: self.inner.clone(),
            key: self.key.clone(),
        }
    }
}

impl Drop for LockTicket {
    fn drop(&mut self) {
        // A ticket abandoned before acquisition releases its slot; a
        // consumed ticket's slot is released by its guard.
        if !self.consumed {
            release(&self.inner, &self.key);
        }
    }
}

/// Held for the duration of one turn; releases the lock and the slot on
/// drop.
pub struct ConversationGuard {
    _permit: OwnedSemaphorePermit,
    inner: Arc<Inner>,
    key: String,
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        release(&self.inner, &self.key);
    }
}

/// A turn is running and another is already queued.
#[derive(Debug)]
pub struct ConversationBusy;

impl std::fmt::Display for ConversationBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conversation is busy: a turn is running and another is queued")
    }
}

impl std::error::Error for ConversationBusy {}
