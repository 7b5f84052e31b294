//! Bounded fire-and-forget work queues.
//!
//! Best-effort side work (learning collection, VOC record saves) rides
//! a bounded queue with drop-oldest overflow so a slow sink can never
//! grow memory or block the pipeline.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use rv_domain::trace::TraceEvent;

struct Inner<T> {
    name: &'static str,
    capacity: usize,
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
}

/// A bounded multi-producer queue drained by one worker task.
pub struct BackgroundQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BackgroundQueue<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Send + 'static> BackgroundQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                capacity,
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Enqueue work. On overflow the oldest item is dropped (and
    /// counted) — never the caller's time.
    pub fn push(&self, item: T) {
        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.capacity {
                queue.pop_front();
                TraceEvent::BackgroundDropped {
                    queue: self.inner.name.to_owned(),
                }
                .emit();
            }
            queue.push_back(item);
        }
        self.inner.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.lock().is_empty()
    }

    /// Spawn the worker loop. One worker per queue.
    pub fn start<F, Fut>(&self, worker: F)
    where
        F: Fn(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                let item = { inner.queue.lock().pop_front() };
                match item {
                    Some(item) => worker(item).await,
                    None => inner.notify.notified().await,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn worker_drains_pushed_items() {
        let queue: BackgroundQueue<u32> = BackgroundQueue::new("test", 10);
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = seen.clone();
        queue.start(move |n| {
            let seen = seen2.clone();
            async move {
                seen.fetch_add(n, Ordering::SeqCst);
            }
        });

        queue.push(1);
        queue.push(2);
        queue.push(3);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 6);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let queue: BackgroundQueue<u32> = BackgroundQueue::new("test", 2);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 2);
        // 1 was dropped; 2 and 3 remain in order.
        assert_eq!(queue.inner.queue.lock().iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }
}
