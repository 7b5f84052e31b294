//! Per-tool, per-tenant fixed-window rate limiting.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

struct Window {
    started: Instant,
    count: u32,
}

/// Token counters keyed by `(tool, tenant)` over one-minute fixed
/// windows.
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Try to take one token. Returns `false` when the window is
    /// exhausted.
    pub fn try_acquire(&self, tool: &str, tenant: &str, limit: u32) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows
            .entry((tool.to_owned(), tenant.to_owned()))
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.count = 0;
        }
        if window.count >= limit {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drop windows that have lapsed (housekeeping).
    pub fn prune(&self) {
        let now = Instant::now();
        self.windows
            .lock()
            .retain(|_, w| now.duration_since(w.started) < WINDOW);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_exact() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.try_acquire("lookup_customer_orders", "default", 5));
        }
        assert!(!limiter.try_acquire("lookup_customer_orders", "default", 5));
    }

    #[test]
    fn tenants_do_not_share_windows() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire("t", "acme", 1));
        assert!(!limiter.try_acquire("t", "acme", 1));
        assert!(limiter.try_acquire("t", "globex", 1));
    }

    #[test]
    fn tools_do_not_share_windows() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire("a", "default", 1));
        assert!(limiter.try_acquire("b", "default", 1));
    }
}
