//! Per-dependency circuit breakers and the process degradation level.
//!
//! Consecutive failures walk a dependency from healthy → degraded →
//! circuit-open. An open circuit short-circuits tool calls; once the
//! open window lapses, exactly one half-open probe is admitted and its
//! outcome decides whether the circuit closes or re-opens.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use rv_domain::tool::Dependency;
use rv_domain::trace::TraceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DepStatus {
    Healthy,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradationLevel {
    None,
    Partial,
    Full,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencySnapshot {
    pub dependency: String,
    pub status: DepStatus,
    pub consecutive_failures: u32,
    pub circuit_open: bool,
}

struct DepState {
    consecutive_failures: u32,
    status: DepStatus,
    circuit_open_until: Option<Instant>,
    /// Set once the open window lapses and a probe has been admitted.
    half_open_probe: bool,
}

impl DepState {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            status: DepStatus::Healthy,
            circuit_open_until: None,
            half_open_probe: false,
        }
    }

    fn circuit_open(&self, now: Instant) -> bool {
        self.circuit_open_until.is_some_and(|until| now < until)
    }
}

pub struct DependencyHealth {
    threshold: u32,
    reset: Duration,
    states: Mutex<HashMap<Dependency, DepState>>,
}

impl DependencyHealth {
    pub fn new(threshold: u32, reset: Duration) -> Self {
        let mut states = HashMap::new();
        for dep in Dependency::ALL {
            states.insert(dep, DepState::new());
        }
        Self {
            threshold,
            reset,
            states: Mutex::new(states),
        }
    }

    pub fn record_success(&self, dep: Dependency) {
        let mut states = self.states.lock();
        let state = states.entry(dep).or_insert_with(DepState::new);
        let was_open = state.circuit_open_until.is_some();
        state.consecutive_failures = 0;
        state.status = DepStatus::Healthy;
        state.circuit_open_until = None;
        state.half_open_probe = false;
        if was_open {
            TraceEvent::CircuitClosed { dependency: dep.as_str().to_owned() }.emit();
        }
    }

    pub fn record_failure(&self, dep: Dependency) {
        let mut states = self.states.lock();
        let state = states.entry(dep).or_insert_with(DepState::new);
        state.consecutive_failures += 1;
        state.half_open_probe = false;

        if state.consecutive_failures >= self.threshold {
            state.status = DepStatus::Down;
            state.circuit_open_until = Some(Instant::now() + self.reset);
            TraceEvent::CircuitOpened {
                dependency: dep.as_str().to_owned(),
                consecutive_failures: state.consecutive_failures,
            }
            .emit();
        } else if state.consecutive_failures >= self.threshold / 2 {
            state.status = DepStatus::Degraded;
        }
    }

    /// Whether calls may flow to this dependency right now. After an
    /// open window lapses, the first caller gets a half-open probe and
    /// subsequent callers are refused until the probe's outcome lands.
    pub fn is_available(&self, dep: Dependency) -> bool {
        let now = Instant::now();
        let mut states = self.states.lock();
        let state = states.entry(dep).or_insert_with(DepState::new);

        match state.circuit_open_until {
            None => true,
            Some(until) if now < until => false,
            Some(_) => {
                if state.half_open_probe {
                    false
                } else {
                    state.half_open_probe = true;
                    true
                }
            }
        }
    }

    /// Aggregate degradation: `Full` when three or more dependencies
    /// are down, `Partial` when any is down or two are degraded.
    pub fn degradation_level(&self) -> DegradationLevel {
        let states = self.states.lock();
        // A dependency counts as down until a success resets it, even
        // while a half-open probe is in flight.
        let down = states
            .values()
            .filter(|s| s.status == DepStatus::Down)
            .count();
        let degraded = states
            .values()
            .filter(|s| s.status == DepStatus::Degraded)
            .count();

        if down >= 3 {
            DegradationLevel::Full
        } else if down >= 1 || degraded >= 2 {
            DegradationLevel::Partial
        } else {
            DegradationLevel::None
        }
    }

    pub fn snapshot(&self) -> Vec<DependencySnapshot> {
        let now = Instant::now();
        let states = self.states.lock();
        let mut out: Vec<DependencySnapshot> = states
            .iter()
            .map(|(dep, s)| DependencySnapshot {
                dependency: dep.as_str().to_owned(),
                status: s.status,
                consecutive_failures: s.consecutive_failures,
                circuit_open: s.circuit_open(now),
            })
            .collect();
        out.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health() -> DependencyHealth {
        DependencyHealth::new(5, Duration::from_millis(50))
    }

    #[test]
    fn opens_at_threshold() {
        let h = health();
        for _ in 0..4 {
            h.record_failure(Dependency::Oms);
            assert!(h.is_available(Dependency::Oms));
        }
        h.record_failure(Dependency::Oms);
        assert!(!h.is_available(Dependency::Oms));
    }

    #[test]
    fn degraded_at_half_threshold() {
        let h = health();
        h.record_failure(Dependency::Tracking);
        h.record_failure(Dependency::Tracking);
        let snap = h.snapshot();
        let tracking = snap.iter().find(|s| s.dependency == "tracking").unwrap();
        assert_eq!(tracking.status, DepStatus::Degraded);
        assert!(!tracking.circuit_open);
    }

    #[test]
    fn success_resets() {
        let h = health();
        for _ in 0..5 {
            h.record_failure(Dependency::Payment);
        }
        assert!(!h.is_available(Dependency::Payment));
        h.record_success(Dependency::Payment);
        assert!(h.is_available(Dependency::Payment));
        assert_eq!(h.degradation_level(), DegradationLevel::None);
    }

    #[test]
    fn half_open_admits_one_probe() {
        let h = health();
        for _ in 0..5 {
            h.record_failure(Dependency::Llm);
        }
        assert!(!h.is_available(Dependency::Llm));
        std::thread::sleep(Duration::from_millis(70));
        // First caller after the window gets the probe; the second is
        // refused until an outcome is recorded.
        assert!(h.is_available(Dependency::Llm));
        assert!(!h.is_available(Dependency::Llm));

        // Probe failure re-opens the circuit.
        h.record_failure(Dependency::Llm);
        assert!(!h.is_available(Dependency::Llm));
    }

    #[test]
    fn degradation_levels() {
        let h = health();
        assert_eq!(h.degradation_level(), DegradationLevel::None);

        for _ in 0..5 {
            h.record_failure(Dependency::Oms);
        }
        assert_eq!(h.degradation_level(), DegradationLevel::Partial);

        for _ in 0..5 {
            h.record_failure(Dependency::Tracking);
        }
        for _ in 0..5 {
            h.record_failure(Dependency::Search);
        }
        assert_eq!(h.degradation_level(), DegradationLevel::Full);
    }

    #[test]
    fn two_degraded_is_partial() {
        let h = health();
        for _ in 0..3 {
            h.record_failure(Dependency::Oms);
        }
        for _ in 0..3 {
            h.record_failure(Dependency::Search);
        }
        assert_eq!(h.degradation_level(), DegradationLevel::Partial);
    }
}
