use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Point-in-time view of one backend, as reported by `status()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendHealth {
    /// False while the most recent call (or configuration) failed.
    pub healthy: bool,
    pub consecutive_failures: u32,
    /// True while the selector routes around this backend.
    pub cooling_down: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    last_error: Option<String>,
}

/// Consecutive-failure tracker for one retrieval backend.
///
/// After `after_failures` failures in a row the backend is considered
/// unavailable for `cooldown`; the first call after the cooldown tries it
/// again and a success resets the count.
#[derive(Debug)]
pub struct HealthTracker {
    name: &'static str,
    after_failures: u32,
    cooldown: Duration,
    state: Mutex<State>,
}

impl HealthTracker {
    pub fn new(name: &'static str, after_failures: u32, cooldown: Duration) -> Self {
        Self { name, after_failures: after_failures.max(1), cooldown, state: Mutex::new(State::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_success(&self) {
        let mut s = self.lock();
        if s.consecutive_failures > 0 {
            info!(backend = self.name, after = s.consecutive_failures, "backend recovered");
        }
        *s = State::default();
    }

    pub fn record_failure(&self, error: &str) {
        let mut s = self.lock();
        s.consecutive_failures = s.consecutive_failures.saturating_add(1);
        s.last_failure = Some(Instant::now());
        s.last_error = Some(error.to_string());
        if s.consecutive_failures == self.after_failures {
            warn!(backend = self.name, failures = s.consecutive_failures, cooldown_ms = self.cooldown.as_millis() as u64, "backend marked unavailable");
        }
    }

    fn cooling_down(&self, s: &State) -> bool {
        s.consecutive_failures >= self.after_failures
            && s.last_failure.is_some_and(|t| t.elapsed() < self.cooldown)
    }

    /// Whether the selector may route queries to this backend.
    pub fn is_available(&self) -> bool {
        !self.cooling_down(&self.lock())
    }

    pub fn snapshot(&self) -> BackendHealth {
        let s = self.lock();
        BackendHealth {
            healthy: s.consecutive_failures == 0,
            consecutive_failures: s.consecutive_failures,
            cooling_down: self.cooling_down(&s),
            last_error: s.last_error.clone(),
        }
    }
}
