//! Per-provider health tracking.
//!
//! Each provider accumulates successes and failures inside a rolling window.
//! A provider is unhealthy once it reaches the failure threshold within the
//! current window; when the window expires the counters reset and the
//! provider becomes eligible again.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct WindowCounters {
    window_start: Instant,
    failures: u32,
    successes: u32,
}

/// Rolling-window health tracker shared by the fallback chain and the
/// degradation ladder.
pub struct HealthTracker {
    window: Duration,
    failure_threshold: u32,
    counters: Mutex<HashMap<String, WindowCounters>>,
}

impl HealthTracker {
    pub fn new(window: Duration, failure_threshold: u32) -> Self {
        Self {
            window,
            failure_threshold,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, provider_id: &str) {
        let mut counters = self.counters.lock();
        let entry = self.fresh_entry(&mut counters, provider_id);
        entry.successes += 1;
    }

    /// Record a failed call.
    pub fn record_failure(&self, provider_id: &str) {
        let mut counters = self.counters.lock();
        let entry = self.fresh_entry(&mut counters, provider_id);
        entry.failures += 1;
    }

    /// Whether the provider is currently eligible for calls.
    pub fn is_healthy(&self, provider_id: &str) -> bool {
        let mut counters = self.counters.lock();
        let entry = self.fresh_entry(&mut counters, provider_id);
        entry.failures < self.failure_threshold
    }

    /// Failures recorded in the current window.
    pub fn failure_count(&self, provider_id: &str) -> u32 {
        let mut counters = self.counters.lock();
        self.fresh_entry(&mut counters, provider_id).failures
    }

    fn fresh_entry<'a>(
        &self,
        counters: &'a mut HashMap<String, WindowCounters>,
        provider_id: &str,
    ) -> &'a mut WindowCounters {
        let entry = counters
            .entry(provider_id.to_owned())
            .or_insert_with(|| WindowCounters {
                window_start: Instant::now(),
                failures: 0,
                successes: 0,
            });
        if entry.window_start.elapsed() > self.window {
            entry.window_start = Instant::now();
            entry.failures = 0;
            entry.successes = 0;
        }
        entry
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 3)
    }
}
