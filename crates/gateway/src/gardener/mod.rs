//! Background gardener — tiered maintenance over the memory store.
//!
//! One timer task drives everything: a light tick every interval, a deep
//! tick every `deep_every` light ticks, and a sleep tick every
//! `sleep_every` ticks gated to the user's quiet hours. Ticks run
//! sequentially on the same task, so tiers never overlap themselves or
//! each other. Every step is wrapped in a catch-all that logs at warn and
//! returns; the gardener never takes the server down.

pub mod deep;
pub mod gaps;
pub mod light;
pub mod sleep;

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use valet_domain::config::GardenerConfig;
use valet_domain::trace::TraceEvent;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Counters surfaced by `/api/state`.
#[derive(Default)]
pub struct GardenerStats {
    pub light_ticks: AtomicU64,
    pub deep_ticks: AtomicU64,
    pub sleep_ticks: AtomicU64,
    pub items_fired: AtomicU64,
    pub items_expired: AtomicU64,
    pub memories_fused: AtomicU64,
    pub memories_pruned: AtomicU64,
    pub last_tick_at: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Serialize)]
pub struct GardenerSnapshot {
    pub light_ticks: u64,
    pub deep_ticks: u64,
    pub sleep_ticks: u64,
    pub items_fired: u64,
    pub items_expired: u64,
    pub memories_fused: u64,
    pub memories_pruned: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl GardenerStats {
    pub fn snapshot(&self) -> GardenerSnapshot {
        GardenerSnapshot {
            light_ticks: self.light_ticks.load(Ordering::Relaxed),
            deep_ticks: self.deep_ticks.load(Ordering::Relaxed),
            sleep_ticks: self.sleep_ticks.load(Ordering::Relaxed),
            items_fired: self.items_fired.load(Ordering::Relaxed),
            items_expired: self.items_expired.load(Ordering::Relaxed),
            memories_fused: self.memories_fused.load(Ordering::Relaxed),
            memories_pruned: self.memories_pruned.load(Ordering::Relaxed),
            last_tick_at: *self.last_tick_at.lock(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tick loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start the gardener on its own task.
pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(state.config.gardener.light_interval_secs);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of `interval` fires immediately; skip it so the
        // server settles before maintenance starts.
        interval.tick().await;

        let mut tick: u64 = 0;
        loop {
            interval.tick().await;
            tick += 1;
            run_tick(&state, tick).await;
        }
    })
}

/// Run one tick: light always, deep and sleep on their cadence.
pub async fn run_tick(state: &AppState, tick: u64) {
    let cfg = &state.config.gardener;
    let start = std::time::Instant::now();

    light::run(state).await;
    state
        .gardener_stats
        .light_ticks
        .fetch_add(1, Ordering::Relaxed);

    if cfg.deep_every > 0 && tick % cfg.deep_every == 0 {
        deep::run(state).await;
        state
            .gardener_stats
            .deep_ticks
            .fetch_add(1, Ordering::Relaxed);
        TraceEvent::GardenerTick {
            tier: "deep".into(),
            tick,
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();
    }

    if cfg.sleep_every > 0 && tick % cfg.sleep_every == 0 && in_quiet_hours(cfg, Utc::now()) {
        sleep::run(state).await;
        state
            .gardener_stats
            .sleep_ticks
            .fetch_add(1, Ordering::Relaxed);
        TraceEvent::GardenerTick {
            tier: "sleep".into(),
            tick,
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();
    }

    *state.gardener_stats.last_tick_at.lock() = Some(Utc::now());
}

/// Whether `now` falls inside the configured quiet-hours window, evaluated
/// in the configured timezone.
pub fn in_quiet_hours(cfg: &GardenerConfig, now: DateTime<Utc>) -> bool {
    let hour = match chrono_tz::Tz::from_str(&cfg.timezone) {
        Ok(tz) => now.with_timezone(&tz).hour(),
        Err(_) => {
            tracing::warn!(timezone = %cfg.timezone, "unknown timezone, using UTC");
            now.hour()
        }
    };
    cfg.quiet_hours.contains(hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn quiet_hours_respect_timezone() {
        let mut cfg = GardenerConfig::default();
        cfg.timezone = "Europe/Dublin".into();
        // 03:00 UTC in summer is 04:00 in Dublin — inside 02:00–05:00.
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 3, 0, 0).unwrap();
        assert!(in_quiet_hours(&cfg, now));
        // 12:00 UTC is 13:00 Dublin — outside.
        let midday = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        assert!(!in_quiet_hours(&cfg, midday));
    }

    #[test]
    fn wraparound_window_honored() {
        let mut cfg = GardenerConfig::default();
        cfg.quiet_hours.start = 23;
        cfg.quiet_hours.end = 2;
        let late = Utc.with_ymd_and_hms(2025, 1, 1, 23, 30, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert!(in_quiet_hours(&cfg, late));
        assert!(in_quiet_hours(&cfg, early));
        assert!(!in_quiet_hours(&cfg, noon));
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let mut cfg = GardenerConfig::default();
        cfg.timezone = "Mars/Olympus".into();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap();
        assert!(in_quiet_hours(&cfg, now));
    }
}
