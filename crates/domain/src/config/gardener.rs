use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Background gardener
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GardenerConfig {
    /// Light tick interval in seconds.
    #[serde(default = "default_light_interval_secs")]
    pub light_interval_secs: u64,
    /// Deep tick fires every N light ticks.
    #[serde(default = "default_deep_every")]
    pub deep_every: u64,
    /// Sleep tick fires every N light ticks, inside quiet hours only.
    #[serde(default = "default_sleep_every")]
    pub sleep_every: u64,
    /// Local-time window during which the sleep tick may run.
    #[serde(default)]
    pub quiet_hours: QuietHours,
    /// IANA timezone for quiet-hours evaluation (e.g. "Europe/Dublin").
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Memories recomputed per light tick at most.
    #[serde(default = "default_light_batch")]
    pub light_batch: usize,
    /// Pending scheduled items older than this many hours past their
    /// trigger are expired instead of fired.
    #[serde(default = "default_expire_grace_hours")]
    pub expire_grace_hours: i64,
    /// Archived memories older than this many days are pruned.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Sessions idle longer than this many hours get summarized.
    #[serde(default = "default_summarize_after_hours")]
    pub summarize_after_hours: i64,
    #[serde(default)]
    pub fusion: FusionConfig,
}

fn default_light_interval_secs() -> u64 {
    300
}
fn default_deep_every() -> u64 {
    72
}
fn default_sleep_every() -> u64 {
    288
}
fn default_timezone() -> String {
    "UTC".into()
}
fn default_light_batch() -> usize {
    500
}
fn default_expire_grace_hours() -> i64 {
    24
}
fn default_retention_days() -> i64 {
    30
}
fn default_summarize_after_hours() -> i64 {
    12
}

impl Default for GardenerConfig {
    fn default() -> Self {
        Self {
            light_interval_secs: default_light_interval_secs(),
            deep_every: default_deep_every(),
            sleep_every: default_sleep_every(),
            quiet_hours: QuietHours::default(),
            timezone: default_timezone(),
            light_batch: default_light_batch(),
            expire_grace_hours: default_expire_grace_hours(),
            retention_days: default_retention_days(),
            summarize_after_hours: default_summarize_after_hours(),
            fusion: FusionConfig::default(),
        }
    }
}

/// Local-time hour window. `start > end` wraps around midnight
/// (e.g. 23–06).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuietHours {
    #[serde(default = "default_quiet_start")]
    pub start: u32,
    #[serde(default = "default_quiet_end")]
    pub end: u32,
}

fn default_quiet_start() -> u32 {
    2
}
fn default_quiet_end() -> u32 {
    5
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            start: default_quiet_start(),
            end: default_quiet_end(),
        }
    }
}

impl QuietHours {
    /// Whether the given local hour falls inside the window.
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            // Wrap-around window, e.g. start=23 end=6.
            hour >= self.start || hour < self.end
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fusion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Components smaller than this are dropped.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    /// Largest clusters kept per pass.
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,
    /// Deep tick fuses within a single category.
    #[serde(default)]
    pub deep_cross_category: bool,
    /// Sleep tick (dream cycle) may fuse across categories.
    #[serde(default = "default_true")]
    pub sleep_cross_category: bool,
}

fn default_min_cluster_size() -> usize {
    3
}
fn default_max_clusters() -> usize {
    5
}
fn default_true() -> bool {
    true
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: default_min_cluster_size(),
            max_clusters: default_max_clusters(),
            deep_cross_category: false,
            sleep_cross_category: default_true(),
        }
    }
}
