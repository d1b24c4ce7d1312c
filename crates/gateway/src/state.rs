use std::path::PathBuf;
use std::sync::Arc;

use valet_domain::config::Config;
use valet_memory::MemoryStore;
use valet_providers::{BudgetGuard, CostTracker, DegradationLadder};
use valet_sessions::SessionStore;
use valet_skills::SkillRegistry;

use crate::channels::ChannelFabric;
use crate::gardener::GardenerStats;
use crate::runtime::cancel::CancelMap;
use crate::runtime::subagent::SubAgentScheduler;

/// Shared application state passed to all API handlers and background
/// tasks.
///
/// Fields are grouped by concern:
/// - **Core services** — config, memory, sessions, skills
/// - **Providers** — degradation ladder, cost tracker, budget guard
/// - **Runtime** — cancel map, channel fabric, sub-agent scheduler
/// - **Security** — startup-computed token hash
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub memory: Arc<MemoryStore>,
    pub sessions: Arc<SessionStore>,
    pub skills: Arc<SkillRegistry>,

    // ── Providers ─────────────────────────────────────────────────────
    pub ladder: Arc<DegradationLadder>,
    pub costs: Arc<CostTracker>,
    pub budget: Arc<BudgetGuard>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub cancel_map: Arc<CancelMap>,
    pub channels: Arc<ChannelFabric>,
    pub subagents: Arc<SubAgentScheduler>,
    pub gardener_stats: Arc<GardenerStats>,

    // ── Filesystem ────────────────────────────────────────────────────
    /// Workspace root that file skills and `/api/files` are confined to.
    pub workspace: PathBuf,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
