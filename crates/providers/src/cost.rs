//! Rolling ledger of provider spend.
//!
//! Every wrapped provider call appends one record. The ledger backs the
//! budget guard and the `/api/costs` dashboard. Records are persisted as
//! JSONL and reloaded on startup; only the current month is kept in memory.

use std::path::PathBuf;

use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
}

/// Aggregated per-model spend for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSpend {
    pub model: String,
    pub cost: f64,
    pub percentage: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CostTracker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CostTracker {
    records: RwLock<Vec<CostRecord>>,
    persist_path: Option<PathBuf>,
}

impl CostTracker {
    /// In-memory tracker (tests, sub-agent scratch ledgers).
    pub fn ephemeral() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            persist_path: None,
        }
    }

    /// Tracker persisted under `state_path/costs.jsonl`. Reloads the current
    /// month's records on startup.
    pub fn new(state_path: &std::path::Path) -> Self {
        let persist_path = state_path.join("costs.jsonl");
        let mut records = Vec::new();
        if let Ok(data) = std::fs::read_to_string(&persist_path) {
            let now = Utc::now();
            for line in data.lines() {
                if let Ok(r) = serde_json::from_str::<CostRecord>(line) {
                    if r.timestamp.year() == now.year() && r.timestamp.month() == now.month() {
                        records.push(r);
                    }
                }
            }
        }
        if !records.is_empty() {
            tracing::info!(count = records.len(), "loaded cost records from disk");
        }
        Self {
            records: RwLock::new(records),
            persist_path: Some(persist_path),
        }
    }

    /// Append one record.
    pub fn record(&self, record: CostRecord) {
        if let Some(path) = &self.persist_path {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(json) = serde_json::to_string(&record) {
                use std::io::Write;
                if let Ok(mut f) = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                {
                    let _ = writeln!(f, "{}", json);
                }
            }
        }
        self.records.write().push(record);
    }

    /// Spend since UTC midnight.
    pub fn daily_spend(&self) -> f64 {
        let today = Utc::now().date_naive();
        self.records
            .read()
            .iter()
            .filter(|r| r.timestamp.date_naive() == today)
            .map(|r| r.cost_usd)
            .sum()
    }

    /// Spend since the first of the current UTC month.
    pub fn monthly_spend(&self) -> f64 {
        let now = Utc::now();
        self.records
            .read()
            .iter()
            .filter(|r| r.timestamp.year() == now.year() && r.timestamp.month() == now.month())
            .map(|r| r.cost_usd)
            .sum()
    }

    pub fn total_requests(&self) -> usize {
        self.records.read().len()
    }

    /// Top models by spend this month, with percentage of the total.
    pub fn top_models(&self, limit: usize) -> Vec<ModelSpend> {
        let records = self.records.read();
        let mut by_model: std::collections::HashMap<&str, f64> = std::collections::HashMap::new();
        let mut total = 0.0;
        for r in records.iter() {
            *by_model.entry(r.model.as_str()).or_default() += r.cost_usd;
            total += r.cost_usd;
        }
        let mut rows: Vec<ModelSpend> = by_model
            .into_iter()
            .map(|(model, cost)| ModelSpend {
                model: model.to_owned(),
                cost,
                percentage: if total > 0.0 { cost / total * 100.0 } else { 0.0 },
            })
            .collect();
        rows.sort_by(|a, b| b.cost.partial_cmp(&a.cost).unwrap_or(std::cmp::Ordering::Equal));
        rows.truncate(limit);
        rows
    }
}
