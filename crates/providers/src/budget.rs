//! Budget guard over the cost ledger.
//!
//! Checked before a provider call with the estimated cost of that call.
//! Blocks when the daily or monthly ceiling would be exceeded; emits a soft
//! warning once usage crosses the warning threshold. Budget errors are never
//! retried.

use std::sync::Arc;

use valet_domain::config::BudgetConfig;
use valet_domain::error::{Error, Result};

use crate::cost::CostTracker;

/// Verdict of a passing budget check.
#[derive(Debug, Clone, Default)]
pub struct BudgetVerdict {
    /// Set when usage crossed the warning threshold but not the ceiling.
    pub warning: Option<String>,
}

pub struct BudgetGuard {
    config: BudgetConfig,
    tracker: Arc<CostTracker>,
}

impl BudgetGuard {
    pub fn new(config: BudgetConfig, tracker: Arc<CostTracker>) -> Self {
        Self { config, tracker }
    }

    pub fn tracker(&self) -> &Arc<CostTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Check whether spending `estimated_cost` now stays within budget.
    ///
    /// Returns `Err(Error::Budget)` naming the exceeded window ("daily" or
    /// "monthly"); otherwise `Ok` with an optional soft warning. A spend
    /// landing exactly on the warning threshold warns but does not block.
    pub fn check(&self, estimated_cost: f64) -> Result<BudgetVerdict> {
        let mut verdict = BudgetVerdict::default();

        if let Some(daily) = self.config.daily_usd {
            let spent = self.tracker.daily_spend();
            if spent + estimated_cost > daily {
                return Err(Error::Budget(format!(
                    "daily budget exceeded: {:.4} + {:.4} > {:.2} USD",
                    spent, estimated_cost, daily
                )));
            }
            if spent + estimated_cost >= daily * self.config.warning_threshold {
                verdict.warning = Some(format!(
                    "daily spend at {:.0}% of budget ({:.4}/{:.2} USD)",
                    (spent + estimated_cost) / daily * 100.0,
                    spent + estimated_cost,
                    daily
                ));
            }
        }

        if let Some(monthly) = self.config.monthly_usd {
            let spent = self.tracker.monthly_spend();
            if spent + estimated_cost > monthly {
                return Err(Error::Budget(format!(
                    "monthly budget exceeded: {:.4} + {:.4} > {:.2} USD",
                    spent, estimated_cost, monthly
                )));
            }
            if verdict.warning.is_none()
                && spent + estimated_cost >= monthly * self.config.warning_threshold
            {
                verdict.warning = Some(format!(
                    "monthly spend at {:.0}% of budget ({:.4}/{:.2} USD)",
                    (spent + estimated_cost) / monthly * 100.0,
                    spent + estimated_cost,
                    monthly
                ));
            }
        }

        if let Some(w) = &verdict.warning {
            tracing::warn!(warning = %w, "budget warning threshold crossed");
        }

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostRecord;
    use chrono::Utc;

    fn guard(daily: Option<f64>, monthly: Option<f64>, spent: f64) -> BudgetGuard {
        let tracker = Arc::new(CostTracker::ephemeral());
        if spent > 0.0 {
            tracker.record(CostRecord {
                timestamp: Utc::now(),
                session_id: "s".into(),
                model: "m".into(),
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: spent,
            });
        }
        BudgetGuard::new(
            BudgetConfig {
                daily_usd: daily,
                monthly_usd: monthly,
                warning_threshold: 0.75,
            },
            tracker,
        )
    }

    #[test]
    fn no_limits_always_pass() {
        let g = guard(None, None, 100.0);
        assert!(g.check(10.0).unwrap().warning.is_none());
    }

    #[test]
    fn daily_exceeded_blocks_with_daily_in_message() {
        let g = guard(Some(1.0), None, 0.9);
        let err = g.check(0.2).unwrap_err();
        assert!(err.to_string().contains("daily"));
    }

    #[test]
    fn monthly_exceeded_blocks_with_monthly_in_message() {
        let g = guard(None, Some(10.0), 9.95);
        let err = g.check(0.1).unwrap_err();
        assert!(err.to_string().contains("monthly"));
    }

    #[test]
    fn exactly_at_warning_threshold_warns_but_passes() {
        // 0.75 of 1.00 = 0.75; spend 0.5 + estimate 0.25 lands exactly there.
        let g = guard(Some(1.0), None, 0.5);
        let verdict = g.check(0.25).unwrap();
        assert!(verdict.warning.is_some());
    }

    #[test]
    fn below_warning_threshold_is_silent() {
        let g = guard(Some(1.0), None, 0.1);
        let verdict = g.check(0.1).unwrap();
        assert!(verdict.warning.is_none());
    }
}
