//! Cost Tracker (C3): per-category accounting with monotonic budget alerts.
//!
//! Grounded on `examples/original_source/claude-code-builder/claude_code_builder/models/cost.py`.
//! See SPEC_FULL.md §4.3.

use crate::errors::CostTrackerError;
use crate::model::cost::{CostBreakdown, CostCategory, CostEntry};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

/// Default budget-alert thresholds, as fractions of the budget. Each fires
/// at most once per execution.
pub const DEFAULT_THRESHOLDS: &[f64] = &[0.5, 0.75, 0.9, 1.0];

#[derive(Debug, Clone)]
pub struct BudgetAlert {
    pub threshold: f64,
    pub total_at_trigger: f64,
    pub budget: f64,
}

struct Inner {
    entries: Vec<CostEntry>,
    breakdown: HashMap<CostCategory, CostBreakdown>,
    budget: Option<f64>,
    thresholds: Vec<f64>,
    alerts_triggered: Vec<f64>,
}

/// Session-scoped cost tracker, bound to a single execution.
pub struct CostTracker {
    execution_id: String,
    inner: Mutex<Inner>,
}

impl CostTracker {
    pub fn new(execution_id: impl Into<String>, budget: Option<f64>) -> Self {
        Self::with_thresholds(execution_id, budget, DEFAULT_THRESHOLDS.to_vec())
    }

    pub fn with_thresholds(execution_id: impl Into<String>, budget: Option<f64>, thresholds: Vec<f64>) -> Self {
        Self {
            execution_id: execution_id.into(),
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                breakdown: HashMap::new(),
                budget,
                thresholds,
                alerts_triggered: Vec::new(),
            }),
        }
    }

    /// Records a cost entry and returns any budget-alert thresholds that
    /// newly fired as a result (never re-fires a threshold already in
    /// `alerts_triggered`).
    pub fn add(&self, entry: CostEntry) -> Result<Vec<BudgetAlert>, CostTrackerError> {
        if entry.amount < 0.0 {
            return Err(CostTrackerError::NegativeAmount(entry.amount));
        }
        let mut inner = self.inner.lock().expect("cost tracker lock poisoned");
        crate::model::cost::apply_entry(inner.breakdown.entry(entry.category).or_default(), &entry);
        inner.entries.push(entry);

        let mut fired = Vec::new();
        if let Some(budget) = inner.budget {
            if budget > 0.0 {
                let total: f64 = inner.breakdown.values().map(|b| b.total).sum();
                let usage = total / budget;
                let thresholds = inner.thresholds.clone();
                for threshold in thresholds {
                    if usage >= threshold && !inner.alerts_triggered.contains(&threshold) {
                        inner.alerts_triggered.push(threshold);
                        fired.push(BudgetAlert {
                            threshold,
                            total_at_trigger: total,
                            budget,
                        });
                    }
                }
            }
        }
        drop(inner);
        for alert in &fired {
            warn!(
                execution_id = %self.execution_id,
                threshold = alert.threshold,
                total = alert.total_at_trigger,
                budget = alert.budget,
                "budget alert threshold crossed"
            );
        }
        Ok(fired)
    }

    pub fn total(&self, category: Option<CostCategory>) -> f64 {
        let inner = self.inner.lock().expect("cost tracker lock poisoned");
        match category {
            Some(c) => inner.breakdown.get(&c).map(|b| b.total).unwrap_or(0.0),
            None => inner.breakdown.values().map(|b| b.total).sum(),
        }
    }

    pub fn breakdown(&self) -> HashMap<CostCategory, CostBreakdown> {
        self.inner.lock().expect("cost tracker lock poisoned").breakdown.clone()
    }

    pub fn costs_for_phase(&self, phase_id: &str) -> Vec<CostEntry> {
        self.inner
            .lock()
            .expect("cost tracker lock poisoned")
            .entries
            .iter()
            .filter(|e| e.phase.as_deref() == Some(phase_id))
            .cloned()
            .collect()
    }

    pub fn costs_for_task(&self, task_id: &str) -> Vec<CostEntry> {
        self.inner
            .lock()
            .expect("cost tracker lock poisoned")
            .entries
            .iter()
            .filter(|e| e.task.as_deref() == Some(task_id))
            .cloned()
            .collect()
    }

    pub fn remaining_budget(&self) -> Option<f64> {
        let inner = self.inner.lock().expect("cost tracker lock poisoned");
        inner.budget.map(|b| (b - self.total(None)).max(0.0))
    }

    pub fn usage_percent(&self) -> Option<f64> {
        let inner = self.inner.lock().expect("cost tracker lock poisoned");
        inner.budget.filter(|b| *b > 0.0).map(|b| (self.total(None) / b) * 100.0)
    }

    pub fn alerts_triggered(&self) -> Vec<f64> {
        self.inner.lock().expect("cost tracker lock poisoned").alerts_triggered.clone()
    }

    /// CSV export: one row per entry, amounts rounded to 4 decimal places
    /// (SPEC_FULL §8 round-trip law).
    pub fn export_csv(&self) -> String {
        let inner = self.inner.lock().expect("cost tracker lock poisoned");
        let mut out = String::from("category,amount,description,phase,task,api_calls,tokens_used,model,timestamp\n");
        for e in &inner.entries {
            out.push_str(&format!(
                "{},{:.4},{},{},{},{},{},{},{}\n",
                e.category,
                e.amount,
                csv_escape(&e.description),
                e.phase.as_deref().unwrap_or(""),
                e.task.as_deref().unwrap_or(""),
                e.api_calls,
                e.tokens_used,
                e.model.as_deref().unwrap_or(""),
                e.timestamp.to_rfc3339(),
            ));
        }
        out
    }

    pub fn log_summary(&self) {
        info!(
            execution_id = %self.execution_id,
            total = self.total(None),
            "cost summary"
        );
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_matches_sum_of_entries_in_category() {
        let tracker = CostTracker::new("exec-1", None);
        tracker.add(CostEntry::new(CostCategory::Execution, 4.0, "a")).unwrap();
        tracker.add(CostEntry::new(CostCategory::Execution, 2.0, "b")).unwrap();
        tracker.add(CostEntry::new(CostCategory::Research, 1.0, "c")).unwrap();
        assert_eq!(tracker.total(Some(CostCategory::Execution)), 6.0);
        assert_eq!(tracker.total(None), 7.0);
    }

    #[test]
    fn budget_zero_disables_alerts() {
        let tracker = CostTracker::new("exec-1", Some(0.0));
        let fired = tracker.add(CostEntry::new(CostCategory::Execution, 100.0, "a")).unwrap();
        assert!(fired.is_empty());
        assert!(tracker.alerts_triggered().is_empty());
    }

    #[test]
    fn each_threshold_fires_at_most_once_scenario_s6() {
        let tracker = CostTracker::new("exec-1", Some(10.0));
        let mut all_fired = Vec::new();
        for amount in [4.0, 2.0, 3.0, 2.0] {
            let fired = tracker.add(CostEntry::new(CostCategory::Execution, amount, "x")).unwrap();
            all_fired.extend(fired.into_iter().map(|a| a.threshold));
        }
        assert_eq!(all_fired, vec![0.5, 0.75, 0.9, 1.0]);
        assert_eq!(tracker.alerts_triggered(), vec![0.5, 0.75, 0.9, 1.0]);
    }

    #[test]
    fn negative_amount_is_rejected() {
        // CostEntry::new clamps to zero, so a negative amount can only reach
        // the tracker by constructing the entry directly and bypassing that.
        let tracker = CostTracker::new("exec-1", None);
        let mut raw = CostEntry::new(CostCategory::Execution, 5.0, "bad");
        raw.amount = -5.0;
        assert!(tracker.add(raw).is_err());
    }

    #[test]
    fn csv_export_round_trips_amount_precision() {
        let tracker = CostTracker::new("exec-1", None);
        tracker.add(CostEntry::new(CostCategory::Execution, 1.23456, "x")).unwrap();
        let csv = tracker.export_csv();
        assert!(csv.contains("1.2346"));
    }
}
