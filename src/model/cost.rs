//! Cost accounting types. Field names and categories are grounded on
//! `examples/original_source/claude-code-builder/claude_code_builder/models/cost.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    ClaudeCode,
    Research,
    Planning,
    Execution,
    Testing,
    Validation,
}

impl std::fmt::Display for CostCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CostCategory::ClaudeCode => "claude_code",
            CostCategory::Research => "research",
            CostCategory::Planning => "planning",
            CostCategory::Execution => "execution",
            CostCategory::Testing => "testing",
            CostCategory::Validation => "validation",
        };
        write!(f, "{s}")
    }
}

impl CostCategory {
    pub fn all() -> &'static [CostCategory] {
        &[
            CostCategory::ClaudeCode,
            CostCategory::Research,
            CostCategory::Planning,
            CostCategory::Execution,
            CostCategory::Testing,
            CostCategory::Validation,
        ]
    }
}

/// A single recorded cost; amounts are USD. `amount`, `api_calls`, and
/// `tokens_used` are all non-negative by construction (see `CostEntry::new`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub category: CostCategory,
    pub amount: f64,
    pub description: String,
    pub phase: Option<String>,
    pub task: Option<String>,
    #[serde(default)]
    pub api_calls: u32,
    #[serde(default)]
    pub tokens_used: u64,
    pub model: Option<String>,
    pub duration_seconds: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CostEntry {
    pub fn new(category: CostCategory, amount: f64, description: impl Into<String>) -> Self {
        Self {
            category,
            amount: amount.max(0.0),
            description: description.into(),
            phase: None,
            task: None,
            api_calls: 0,
            tokens_used: 0,
            model: None,
            duration_seconds: None,
            timestamp: Utc::now(),
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// Per-category rollup: total amount, entry count, and average.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub total: f64,
    pub count: u64,
    pub total_tokens: u64,
    pub total_api_calls: u32,
}

impl CostBreakdown {
    pub fn average(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.total / self.count as f64 }
    }

    fn record(&mut self, entry: &CostEntry) {
        self.total += entry.amount;
        self.count += 1;
        self.total_tokens += entry.tokens_used;
        self.total_api_calls += entry.api_calls;
    }
}

pub(crate) fn apply_entry(breakdown: &mut CostBreakdown, entry: &CostEntry) {
    breakdown.record(entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_amount_is_clamped_to_zero() {
        let e = CostEntry::new(CostCategory::Research, -5.0, "oops");
        assert_eq!(e.amount, 0.0);
    }

    #[test]
    fn breakdown_average_with_no_entries_is_zero() {
        let b = CostBreakdown::default();
        assert_eq!(b.average(), 0.0);
    }

    #[test]
    fn breakdown_accumulates() {
        let mut b = CostBreakdown::default();
        let e1 = CostEntry::new(CostCategory::Execution, 4.0, "a");
        let e2 = CostEntry::new(CostCategory::Execution, 2.0, "b");
        apply_entry(&mut b, &e1);
        apply_entry(&mut b, &e2);
        assert_eq!(b.total, 6.0);
        assert_eq!(b.count, 2);
        assert_eq!(b.average(), 3.0);
    }
}
