//! The phase: an ordered group of tasks sharing an objective, the unit of
//! checkpointing and recovery.

use super::task::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Planning,
    Executing,
    Validating,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::Skipped
        )
    }
}

/// Invariants: the task dependency graph is a DAG confined to the phase;
/// task ids are unique within the phase; `progress` is the weight-weighted
/// average of terminal-success task progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub objective: String,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default = "default_complexity")]
    pub complexity: u8,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    pub rollback_strategy: Option<String>,
}

fn default_complexity() -> u8 {
    5
}

fn default_priority() -> u8 {
    5
}

impl Phase {
    pub fn new(id: impl Into<String>, name: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            objective: objective.into(),
            tasks: Vec::new(),
            status: PhaseStatus::Pending,
            complexity: default_complexity(),
            priority: default_priority(),
            required_capabilities: Vec::new(),
            rollback_strategy: None,
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Progress in [0, 100]: weight-weighted average of task completion.
    /// A phase with no tasks is vacuously 100% complete (SPEC_FULL §8
    /// boundary behavior).
    pub fn progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 100.0;
        }
        let total_weight: f64 = self.tasks.iter().map(|t| t.weight).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        let done_weight: f64 = self
            .tasks
            .iter()
            .filter(|t| t.status.is_success())
            .map(|t| t.weight)
            .sum();
        (done_weight / total_weight) * 100.0
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Skipped)
            .count()
    }

    /// True once every task has reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// Recomputes `status` from task terminal states. Call after the last
    /// task in the phase settles.
    pub fn finalize_status(&mut self) {
        if self.tasks.is_empty() {
            self.status = PhaseStatus::Completed;
            return;
        }
        let failed = self.failed_count();
        let completed = self.completed_count() + self.skipped_count();
        self.status = if failed == 0 && completed == self.tasks.len() {
            PhaseStatus::Completed
        } else if completed == 0 {
            PhaseStatus::Failed
        } else {
            // partial: some succeeded, some failed. Treated as Failed unless
            // the caller explicitly continues on error; the orchestrator
            // decides whether that is acceptable.
            PhaseStatus::Failed
        };
    }

    pub fn task_ids(&self) -> HashSet<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::TaskKind;

    #[test]
    fn empty_phase_is_fully_complete() {
        let p = Phase::new("p1", "Empty", "nothing to do");
        assert_eq!(p.progress(), 100.0);
    }

    #[test]
    fn progress_is_weight_weighted() {
        let mut a = Task::new("a", "A", TaskKind::Analysis).with_weight(1.0);
        a.mark_started();
        a.mark_completed(Default::default());
        let b = Task::new("b", "B", TaskKind::Analysis).with_weight(3.0);
        let p = Phase::new("p1", "Mixed", "obj").with_tasks(vec![a, b]);
        assert_eq!(p.progress(), 25.0);
    }

    #[test]
    fn finalize_status_all_completed() {
        let mut a = Task::new("a", "A", TaskKind::Analysis);
        a.mark_started();
        a.mark_completed(Default::default());
        let mut p = Phase::new("p1", "P", "obj").with_tasks(vec![a]);
        p.finalize_status();
        assert_eq!(p.status, PhaseStatus::Completed);
    }
}
