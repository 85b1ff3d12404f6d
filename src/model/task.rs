//! The task: the smallest dispatchable unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// What kind of work a task performs. Selects the handler in the task runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaskKind {
    CodeGeneration,
    FileOperation,
    CommandExecution,
    ApiCall,
    Validation,
    Transformation,
    Analysis,
    Research,
    Mcp,
    Custom(String),
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::CodeGeneration => write!(f, "code_generation"),
            TaskKind::FileOperation => write!(f, "file_operation"),
            TaskKind::CommandExecution => write!(f, "command_execution"),
            TaskKind::ApiCall => write!(f, "api_call"),
            TaskKind::Validation => write!(f, "validation"),
            TaskKind::Transformation => write!(f, "transformation"),
            TaskKind::Analysis => write!(f, "analysis"),
            TaskKind::Research => write!(f, "research"),
            TaskKind::Mcp => write!(f, "mcp"),
            TaskKind::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// Lifecycle status of a task's execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
    Blocked,
}

impl TaskStatus {
    /// A status from which no further transition happens without operator
    /// or recovery-manager intervention.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

/// Declaration plus mutable execution record for one unit of work.
///
/// Invariants: a non-terminal `status` implies `completed_at` is `None`;
/// `attempts <= max_retries + 1`; `weight >= 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub dependencies: HashSet<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub priority: i32,
    pub estimated_duration: Option<Duration>,
    pub timeout: Option<Duration>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub critical: bool,

    #[serde(default)]
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub error: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    3
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind,
            parameters: HashMap::new(),
            dependencies: HashSet::new(),
            weight: default_weight(),
            priority: 0,
            estimated_duration: None,
            timeout: None,
            max_retries: default_max_retries(),
            critical: false,
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            attempts: 0,
            outputs: HashMap::new(),
            artifacts: Vec::new(),
            error: None,
        }
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn mark_started(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
        self.attempts += 1;
    }

    pub fn mark_completed(&mut self, outputs: HashMap<String, serde_json::Value>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.outputs = outputs;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Skipped;
        self.completed_at = Some(Utc::now());
        self.error = Some(reason.into());
    }

    /// Allows the recovery manager to re-queue a task for a retry attempt.
    pub fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error = None;
    }
}

/// The outcome of one task-runner invocation, independent of the task's own
/// mutable record (used as the return value threaded through hooks/retries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub outputs: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration: Option<Duration>,
    pub tokens_used: Option<u64>,
}

impl TaskResult {
    pub fn success(task_id: impl Into<String>, outputs: HashMap<String, serde_json::Value>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Completed,
            outputs,
            error: None,
            attempts: 1,
            duration: None,
            tokens_used: None,
        }
    }

    pub fn failure(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Failed,
            outputs: HashMap::new(),
            error: Some(error.into()),
            attempts: 1,
            duration: None,
            tokens_used: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_default_weight_is_one() {
        let t = Task::new("a", "A", TaskKind::Analysis);
        assert_eq!(t.weight, 1.0);
        assert_eq!(t.max_retries, 3);
    }

    #[test]
    fn mark_started_increments_attempts() {
        let mut t = Task::new("a", "A", TaskKind::Analysis);
        t.mark_started();
        assert_eq!(t.attempts, 1);
        assert_eq!(t.status, TaskStatus::InProgress);
        assert!(t.started_at.is_some());
    }

    #[test]
    fn terminal_status_implies_completed_at_when_marked() {
        let mut t = Task::new("a", "A", TaskKind::Analysis);
        t.mark_started();
        t.mark_completed(HashMap::new());
        assert!(t.status.is_terminal());
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn reset_for_retry_clears_terminal_fields() {
        let mut t = Task::new("a", "A", TaskKind::Analysis);
        t.mark_started();
        t.mark_failed("boom");
        t.reset_for_retry();
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.completed_at.is_none());
        assert!(t.error.is_none());
    }

    #[test]
    fn task_kind_display_matches_snake_case() {
        assert_eq!(TaskKind::CodeGeneration.to_string(), "code_generation");
        assert_eq!(TaskKind::Custom("thing".into()).to_string(), "custom:thing");
    }
}
