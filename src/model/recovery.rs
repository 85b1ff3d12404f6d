//! Failure classification and recovery-plan types.
//!
//! Grounded near-verbatim on
//! `examples/original_source/claude-code-builder/claude_code_builder/execution/recovery.py`
//! (`FailureType`, `FailureContext`, `RecoveryStrategy`, `RecoveryPlan`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TaskFailure,
    PhaseFailure,
    DependencyFailure,
    ResourceFailure,
    Timeout,
    SystemError,
    UserAbort,
}

/// Classifies a failure from its error type name and message, following the
/// donor's `_determine_failure_type`: substring checks on the lowercased
/// message take priority over the error type name.
pub fn classify_failure(error_type_name: &str, message: &str) -> FailureKind {
    let lowered = message.to_lowercase();
    if lowered.contains("timeout") {
        FailureKind::Timeout
    } else if lowered.contains("dependency") {
        FailureKind::DependencyFailure
    } else if lowered.contains("resource") || lowered.contains("memory") {
        FailureKind::ResourceFailure
    } else if lowered.contains("abort") || lowered.contains("cancel") {
        FailureKind::UserAbort
    } else if matches!(error_type_name, "SystemError" | "OSError" | "IOError") {
        FailureKind::SystemError
    } else {
        FailureKind::TaskFailure
    }
}

/// Error-type names that are never recoverable regardless of failure kind,
/// following the donor's `_is_recoverable` non_recoverable_errors list.
const NON_RECOVERABLE_ERROR_TYPES: &[&str] = &["PermissionError", "AuthenticationError", "InvalidProjectSpecError"];

/// Whether a failure of this kind/error-type combination can ever be
/// recovered from, independent of attempt/rate-limit bookkeeping.
pub fn is_recoverable(kind: FailureKind, error_type_name: &str) -> bool {
    if matches!(kind, FailureKind::UserAbort | FailureKind::DependencyFailure) {
        return false;
    }
    !NON_RECOVERABLE_ERROR_TYPES.contains(&error_type_name)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    pub failure_type: FailureKind,
    pub timestamp: DateTime<Utc>,
    pub phase_id: Option<String>,
    pub task_id: Option<String>,
    pub error_message: String,
    #[serde(default)]
    pub error_details: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub recovery_attempts: u32,
    pub recoverable: bool,
}

impl FailureContext {
    pub fn new(failure_type: FailureKind, error_message: impl Into<String>) -> Self {
        Self {
            failure_type,
            timestamp: Utc::now(),
            phase_id: None,
            task_id: None,
            error_message: error_message.into(),
            error_details: HashMap::new(),
            recovery_attempts: 0,
            recoverable: true,
        }
    }

    /// A (phase, task, kind) key used by the adaptive strategy to detect
    /// recurring failures, following `_find_similar_failures`.
    pub fn similarity_key(&self) -> (Option<String>, Option<String>, FailureKind) {
        (self.phase_id.clone(), self.task_id.clone(), self.failure_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    RetryFailed,
    SkipFailed,
    RestartPhase,
    RestartAll,
    Manual,
    Adaptive,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub strategy: Option<RecoveryStrategy>,
    pub checkpoint_id: Option<String>,
    pub resume_from_phase: Option<String>,
    pub resume_from_task: Option<String>,
    #[serde(default)]
    pub skip_tasks: Vec<String>,
    #[serde(default)]
    pub retry_tasks: Vec<String>,
    #[serde(default)]
    pub modifications: HashMap<String, serde_json::Value>,
    pub estimated_time_seconds: Option<u64>,
}

impl RecoveryPlan {
    pub fn new(strategy: RecoveryStrategy) -> Self {
        Self {
            strategy: Some(strategy),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_timeout_takes_priority() {
        assert_eq!(
            classify_failure("RuntimeError", "Operation timeout after 30s"),
            FailureKind::Timeout
        );
    }

    #[test]
    fn classify_falls_back_to_task_failure() {
        assert_eq!(classify_failure("ValueError", "bad input"), FailureKind::TaskFailure);
    }

    #[test]
    fn classify_system_error_by_type_name() {
        assert_eq!(classify_failure("OSError", "disk full"), FailureKind::SystemError);
    }

    #[test]
    fn user_abort_is_never_recoverable() {
        assert!(!is_recoverable(FailureKind::UserAbort, "RuntimeError"));
    }

    #[test]
    fn dependency_failure_is_never_recoverable() {
        assert!(!is_recoverable(FailureKind::DependencyFailure, "RuntimeError"));
    }

    #[test]
    fn permission_error_is_never_recoverable_regardless_of_kind() {
        assert!(!is_recoverable(FailureKind::TaskFailure, "PermissionError"));
    }

    #[test]
    fn ordinary_task_failure_is_recoverable() {
        assert!(is_recoverable(FailureKind::TaskFailure, "RuntimeError"));
    }
}
