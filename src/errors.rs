//! Typed error hierarchy for the build orchestrator.
//!
//! Each core component gets its own closed error enum; `EngineError` is the
//! umbrella type the CLI and orchestrator match on, composed via `#[from]`
//! so `?` flows naturally across component boundaries (SPEC_FULL §7).

use thiserror::Error;

/// Errors from the state store (`src/state_store`).
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("unsupported state-entry version byte {0:#x}")]
    UnsupportedVersion(u8),

    #[error("snapshot {0} not found")]
    SnapshotNotFound(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the cost tracker (`src/cost`).
#[derive(Debug, Error)]
pub enum CostTrackerError {
    #[error("amount must be non-negative, got {0}")]
    NegativeAmount(f64),
}

/// Errors from the progress tracker (`src/progress`).
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("unknown phase id: {0}")]
    UnknownPhase(String),

    #[error("unknown task id: {0}")]
    UnknownTask(String),
}

/// Errors from the task runner (`src/runner`).
#[derive(Debug, Error)]
pub enum TaskRunnerError {
    #[error("task {task_id} timed out after {timeout_secs}s")]
    Timeout { task_id: String, timeout_secs: u64 },

    #[error("task {task_id} was cancelled")]
    Cancelled { task_id: String },

    #[error("task {task_id} hook '{hook}' blocked execution: {reason}")]
    HookBlocked {
        task_id: String,
        hook: String,
        reason: String,
    },

    #[error("task {task_id} failed: {message}")]
    Failed { task_id: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the phase executor (`src/executor`).
#[derive(Debug, Error)]
pub enum PhaseExecutorError {
    #[error("dependency deadlock in phase {phase_id}: unreachable tasks {task_ids:?}")]
    Deadlock {
        phase_id: String,
        task_ids: Vec<String>,
    },

    #[error("cycle detected among tasks in phase {phase_id}: {task_ids:?}")]
    Cycle {
        phase_id: String,
        task_ids: Vec<String>,
    },

    #[error("unknown dependency '{dependency}' referenced by task '{task}'")]
    UnknownDependency { task: String, dependency: String },

    #[error(transparent)]
    TaskRunner(#[from] TaskRunnerError),
}

/// Errors from the recovery manager (`src/recovery`).
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("maximum recovery attempts ({max}) exceeded for this failure")]
    AttemptsExceeded { max: u32 },

    #[error("failure rate threshold exceeded: {count} failures in the last hour")]
    RateExceeded { count: u32 },

    #[error("failure is not recoverable: {0}")]
    NotRecoverable(String),

    #[error(transparent)]
    StateStore(#[from] StateStoreError),
}

/// Errors from the validator (`src/validator`).
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("unsupported check: {0}")]
    UnsupportedCheck(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error enum the orchestrator and CLI match on.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("planning error: {0}")]
    Planning(String),

    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    #[error(transparent)]
    CostTracker(#[from] CostTrackerError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    TaskRunner(#[from] TaskRunnerError),

    #[error(transparent)]
    PhaseExecutor(#[from] PhaseExecutorError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error("execution aborted by user")]
    Aborted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

