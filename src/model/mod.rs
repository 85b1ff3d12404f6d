//! Core data model shared by the state store, cost tracker, progress tracker,
//! task runner, phase executor, recovery manager, and orchestrator.
//!
//! Nothing in this module performs I/O; it is pure types plus the invariants
//! documented on each one.

pub mod context;
pub mod cost;
pub mod phase;
pub mod project;
pub mod recovery;
pub mod state;
pub mod task;

pub use context::ExecutionContext;
pub use cost::{CostBreakdown, CostCategory, CostEntry};
pub use phase::{Phase, PhaseStatus};
pub use project::ProjectSpec;
pub use recovery::{FailureContext, FailureKind, RecoveryPlan, RecoveryStrategy};
pub use state::{Checkpoint, Snapshot, StateEntry, StateEntryKind};
pub use task::{Task, TaskKind, TaskResult, TaskStatus};
