//! The Orchestrator (C9): the top-level control loop.
//!
//! ## Persistence Ownership
//!
//! Multiple subsystems persist state, but each owns a distinct concern:
//!
//! | Layer                 | What it persists                                    |
//! |------------------------|-----------------------------------------------------|
//! | `state_store`          | Execution/phase/task/artifact entries, snapshots     |
//! | `cost`                 | Cost entries and budget alert history                |
//! | `progress`             | Phase/task progress and throughput history           |
//!
//! The State Store (C1) via the Checkpoint Manager (C2) is the canonical
//! source of truth for recovery: `build`/`resume` read the latest checkpoint
//! at startup and continue from there. Cost and Progress are append-only
//! observation layers; they do not drive control flow.

pub mod engine;

pub use engine::{BuildResult, ExecutionState, Orchestrator};
