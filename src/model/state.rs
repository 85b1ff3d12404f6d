//! State-store record types: entries, snapshots, checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateEntryKind {
    Execution,
    Phase,
    Task,
    Artifact,
    Metric,
    Config,
    Checkpoint,
}

impl std::fmt::Display for StateEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StateEntryKind::Execution => "execution",
            StateEntryKind::Phase => "phase",
            StateEntryKind::Task => "task",
            StateEntryKind::Artifact => "artifact",
            StateEntryKind::Metric => "metric",
            StateEntryKind::Config => "config",
            StateEntryKind::Checkpoint => "checkpoint",
        };
        write!(f, "{s}")
    }
}

/// One (execution, type, key) -> value record. Uniqueness on
/// (execution_id, type, key): a later `save` of the same triple replaces
/// the value in place (SPEC_FULL §4.1, §8 idempotence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    pub execution_id: String,
    pub entry_type: StateEntryKind,
    pub key: String,
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StateEntry {
    pub fn new(
        execution_id: impl Into<String>,
        entry_type: StateEntryKind,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            entry_type,
            key: key.into(),
            value,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// A point-in-time capture of every state entry for one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<StateEntry>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A snapshot plus a compacted project-state summary and free-form tags.
/// The `phase_<id>` tag convention (marking the snapshot taken immediately
/// before a phase begins) is fixed by the recovery manager's checkpoint
/// lookups — see `examples/original_source/.../execution/recovery.py`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub snapshot: Snapshot,
    pub project_state: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    pub size_bytes: u64,
}

impl Checkpoint {
    pub fn phase_tag(phase_id: &str) -> String {
        format!("phase_{phase_id}")
    }
}
