//! Checkpoint manager (C2): a thin, tag-aware layer over the state store.

use super::store::StateStore;
use crate::errors::StateStoreError;
use crate::model::state::{Checkpoint, Snapshot};
use std::collections::HashMap;
use std::sync::Arc;

pub struct CheckpointManager {
    store: Arc<StateStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Creates a checkpoint tagged for the given phase boundary, following
    /// the `phase_<id>` convention fixed by the recovery manager's lookups.
    pub async fn checkpoint_phase_boundary(
        &self,
        execution: &str,
        phase_id: &str,
        project_state: serde_json::Value,
    ) -> Result<String, StateStoreError> {
        self.create_checkpoint(execution, project_state, vec![Checkpoint::phase_tag(phase_id)])
            .await
    }

    pub async fn create_checkpoint(
        &self,
        execution: &str,
        project_state: serde_json::Value,
        tags: Vec<String>,
    ) -> Result<String, StateStoreError> {
        let mut metadata = HashMap::new();
        metadata.insert("tags".to_string(), serde_json::json!(tags));
        metadata.insert("project_state".to_string(), project_state);
        self.store.create_snapshot(execution, Some(metadata)).await
    }

    pub async fn restore_checkpoint(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, StateStoreError> {
        let Some(snapshot) = self.store.restore_snapshot(checkpoint_id).await? else {
            return Ok(None);
        };
        Ok(Some(Self::as_checkpoint(snapshot)))
    }

    /// Lists checkpoints for a project, optionally filtered to those
    /// carrying all of `tags`. Results are newest-first, matching
    /// `list_snapshots`'s ordering.
    pub async fn list_checkpoints(
        &self,
        execution: Option<&str>,
        tags: Option<&[String]>,
    ) -> Result<Vec<Checkpoint>, StateStoreError> {
        let snapshots = self.store.list_snapshots(execution).await?;
        let checkpoints: Vec<Checkpoint> = snapshots
            .into_iter()
            .map(Self::as_checkpoint)
            .filter(|cp| match tags {
                Some(wanted) => wanted.iter().all(|t| cp.tags.contains(t)),
                None => true,
            })
            .collect();
        Ok(checkpoints)
    }

    fn as_checkpoint(snapshot: Snapshot) -> Checkpoint {
        let tags = snapshot
            .metadata
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let project_state = snapshot
            .metadata
            .get("project_state")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let size_bytes = serde_json::to_vec(&snapshot).map(|v| v.len() as u64).unwrap_or(0);
        Checkpoint {
            snapshot,
            project_state,
            tags,
            size_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_store::store::StateStoreConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn phase_boundary_checkpoints_carry_the_fixed_tag() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("s.db"), StateStoreConfig::default())
            .await
            .unwrap();
        let mgr = CheckpointManager::new(store);
        mgr.checkpoint_phase_boundary("exec-1", "02", serde_json::json!({"status": "running"}))
            .await
            .unwrap();

        let found = mgr
            .list_checkpoints(Some("exec-1"), Some(&["phase_02".to_string()]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].tags.contains(&"phase_02".to_string()));
    }
}
