//! The state store itself: a durable, versioned key-value store with
//! snapshot semantics, backed by `libsql`.

use super::cache::LruCache;
use crate::errors::StateStoreError;
use crate::model::state::{Snapshot, StateEntry, StateEntryKind};
use chrono::Utc;
use libsql::{Builder, Connection, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

const CURRENT_VERSION: u8 = 1;

fn encode_value(value: &serde_json::Value) -> Result<Vec<u8>, StateStoreError> {
    let mut bytes = vec![CURRENT_VERSION];
    bytes.extend_from_slice(serde_json::to_vec(value)?.as_slice());
    Ok(bytes)
}

fn decode_value(bytes: &[u8]) -> Result<serde_json::Value, StateStoreError> {
    let (version, rest) = bytes
        .split_first()
        .ok_or_else(|| StateStoreError::Database("empty value".into()))?;
    if *version != CURRENT_VERSION {
        return Err(StateStoreError::UnsupportedVersion(*version));
    }
    Ok(serde_json::from_slice(rest)?)
}

/// Configuration for auto-snapshotting and pruning (SPEC_FULL §6).
#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    pub cache_capacity: usize,
    pub max_snapshots: usize,
    pub auto_snapshot: bool,
    pub snapshot_min_interval_seconds: i64,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            max_snapshots: 100,
            auto_snapshot: true,
            snapshot_min_interval_seconds: 300,
        }
    }
}

pub struct StateStore {
    conn: Mutex<Connection>,
    cache: Mutex<LruCache<String, serde_json::Value>>,
    config: StateStoreConfig,
    last_snapshot_at: Mutex<Option<chrono::DateTime<Utc>>>,
}

impl StateStore {
    pub async fn open(path: &Path, config: StateStoreConfig) -> Result<Arc<Self>, StateStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StateStoreError::Database(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| StateStoreError::Database(e.to_string()))?;
        Self::migrate(&conn).await?;
        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(LruCache::new(config.cache_capacity)),
            config,
            last_snapshot_at: Mutex::new(None),
        }))
    }

    async fn migrate(conn: &Connection) -> Result<(), StateStoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS state_entries (
                execution_id TEXT NOT NULL,
                entry_type TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                timestamp TEXT NOT NULL,
                metadata TEXT NOT NULL,
                PRIMARY KEY (execution_id, entry_type, key)
            )",
            (),
        )
        .await
        .map_err(|e| StateStoreError::Database(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_state_entries_exec ON state_entries(execution_id)",
            (),
        )
        .await
        .map_err(|e| StateStoreError::Database(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS state_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                execution_id TEXT NOT NULL,
                entry_type TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                timestamp TEXT NOT NULL,
                metadata TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| StateStoreError::Database(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                data BLOB NOT NULL,
                metadata TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| StateStoreError::Database(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_exec ON snapshots(execution_id)",
            (),
        )
        .await
        .map_err(|e| StateStoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn cache_key(execution: &str, entry_type: StateEntryKind, key: &str) -> String {
        format!("{execution}:{entry_type}:{key}")
    }

    #[instrument(skip(self, value, metadata), fields(execution, ?entry_type, key))]
    pub async fn save(
        &self,
        execution: &str,
        entry_type: StateEntryKind,
        key: &str,
        value: serde_json::Value,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<(), StateStoreError> {
        let metadata = metadata.unwrap_or_default();
        let encoded = encode_value(&value)?;
        let metadata_json = serde_json::to_string(&metadata)?;
        let timestamp = Utc::now().to_rfc3339();
        let type_str = entry_type.to_string();

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO state_history (execution_id, entry_type, key, value, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![execution, type_str.clone(), key, encoded.clone(), timestamp.clone(), metadata_json.clone()],
        )
        .await
        .map_err(|e| StateStoreError::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO state_entries (execution_id, entry_type, key, value, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(execution_id, entry_type, key)
             DO UPDATE SET value = excluded.value, timestamp = excluded.timestamp, metadata = excluded.metadata",
            params![execution, type_str, key, encoded, timestamp, metadata_json],
        )
        .await
        .map_err(|e| StateStoreError::Database(e.to_string()))?;
        drop(conn);

        let mut cache = self.cache.lock().await;
        cache.put(Self::cache_key(execution, entry_type, key), value);
        debug!("state entry saved");
        Ok(())
    }

    pub async fn load(
        &self,
        execution: &str,
        entry_type: StateEntryKind,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StateStoreError> {
        let cache_key = Self::cache_key(execution, entry_type, key);
        if let Some(v) = self.cache.lock().await.get(&cache_key) {
            return Ok(Some(v));
        }

        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT value FROM state_entries WHERE execution_id = ?1 AND entry_type = ?2 AND key = ?3",
                params![execution, entry_type.to_string(), key],
            )
            .await
            .map_err(|e| StateStoreError::Database(e.to_string()))?;
        let row = rows.next().await.map_err(|e| StateStoreError::Database(e.to_string()))?;
        match row {
            Some(row) => {
                let bytes: Vec<u8> = row.get(0).map_err(|e| StateStoreError::Database(e.to_string()))?;
                let value = decode_value(&bytes)?;
                drop(conn);
                self.cache.lock().await.put(cache_key, value.clone());
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn load_all(
        &self,
        execution: &str,
        entry_type: StateEntryKind,
    ) -> Result<HashMap<String, serde_json::Value>, StateStoreError> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT key, value FROM state_entries WHERE execution_id = ?1 AND entry_type = ?2",
                params![execution, entry_type.to_string()],
            )
            .await
            .map_err(|e| StateStoreError::Database(e.to_string()))?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next().await.map_err(|e| StateStoreError::Database(e.to_string()))? {
            let key: String = row.get(0).map_err(|e| StateStoreError::Database(e.to_string()))?;
            let bytes: Vec<u8> = row.get(1).map_err(|e| StateStoreError::Database(e.to_string()))?;
            out.insert(key, decode_value(&bytes)?);
        }
        Ok(out)
    }

    /// Saves a structured execution-level state blob, expanding nested
    /// `phases`/`tasks`/`artifacts` maps (if present) into their own typed
    /// entries so they are individually addressable via `load`/`load_all`.
    pub async fn save_execution_state(
        &self,
        execution: &str,
        structured: serde_json::Value,
    ) -> Result<(), StateStoreError> {
        if let serde_json::Value::Object(ref map) = structured {
            for (kind_name, kind) in [("phases", StateEntryKind::Phase), ("tasks", StateEntryKind::Task), ("artifacts", StateEntryKind::Artifact)] {
                if let Some(serde_json::Value::Object(nested)) = map.get(kind_name) {
                    for (k, v) in nested {
                        self.save(execution, kind, k, v.clone(), None).await?;
                    }
                }
            }
        }
        self.save(execution, StateEntryKind::Execution, "main", structured, None).await?;
        if self.config.auto_snapshot {
            self.maybe_auto_snapshot(execution).await?;
        }
        Ok(())
    }

    pub async fn load_execution_state(&self, execution: &str) -> Result<Option<serde_json::Value>, StateStoreError> {
        self.load(execution, StateEntryKind::Execution, "main").await
    }

    async fn maybe_auto_snapshot(&self, execution: &str) -> Result<(), StateStoreError> {
        let mut last = self.last_snapshot_at.lock().await;
        let due = match *last {
            None => true,
            Some(t) => (Utc::now() - t).num_seconds() >= self.config.snapshot_min_interval_seconds,
        };
        if due {
            drop(last);
            self.create_snapshot(execution, None).await?;
            *self.last_snapshot_at.lock().await = Some(Utc::now());
        }
        Ok(())
    }

    #[instrument(skip(self, metadata), fields(execution))]
    pub async fn create_snapshot(
        &self,
        execution: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<String, StateStoreError> {
        let entries = self.all_entries(execution).await?;
        let snapshot_id = uuid::Uuid::new_v4().to_string();
        let snapshot = Snapshot {
            id: snapshot_id.clone(),
            execution_id: execution.to_string(),
            timestamp: Utc::now(),
            entries,
            metadata: metadata.unwrap_or_default(),
        };
        let data = encode_value(&serde_json::to_value(&snapshot)?)?;
        let metadata_json = serde_json::to_string(&snapshot.metadata)?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO snapshots (id, execution_id, timestamp, data, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![snapshot_id.clone(), execution, snapshot.timestamp.to_rfc3339(), data, metadata_json],
        )
        .await
        .map_err(|e| StateStoreError::Database(e.to_string()))?;
        drop(conn);

        self.prune_snapshots(execution).await?;
        debug!(snapshot_id, "created snapshot");
        Ok(snapshot_id)
    }

    async fn all_entries(&self, execution: &str) -> Result<Vec<StateEntry>, StateStoreError> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT entry_type, key, value, timestamp, metadata FROM state_entries WHERE execution_id = ?1",
                params![execution],
            )
            .await
            .map_err(|e| StateStoreError::Database(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| StateStoreError::Database(e.to_string()))? {
            let entry_type_str: String = row.get(0).map_err(|e| StateStoreError::Database(e.to_string()))?;
            let key: String = row.get(1).map_err(|e| StateStoreError::Database(e.to_string()))?;
            let bytes: Vec<u8> = row.get(2).map_err(|e| StateStoreError::Database(e.to_string()))?;
            let timestamp_str: String = row.get(3).map_err(|e| StateStoreError::Database(e.to_string()))?;
            let metadata_str: String = row.get(4).map_err(|e| StateStoreError::Database(e.to_string()))?;
            out.push(StateEntry {
                execution_id: execution.to_string(),
                entry_type: parse_entry_kind(&entry_type_str),
                key,
                value: decode_value(&bytes)?,
                timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp_str)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
            });
        }
        Ok(out)
    }

    async fn prune_snapshots(&self, execution: &str) -> Result<(), StateStoreError> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id FROM snapshots WHERE execution_id = ?1 ORDER BY timestamp DESC",
                params![execution],
            )
            .await
            .map_err(|e| StateStoreError::Database(e.to_string()))?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| StateStoreError::Database(e.to_string()))? {
            ids.push(row.get::<String>(0).map_err(|e| StateStoreError::Database(e.to_string()))?);
        }
        if ids.len() > self.config.max_snapshots {
            for stale in &ids[self.config.max_snapshots..] {
                conn.execute("DELETE FROM snapshots WHERE id = ?1", params![stale.clone()])
                    .await
                    .map_err(|e| StateStoreError::Database(e.to_string()))?;
            }
            warn!(pruned = ids.len() - self.config.max_snapshots, "pruned old snapshots");
        }
        Ok(())
    }

    /// Restores every entry in the snapshot by upserting it back into
    /// `state_entries`. Idempotent: restoring the same checkpoint twice
    /// yields identical state (SPEC_FULL §8).
    #[instrument(skip(self), fields(snapshot_id))]
    pub async fn restore_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, StateStoreError> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query("SELECT data FROM snapshots WHERE id = ?1", params![snapshot_id])
            .await
            .map_err(|e| StateStoreError::Database(e.to_string()))?;
        let row = rows.next().await.map_err(|e| StateStoreError::Database(e.to_string()))?;
        let bytes: Vec<u8> = match row {
            Some(r) => r.get(0).map_err(|e| StateStoreError::Database(e.to_string()))?,
            None => return Ok(None),
        };
        drop(conn);
        let snapshot: Snapshot = serde_json::from_value(decode_value(&bytes)?)?;
        for entry in &snapshot.entries {
            self.save(
                &entry.execution_id,
                entry.entry_type,
                &entry.key,
                entry.value.clone(),
                Some(entry.metadata.clone()),
            )
            .await?;
        }
        Ok(Some(snapshot))
    }

    pub async fn list_snapshots(&self, execution: Option<&str>) -> Result<Vec<Snapshot>, StateStoreError> {
        let conn = self.conn.lock().await;
        let mut rows = match execution {
            Some(exec) => conn
                .query(
                    "SELECT data FROM snapshots WHERE execution_id = ?1 ORDER BY timestamp DESC",
                    params![exec],
                )
                .await
                .map_err(|e| StateStoreError::Database(e.to_string()))?,
            None => conn
                .query("SELECT data FROM snapshots ORDER BY timestamp DESC", ())
                .await
                .map_err(|e| StateStoreError::Database(e.to_string()))?,
        };
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| StateStoreError::Database(e.to_string()))? {
            let bytes: Vec<u8> = row.get(0).map_err(|e| StateStoreError::Database(e.to_string()))?;
            out.push(serde_json::from_value(decode_value(&bytes)?)?);
        }
        Ok(out)
    }

    pub async fn history(
        &self,
        execution: &str,
        entry_type: Option<StateEntryKind>,
        key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StateEntry>, StateStoreError> {
        let conn = self.conn.lock().await;
        let mut rows = match (entry_type, key) {
            (Some(t), Some(k)) => conn
                .query(
                    "SELECT entry_type, key, value, timestamp, metadata FROM state_history
                     WHERE execution_id = ?1 AND entry_type = ?2 AND key = ?3 ORDER BY id DESC LIMIT ?4",
                    params![execution, t.to_string(), k, limit as i64],
                )
                .await
                .map_err(|e| StateStoreError::Database(e.to_string()))?,
            (Some(t), None) => conn
                .query(
                    "SELECT entry_type, key, value, timestamp, metadata FROM state_history
                     WHERE execution_id = ?1 AND entry_type = ?2 ORDER BY id DESC LIMIT ?3",
                    params![execution, t.to_string(), limit as i64],
                )
                .await
                .map_err(|e| StateStoreError::Database(e.to_string()))?,
            _ => conn
                .query(
                    "SELECT entry_type, key, value, timestamp, metadata FROM state_history
                     WHERE execution_id = ?1 ORDER BY id DESC LIMIT ?2",
                    params![execution, limit as i64],
                )
                .await
                .map_err(|e| StateStoreError::Database(e.to_string()))?,
        };
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| StateStoreError::Database(e.to_string()))? {
            let entry_type_str: String = row.get(0).map_err(|e| StateStoreError::Database(e.to_string()))?;
            let key: String = row.get(1).map_err(|e| StateStoreError::Database(e.to_string()))?;
            let bytes: Vec<u8> = row.get(2).map_err(|e| StateStoreError::Database(e.to_string()))?;
            let timestamp_str: String = row.get(3).map_err(|e| StateStoreError::Database(e.to_string()))?;
            let metadata_str: String = row.get(4).map_err(|e| StateStoreError::Database(e.to_string()))?;
            out.push(StateEntry {
                execution_id: execution.to_string(),
                entry_type: parse_entry_kind(&entry_type_str),
                key,
                value: decode_value(&bytes)?,
                timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp_str)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
            });
        }
        Ok(out)
    }

    pub async fn cleanup(&self, execution: &str, keep_snapshots: bool) -> Result<(), StateStoreError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM state_entries WHERE execution_id = ?1", params![execution])
            .await
            .map_err(|e| StateStoreError::Database(e.to_string()))?;
        conn.execute("DELETE FROM state_history WHERE execution_id = ?1", params![execution])
            .await
            .map_err(|e| StateStoreError::Database(e.to_string()))?;
        if !keep_snapshots {
            conn.execute("DELETE FROM snapshots WHERE execution_id = ?1", params![execution])
                .await
                .map_err(|e| StateStoreError::Database(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn export(&self, execution: &str, path: &Path) -> Result<(), StateStoreError> {
        let entries = self.all_entries(execution).await?;
        let mut state_map = serde_json::Map::new();
        for entry in entries {
            state_map.insert(format!("{}:{}", entry.entry_type, entry.key), entry.value);
        }
        let doc = serde_json::json!({
            "execution_id": execution,
            "exported_at": Utc::now().to_rfc3339(),
            "state": state_map,
        });
        tokio::fs::write(path, serde_json::to_vec_pretty(&doc)?).await?;
        Ok(())
    }

    pub async fn import(&self, path: &Path) -> Result<String, StateStoreError> {
        let bytes = tokio::fs::read(path).await?;
        let doc: serde_json::Value = serde_json::from_slice(&bytes)?;
        let execution_id = doc
            .get("execution_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StateStoreError::Database("missing execution_id in import file".into()))?
            .to_string();
        if let Some(serde_json::Value::Object(state)) = doc.get("state") {
            for (composite_key, value) in state {
                let (kind_str, key) = composite_key.split_once(':').unwrap_or(("execution", composite_key));
                self.save(&execution_id, parse_entry_kind(kind_str), key, value.clone(), None).await?;
            }
        }
        Ok(execution_id)
    }
}

fn parse_entry_kind(s: &str) -> StateEntryKind {
    match s {
        "phase" => StateEntryKind::Phase,
        "task" => StateEntryKind::Task,
        "artifact" => StateEntryKind::Artifact,
        "metric" => StateEntryKind::Metric,
        "config" => StateEntryKind::Config,
        "checkpoint" => StateEntryKind::Checkpoint,
        _ => StateEntryKind::Execution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_store() -> (tempfile::TempDir, Arc<StateStore>) {
        let dir = tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("state.db"), StateStoreConfig::default())
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn save_then_load_round_trips_immediately() {
        let (_dir, store) = open_store().await;
        store
            .save("exec-1", StateEntryKind::Task, "t1", serde_json::json!({"ok": true}), None)
            .await
            .unwrap();
        let loaded = store.load("exec-1", StateEntryKind::Task, "t1").await.unwrap();
        assert_eq!(loaded, Some(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn resaving_same_key_is_a_noop_for_load_all() {
        let (_dir, store) = open_store().await;
        store
            .save("exec-1", StateEntryKind::Task, "t1", serde_json::json!(1), None)
            .await
            .unwrap();
        store
            .save("exec-1", StateEntryKind::Task, "t1", serde_json::json!(1), None)
            .await
            .unwrap();
        let all = store.load_all("exec-1", StateEntryKind::Task).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_restore_round_trips_every_entry() {
        let (_dir, store) = open_store().await;
        store
            .save("exec-1", StateEntryKind::Task, "t1", serde_json::json!("a"), None)
            .await
            .unwrap();
        store
            .save("exec-1", StateEntryKind::Phase, "p1", serde_json::json!("b"), None)
            .await
            .unwrap();
        let snap_id = store.create_snapshot("exec-1", None).await.unwrap();

        store
            .save("exec-1", StateEntryKind::Task, "t1", serde_json::json!("mutated"), None)
            .await
            .unwrap();

        store.restore_snapshot(&snap_id).await.unwrap();
        let restored = store.load("exec-1", StateEntryKind::Task, "t1").await.unwrap();
        assert_eq!(restored, Some(serde_json::json!("a")));
    }

    #[tokio::test]
    async fn restoring_same_checkpoint_twice_is_idempotent() {
        let (_dir, store) = open_store().await;
        store
            .save("exec-1", StateEntryKind::Task, "t1", serde_json::json!(42), None)
            .await
            .unwrap();
        let snap_id = store.create_snapshot("exec-1", None).await.unwrap();
        store.restore_snapshot(&snap_id).await.unwrap();
        let first = store.load("exec-1", StateEntryKind::Task, "t1").await.unwrap();
        store.restore_snapshot(&snap_id).await.unwrap();
        let second = store.load("exec-1", StateEntryKind::Task, "t1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn export_import_round_trips() {
        let (dir, store) = open_store().await;
        store
            .save("exec-1", StateEntryKind::Task, "t1", serde_json::json!("value"), None)
            .await
            .unwrap();
        let export_path = dir.path().join("export.json");
        store.export("exec-1", &export_path).await.unwrap();

        let (_dir2, store2) = open_store().await;
        let execution_id = store2.import(&export_path).await.unwrap();
        assert_eq!(execution_id, "exec-1");
        let loaded = store2.load("exec-1", StateEntryKind::Task, "t1").await.unwrap();
        assert_eq!(loaded, Some(serde_json::json!("value")));
    }

    #[tokio::test]
    async fn unknown_version_byte_is_rejected() {
        let err = decode_value(&[0xFF, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, StateStoreError::UnsupportedVersion(0xFF)));
    }
}
