//! The execution context: the per-run bag threaded through every component.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Resume hints written by the recovery manager and consumed by the
/// orchestrator on the next planning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeHints {
    pub resume_from_phase: Option<String>,
    pub resume_from_task: Option<String>,
    pub skip_tasks: Vec<String>,
    pub retry_tasks: Vec<String>,
}

/// Per-run context shared (by reference) across the state store, cost
/// tracker, progress tracker, task runner, and phase executor.
///
/// Mutated only by the orchestrator; other components receive a read-only
/// view plus narrow, component-owned write paths (research cache, metrics).
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub project_id: String,
    pub project_root: PathBuf,
    pub metadata: HashMap<String, serde_json::Value>,
    pub resume_hints: ResumeHints,
    cancelled: Arc<AtomicBool>,
    research_cache: Arc<std::sync::Mutex<HashMap<String, serde_json::Value>>>,
}

impl ExecutionContext {
    pub fn new(execution_id: impl Into<String>, project_id: impl Into<String>, project_root: PathBuf) -> Self {
        Self {
            execution_id: execution_id.into(),
            project_id: project_id.into(),
            project_root,
            metadata: HashMap::new(),
            resume_hints: ResumeHints::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
            research_cache: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Requests cooperative cancellation. Observable by any clone within
    /// one second per SPEC_FULL §5.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cache_research(&self, key: impl Into<String>, value: serde_json::Value) {
        if let Ok(mut cache) = self.research_cache.lock() {
            cache.insert(key.into(), value);
        }
    }

    pub fn cached_research(&self, key: &str) -> Option<serde_json::Value> {
        self.research_cache.lock().ok().and_then(|c| c.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_observable_from_a_clone() {
        let ctx = ExecutionContext::new("exec-1", "proj-1", PathBuf::from("/tmp"));
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn research_cache_round_trips() {
        let ctx = ExecutionContext::new("exec-1", "proj-1", PathBuf::from("/tmp"));
        ctx.cache_research("security", serde_json::json!({"ok": true}));
        assert_eq!(ctx.cached_research("security"), Some(serde_json::json!({"ok": true})));
        assert_eq!(ctx.cached_research("missing"), None);
    }
}
