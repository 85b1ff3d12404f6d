//! Recovery Manager (C7): stateful wrapper around the pure failure
//! classification in `crate::model::recovery`, following the donor's
//! `execution/recovery.py` `RecoveryManager` (`failure_history`,
//! `recovery_history`, strategy-handler dispatch table).

use crate::errors::RecoveryError;
use crate::model::recovery::{
    is_recoverable, FailureContext, FailureKind, RecoveryPlan, RecoveryStrategy,
};
use crate::model::{Checkpoint, ProjectSpec};
use crate::state_store::CheckpointManager;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub max_recovery_attempts: u32,
    /// Max failures tolerated within the last hour before recovery refuses.
    pub failure_threshold: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_recovery_attempts: 3,
            failure_threshold: 5,
        }
    }
}

pub struct RecoveryManager {
    config: RecoveryConfig,
    checkpoints: Arc<CheckpointManager>,
    failure_history: Mutex<Vec<FailureContext>>,
    recovery_history: Mutex<Vec<(FailureContext, RecoveryPlan)>>,
}

impl RecoveryManager {
    pub fn new(config: RecoveryConfig, checkpoints: Arc<CheckpointManager>) -> Self {
        info!("recovery manager initialized");
        Self {
            config,
            checkpoints,
            failure_history: Mutex::new(Vec::new()),
            recovery_history: Mutex::new(Vec::new()),
        }
    }

    /// Classifies `error` and records it in the failure history.
    #[instrument(skip(self, error_type_name, message))]
    pub async fn analyze_failure(
        &self,
        error_type_name: &str,
        message: &str,
        phase_id: Option<String>,
        task_id: Option<String>,
    ) -> FailureContext {
        let failure_type = crate::model::recovery::classify_failure(error_type_name, message);
        let mut context = FailureContext::new(failure_type, message);
        context.phase_id = phase_id;
        context.task_id = task_id;
        context.error_details.insert("error_type".to_string(), serde_json::json!(error_type_name));
        context.recoverable = is_recoverable(failure_type, error_type_name);

        self.failure_history.lock().await.push(context.clone());
        info!(failure_type = ?failure_type, recoverable = context.recoverable, "analyzed failure");
        context
    }

    /// Whether `failure` can still be recovered from, given attempt count
    /// and the rolling hourly failure-rate threshold.
    pub async fn can_recover(&self, failure: &FailureContext) -> bool {
        if !failure.recoverable {
            return false;
        }
        let history = self.failure_history.lock().await;
        let recent = history
            .iter()
            .filter(|f| (Utc::now() - f.timestamp).num_seconds() < 3600)
            .count();
        if recent as u32 >= self.config.failure_threshold {
            warn!(recent, "failure threshold exceeded in the last hour");
            return false;
        }
        if failure.recovery_attempts >= self.config.max_recovery_attempts {
            return false;
        }
        true
    }

    /// Builds a recovery plan for `failure`, selecting a strategy if the
    /// caller does not pin one.
    #[instrument(skip(self, project))]
    pub async fn create_recovery_plan(
        &self,
        failure: &FailureContext,
        project: &ProjectSpec,
        checkpoint: Option<&Checkpoint>,
        strategy: Option<RecoveryStrategy>,
    ) -> Result<RecoveryPlan, RecoveryError> {
        if failure.recovery_attempts >= self.config.max_recovery_attempts {
            return Err(RecoveryError::AttemptsExceeded { max: self.config.max_recovery_attempts });
        }
        let strategy = strategy.unwrap_or_else(|| Self::select_strategy(failure, checkpoint));
        info!(?strategy, "creating recovery plan");

        let plan = match strategy {
            RecoveryStrategy::RetryFailed => self.plan_retry_failed(failure, checkpoint),
            RecoveryStrategy::SkipFailed => self.plan_skip_failed(failure, project, checkpoint),
            RecoveryStrategy::RestartPhase => self.plan_restart_phase(failure, project).await?,
            RecoveryStrategy::RestartAll => Self::plan_restart_all(project),
            RecoveryStrategy::Manual => Self::plan_manual(),
            RecoveryStrategy::Adaptive => self.plan_adaptive(failure, checkpoint).await,
        };

        self.recovery_history.lock().await.push((failure.clone(), plan.clone()));
        Ok(plan)
    }

    fn select_strategy(failure: &FailureContext, checkpoint: Option<&Checkpoint>) -> RecoveryStrategy {
        if checkpoint.is_none() {
            return if failure.failure_type == FailureKind::TaskFailure {
                RecoveryStrategy::RetryFailed
            } else {
                RecoveryStrategy::RestartAll
            };
        }
        RecoveryStrategy::Adaptive
    }

    fn plan_retry_failed(&self, failure: &FailureContext, checkpoint: Option<&Checkpoint>) -> RecoveryPlan {
        let mut plan = RecoveryPlan::new(RecoveryStrategy::RetryFailed);
        plan.checkpoint_id = checkpoint.map(|c| c.snapshot.id.clone());
        if let Some(task_id) = &failure.task_id {
            plan.retry_tasks = vec![task_id.clone()];
            plan.resume_from_task = Some(task_id.clone());
        } else if let Some(phase_id) = &failure.phase_id {
            plan.resume_from_phase = Some(phase_id.clone());
        }
        plan.estimated_time_seconds = Some(300);
        plan
    }

    fn plan_skip_failed(&self, failure: &FailureContext, project: &ProjectSpec, checkpoint: Option<&Checkpoint>) -> RecoveryPlan {
        let mut plan = RecoveryPlan::new(RecoveryStrategy::SkipFailed);
        plan.checkpoint_id = checkpoint.map(|c| c.snapshot.id.clone());
        if let Some(task_id) = &failure.task_id {
            plan.skip_tasks = vec![task_id.clone()];
            plan.resume_from_task = Self::find_next_task(project, failure.phase_id.as_deref(), task_id);
        }
        plan
    }

    async fn plan_restart_phase(&self, failure: &FailureContext, project: &ProjectSpec) -> Result<RecoveryPlan, RecoveryError> {
        let mut plan = RecoveryPlan::new(RecoveryStrategy::RestartPhase);
        if let Some(phase_id) = &failure.phase_id {
            let tag = Checkpoint::phase_tag(phase_id);
            let checkpoints = self
                .checkpoints
                .list_checkpoints(Some(&project.config.id), Some(std::slice::from_ref(&tag)))
                .await?;
            if let Some(first) = checkpoints.first() {
                plan.checkpoint_id = Some(first.snapshot.id.clone());
            }
            plan.resume_from_phase = Some(phase_id.clone());
        }
        Ok(plan)
    }

    fn plan_restart_all(project: &ProjectSpec) -> RecoveryPlan {
        let mut plan = RecoveryPlan::new(RecoveryStrategy::RestartAll);
        if let Some(first) = project.phases.first() {
            plan.resume_from_phase = Some(first.id.clone());
        }
        plan.modifications.insert("clear_progress".to_string(), serde_json::json!(true));
        plan
    }

    fn plan_manual() -> RecoveryPlan {
        let mut plan = RecoveryPlan::new(RecoveryStrategy::Manual);
        plan.modifications.insert(
            "manual_steps".to_string(),
            serde_json::json!([
                "Review the failure context",
                "Identify root cause",
                "Apply manual fixes",
                "Resume execution",
            ]),
        );
        plan
    }

    async fn plan_adaptive(&self, failure: &FailureContext, checkpoint: Option<&Checkpoint>) -> RecoveryPlan {
        let mut plan = RecoveryPlan::new(RecoveryStrategy::Adaptive);
        let similar = self.find_similar_failures(failure).await;

        if similar.len() > 2 {
            if let Some(task_id) = &failure.task_id {
                plan.skip_tasks = vec![task_id.clone()];
                plan.modifications.insert("alternative_approach".to_string(), serde_json::json!(true));
            }
        } else {
            match failure.failure_type {
                FailureKind::Timeout => {
                    plan.modifications.insert("increase_timeout".to_string(), serde_json::json!(true));
                }
                FailureKind::ResourceFailure => {
                    plan.modifications.insert("reduce_parallelism".to_string(), serde_json::json!(true));
                }
                _ => {}
            }
            if let Some(task_id) = &failure.task_id {
                plan.retry_tasks = vec![task_id.clone()];
            }
        }

        plan.checkpoint_id = checkpoint.map(|c| c.snapshot.id.clone());
        plan
    }

    async fn find_similar_failures(&self, failure: &FailureContext) -> Vec<FailureContext> {
        let key = failure.similarity_key();
        self.failure_history
            .lock()
            .await
            .iter()
            .filter(|f| f.similarity_key() == key && f.timestamp != failure.timestamp)
            .cloned()
            .collect()
    }

    fn find_next_task(project: &ProjectSpec, phase_id: Option<&str>, task_id: &str) -> Option<String> {
        let phase_id = phase_id?;
        let phase = project.phases.iter().find(|p| p.id == phase_id)?;
        let idx = phase.tasks.iter().position(|t| t.id == task_id)?;
        phase.tasks.get(idx + 1).map(|t| t.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_store::{StateStore, StateStoreConfig};
    use tempfile::tempdir;

    async fn manager() -> RecoveryManager {
        let dir = tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("s.db"), StateStoreConfig::default()).await.unwrap();
        let checkpoints = Arc::new(CheckpointManager::new(store));
        RecoveryManager::new(RecoveryConfig::default(), checkpoints)
    }

    #[tokio::test]
    async fn analyzing_a_timeout_marks_it_recoverable() {
        let mgr = manager().await;
        let ctx = mgr.analyze_failure("RuntimeError", "connection timeout", None, Some("t1".into())).await;
        assert_eq!(ctx.failure_type, FailureKind::Timeout);
        assert!(ctx.recoverable);
    }

    #[tokio::test]
    async fn user_abort_cannot_recover() {
        let mgr = manager().await;
        let ctx = mgr.analyze_failure("RuntimeError", "user aborted the run", None, None).await;
        assert!(!mgr.can_recover(&ctx).await);
    }

    #[tokio::test]
    async fn no_checkpoint_task_failure_selects_retry() {
        let mgr = manager().await;
        let ctx = mgr.analyze_failure("ValueError", "bad state", None, Some("t1".into())).await;
        let project = ProjectSpec::new("p1", "Demo");
        let plan = mgr.create_recovery_plan(&ctx, &project, None, None).await.unwrap();
        assert_eq!(plan.strategy, Some(RecoveryStrategy::RetryFailed));
        assert_eq!(plan.retry_tasks, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn exceeding_max_attempts_errors() {
        let mgr = manager().await;
        let mut ctx = mgr.analyze_failure("ValueError", "bad state", None, Some("t1".into())).await;
        ctx.recovery_attempts = 3;
        let project = ProjectSpec::new("p1", "Demo");
        let err = mgr.create_recovery_plan(&ctx, &project, None, None).await.unwrap_err();
        assert!(matches!(err, RecoveryError::AttemptsExceeded { max: 3 }));
    }

    #[tokio::test]
    async fn recurring_failures_trigger_alternative_approach() {
        let mgr = manager().await;
        for _ in 0..3 {
            mgr.analyze_failure("ValueError", "bad state", Some("p1".into()), Some("t1".into())).await;
        }
        let latest = mgr.analyze_failure("ValueError", "bad state", Some("p1".into()), Some("t1".into())).await;
        let project = ProjectSpec::new("p1", "Demo");
        let plan = mgr
            .create_recovery_plan(&latest, &project, None, Some(RecoveryStrategy::Adaptive))
            .await
            .unwrap();
        assert_eq!(plan.skip_tasks, vec!["t1".to_string()]);
        assert_eq!(plan.modifications.get("alternative_approach"), Some(&serde_json::json!(true)));
    }
}
