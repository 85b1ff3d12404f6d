//! The Orchestrator (C9): the top-level control loop driving the Phase
//! Executor, Cost Tracker, Progress Tracker, State Store, Checkpoint
//! Manager, Recovery Manager, and Validator through the phase state
//! machine of SPEC_FULL.md §4.9.
//!
//! Architectural precedent: `crate::orchestrator::mod`'s persistence-
//! ownership doc — one canonical checkpoint/recovery authority, other
//! layers append-only.

use crate::cost::CostTracker;
use crate::engine_config::EngineConfig;
use crate::errors::EngineError;
use crate::executor::{ExecutorConfig, PhaseExecutor, Strategy};
use crate::interfaces::{FileSink, Generator, NullResearcher, ResearchKind, Researcher};
use crate::model::cost::CostEntry;
use crate::model::{ExecutionContext, ProjectSpec, TaskStatus};
use crate::progress::ProgressTracker;
use crate::recovery::{RecoveryConfig, RecoveryManager};
use crate::runner::{RunnerConfig, TaskRunner};
use crate::state_store::{CheckpointManager, StateStore};
use crate::validator::{ValidationReport, Validator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Planning,
    RunningPhase,
    ValidatingPhase,
    Completed,
    Failed,
    Aborted,
}

pub struct BuildResult {
    pub execution_id: String,
    pub state: ExecutionState,
    pub completed_phases: Vec<String>,
    pub failed_phase: Option<String>,
    pub validation: Option<ValidationReport>,
}

/// Approximate USD per token, used to convert `TaskResult`/`GeneratorResponse`
/// usage into a dollar figure for the Cost Tracker (SPEC_FULL §2, S1). Not a
/// pricing authority — just enough for budget-alert thresholds to react to
/// real usage instead of a flat zero.
const USD_PER_TOKEN: f64 = 0.000003;

fn parse_strategy(name: &str) -> Strategy {
    match name {
        "seq" => Strategy::Sequential,
        "par" => Strategy::Parallel,
        "pri" => Strategy::PriorityBased,
        _ => Strategy::DependencyBased,
    }
}

/// Owns every component for one build run and drives the phase loop.
pub struct Orchestrator {
    config: EngineConfig,
    state_store: Arc<StateStore>,
    checkpoints: Arc<CheckpointManager>,
    recovery: RecoveryManager,
    cost: CostTracker,
    progress: ProgressTracker,
    validator: Validator,
    runner: Arc<TaskRunner>,
    researcher: Arc<dyn Researcher>,
}

impl Orchestrator {
    pub async fn new(
        execution_id: impl Into<String>,
        config: EngineConfig,
        state_dir: &std::path::Path,
        generator: Option<Arc<dyn Generator>>,
        sink: Option<Arc<dyn FileSink>>,
        researcher: Option<Arc<dyn Researcher>>,
    ) -> Result<Self, EngineError> {
        let execution_id = execution_id.into();
        let state_store = StateStore::open(
            &state_dir.join("execution_state.db"),
            crate::state_store::StateStoreConfig {
                cache_capacity: config.cache_capacity,
                max_snapshots: config.max_snapshots,
                auto_snapshot: config.auto_snapshot,
                snapshot_min_interval_seconds: config.snapshot_min_interval_seconds,
            },
        )
        .await?;
        let checkpoints = Arc::new(CheckpointManager::new(Arc::clone(&state_store)));
        let recovery = RecoveryManager::new(
            RecoveryConfig {
                max_recovery_attempts: config.max_recovery_attempts,
                failure_threshold: config.failure_threshold_per_hour,
            },
            Arc::clone(&checkpoints),
        );
        let cost = CostTracker::with_thresholds(execution_id.clone(), config.budget_usd, config.budget_alert_thresholds.clone());
        let progress = ProgressTracker::start_project(Vec::new(), None);

        let mut runner = TaskRunner::new(RunnerConfig {
            default_timeout: Duration::from_secs(config.task_timeout_seconds),
            retry_attempts: config.retry_attempts,
            retry_backoff_seconds: config.retry_backoff_seconds,
            retry_backoff_factor: config.retry_backoff_factor,
        });
        if let Some(g) = generator {
            runner = runner.with_generator(g);
        }
        if let Some(s) = sink {
            runner = runner.with_sink(s);
        }

        Ok(Self {
            config,
            state_store,
            checkpoints,
            recovery,
            cost,
            progress,
            validator: Validator::new(),
            runner: Arc::new(runner),
            researcher: researcher.unwrap_or_else(|| Arc::new(NullResearcher)),
        })
    }

    /// Runs every phase of `project` in declaration order, recovering from
    /// phase failures when the Recovery Manager says it can, and running
    /// the global Validator once all phases succeed.
    #[instrument(skip(self, project), fields(execution_id = %context.execution_id))]
    pub async fn build(&self, project: &mut ProjectSpec, context: &ExecutionContext, output_dir: &PathBuf) -> Result<BuildResult, EngineError> {
        self.build_with_options(project, context, output_dir, true).await
    }

    /// Like [`Self::build`], but `validate` controls whether the global
    /// Validator runs after all phases succeed (CLI `--no-validate`).
    pub async fn build_with_options(
        &self,
        project: &mut ProjectSpec,
        context: &ExecutionContext,
        output_dir: &PathBuf,
        validate: bool,
    ) -> Result<BuildResult, EngineError> {
        let mut state = ExecutionState::Planning;
        let mut completed_phases = Vec::new();
        info!(phases = project.phases.len(), "planning build");

        let start_index = self.resume_index(project, context);

        for idx in start_index..project.phases.len() {
            if context.is_cancelled() {
                state = ExecutionState::Aborted;
                return Ok(BuildResult {
                    execution_id: context.execution_id.clone(),
                    state,
                    completed_phases,
                    failed_phase: None,
                    validation: None,
                });
            }

            state = ExecutionState::RunningPhase;
            let phase_id = project.phases[idx].id.clone();

            if self.config.enable_research {
                let query = project.phases[idx].objective.clone();
                match self.researcher.research(&query, ResearchKind::BestPractices, context).await {
                    Ok(findings) => context.cache_research(format!("phase:{phase_id}"), serde_json::to_value(&findings).unwrap_or_default()),
                    Err(e) => warn!(phase_id = %phase_id, error = %e, "research preparation failed, continuing without it"),
                }
            }

            self.checkpoints
                .checkpoint_phase_boundary(&context.execution_id, &phase_id, serde_json::to_value(&*project).unwrap_or_default())
                .await?;

            let mut attempt = 0;
            let outcome = loop {
                attempt += 1;
                let executor = PhaseExecutor::new(
                    ExecutorConfig {
                        strategy: parse_strategy(&self.config.strategy),
                        max_concurrent_tasks: self.config.max_concurrent_tasks,
                        checkpoint_after_tasks: self.config.checkpoint_after_tasks,
                        continue_on_error: self.config.continue_on_error,
                    },
                    Arc::clone(&self.runner),
                );

                let phase = &mut project.phases[idx];
                let checkpoints = Arc::clone(&self.checkpoints);
                let execution_id = context.execution_id.clone();
                let result = executor
                    .run_phase(phase, context, |p| {
                        let checkpoints = Arc::clone(&checkpoints);
                        let execution_id = execution_id.clone();
                        let snapshot = serde_json::to_value(&*p).unwrap_or_default();
                        tokio::spawn(async move {
                            if let Err(e) = checkpoints.create_checkpoint(&execution_id, snapshot, vec![]).await {
                                warn!(error = %e, "mid-phase checkpoint failed");
                            }
                        });
                    })
                    .await;

                let phase_status = project.phases[idx].status;
                for task in &project.phases[idx].tasks {
                    if task.status != TaskStatus::Completed {
                        continue;
                    }
                    let tokens_used = task
                        .outputs
                        .get("tokens_used")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    let mut entry = CostEntry::new(
                        crate::model::cost::CostCategory::Execution,
                        tokens_used as f64 * USD_PER_TOKEN,
                        format!("task {} ({})", task.id, task.kind),
                    );
                    entry.phase = Some(phase_id.clone());
                    entry.task = Some(task.id.clone());
                    entry.tokens_used = tokens_used;
                    entry.duration_seconds = task
                        .started_at
                        .zip(task.completed_at)
                        .map(|(start, end)| (end - start).num_milliseconds() as f64 / 1000.0);
                    self.cost.add(entry).ok();
                }

                if result.is_ok() && phase_status != crate::model::phase::PhaseStatus::Failed {
                    break true;
                }

                let failure = self
                    .recovery
                    .analyze_failure("PhaseExecutionError", &format!("phase {phase_id} failed"), Some(phase_id.clone()), None)
                    .await;
                if !self.recovery.can_recover(&failure).await || attempt > self.config.max_recovery_attempts {
                    error!(phase_id = %phase_id, "phase failed and is not recoverable");
                    break false;
                }
                let _plan = self.recovery.create_recovery_plan(&failure, project, None, None).await?;
                warn!(phase_id = %phase_id, attempt, "retrying phase after recovery plan");
            };

            if !outcome {
                state = ExecutionState::Failed;
                return Ok(BuildResult {
                    execution_id: context.execution_id.clone(),
                    state,
                    completed_phases,
                    failed_phase: Some(phase_id),
                    validation: None,
                });
            }

            completed_phases.push(phase_id.clone());
            self.state_store
                .save_execution_state(&context.execution_id, serde_json::to_value(&*project).unwrap_or_default())
                .await?;
        }

        state = ExecutionState::ValidatingPhase;
        let validation = if validate {
            self.validator.validate(project, output_dir).await.ok()
        } else {
            None
        };
        state = ExecutionState::Completed;

        Ok(BuildResult {
            execution_id: context.execution_id.clone(),
            state,
            completed_phases,
            failed_phase: None,
            validation,
        })
    }

    fn resume_index(&self, project: &ProjectSpec, context: &ExecutionContext) -> usize {
        if let Some(phase_id) = &context.resume_hints.resume_from_phase {
            return project.phase_index(phase_id).unwrap_or(0);
        }
        0
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn cost(&self) -> &CostTracker {
        &self.cost
    }

    pub fn state_store(&self) -> &Arc<StateStore> {
        &self.state_store
    }
}

pub fn new_execution_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Phase, Task, TaskKind};
    use tempfile::tempdir;

    #[tokio::test]
    async fn empty_project_completes_with_no_phases() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let orchestrator = Orchestrator::new("exec-1", config, dir.path(), None, None, None).await.unwrap();
        let mut project = ProjectSpec::new("p1", "Demo");
        let context = ExecutionContext::new("exec-1", "p1", dir.path().to_path_buf());
        let result = orchestrator.build(&mut project, &context, &dir.path().to_path_buf()).await.unwrap();
        assert_eq!(result.state, ExecutionState::Completed);
        assert!(result.completed_phases.is_empty());
    }

    #[tokio::test]
    async fn single_phase_with_one_task_completes() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let orchestrator = Orchestrator::new("exec-1", config, dir.path(), None, None, None).await.unwrap();
        let mut task = Task::new("t1", "T1", TaskKind::Analysis);
        task.parameters.insert("analysis_type".into(), serde_json::json!("code_complexity"));
        task.parameters.insert("source".into(), serde_json::json!("fn main() {}"));
        let phase = Phase::new("p1", "Only", "obj").with_tasks(vec![task]);
        let mut project = ProjectSpec::new("proj", "Demo").with_phases(vec![phase]);
        let context = ExecutionContext::new("exec-1", "proj", dir.path().to_path_buf());
        let result = orchestrator.build(&mut project, &context, &dir.path().to_path_buf()).await.unwrap();
        assert_eq!(result.state, ExecutionState::Completed);
        assert_eq!(result.completed_phases, vec!["p1".to_string()]);
    }
}
