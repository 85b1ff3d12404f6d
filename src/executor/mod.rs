//! Phase Executor (C6): runs the tasks of a phase under a pluggable
//! scheduling strategy. See SPEC_FULL.md §4.6.

mod dependency;

pub use dependency::TaskGraph;

use crate::errors::PhaseExecutorError;
use crate::model::{ExecutionContext, Phase, Task, TaskStatus};
use crate::runner::TaskRunner;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Sequential,
    Parallel,
    DependencyBased,
    PriorityBased,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub strategy: Strategy,
    pub max_concurrent_tasks: usize,
    pub checkpoint_after_tasks: u32,
    pub continue_on_error: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::DependencyBased,
            max_concurrent_tasks: 5,
            checkpoint_after_tasks: 10,
            continue_on_error: false,
        }
    }
}

pub struct PhaseExecutor {
    config: ExecutorConfig,
    runner: Arc<TaskRunner>,
}

impl PhaseExecutor {
    pub fn new(config: ExecutorConfig, runner: Arc<TaskRunner>) -> Self {
        Self { config, runner }
    }

    /// Runs every task in `phase`, mutating each task's record in place.
    /// `on_checkpoint_due` is invoked after every `checkpoint_after_tasks`
    /// task completions and once at phase end.
    pub async fn run_phase(
        &self,
        phase: &mut Phase,
        context: &ExecutionContext,
        mut on_checkpoint_due: impl FnMut(&Phase),
    ) -> Result<(), PhaseExecutorError> {
        if phase.tasks.is_empty() {
            phase.status = crate::model::phase::PhaseStatus::Completed;
            on_checkpoint_due(phase);
            return Ok(());
        }

        let mut since_checkpoint: u32 = 0;
        match self.config.strategy {
            Strategy::Sequential => self.run_sequential(phase, context, &mut since_checkpoint, &mut on_checkpoint_due).await?,
            Strategy::Parallel => self.run_parallel_all(phase, context).await?,
            Strategy::DependencyBased => {
                self.run_dependency_based(phase, context, &mut since_checkpoint, &mut on_checkpoint_due).await?
            }
            Strategy::PriorityBased => self.run_priority_based(phase, context).await?,
        }

        phase.finalize_status();
        on_checkpoint_due(phase);
        Ok(())
    }

    async fn run_sequential(
        &self,
        phase: &mut Phase,
        context: &ExecutionContext,
        since_checkpoint: &mut u32,
        on_checkpoint_due: &mut impl FnMut(&Phase),
    ) -> Result<(), PhaseExecutorError> {
        for i in 0..phase.tasks.len() {
            if context.is_cancelled() {
                break;
            }
            let result = self.runner.run(&mut phase.tasks[i], context).await;
            *since_checkpoint += 1;
            if *since_checkpoint >= self.config.checkpoint_after_tasks {
                on_checkpoint_due(phase);
                *since_checkpoint = 0;
            }
            if result.is_err() && !self.config.continue_on_error {
                break;
            }
        }
        Ok(())
    }

    async fn run_parallel_all(&self, phase: &mut Phase, context: &ExecutionContext) -> Result<(), PhaseExecutorError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks));
        let runner = Arc::clone(&self.runner);
        let mut handles = Vec::new();
        for task in std::mem::take(&mut phase.tasks) {
            let sem = Arc::clone(&semaphore);
            let runner = Arc::clone(&runner);
            let ctx = context.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore closed");
                let mut task = task;
                let _ = runner.run(&mut task, &ctx).await;
                task
            }));
        }
        let mut tasks = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(error = %e, "task panicked"),
            }
        }
        phase.tasks = tasks;
        Ok(())
    }

    async fn run_dependency_based(
        &self,
        phase: &mut Phase,
        context: &ExecutionContext,
        since_checkpoint: &mut u32,
        on_checkpoint_due: &mut impl FnMut(&Phase),
    ) -> Result<(), PhaseExecutorError> {
        let graph = TaskGraph::build(&phase.id, &phase.tasks)?;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks));
        let mut settled: HashSet<String> = HashSet::new();

        loop {
            if settled.len() == phase.tasks.len() {
                break;
            }
            let ready_ids: Vec<String> = graph
                .ready_tasks(&settled)
                .into_iter()
                .map(|t| t.id.clone())
                .collect();
            if ready_ids.is_empty() {
                let unreachable: Vec<String> = phase
                    .tasks
                    .iter()
                    .filter(|t| !settled.contains(&t.id))
                    .map(|t| t.id.clone())
                    .collect();
                return Err(PhaseExecutorError::Deadlock {
                    phase_id: phase.id.clone(),
                    task_ids: unreachable,
                });
            }

            let runner = Arc::clone(&self.runner);
            let mut handles = Vec::new();
            for id in &ready_ids {
                let idx = graph.task_index(id).expect("ready task exists in graph");
                let task = std::mem::replace(&mut phase.tasks[idx], placeholder_task());
                let sem = Arc::clone(&semaphore);
                let runner = Arc::clone(&runner);
                let ctx = context.clone();
                handles.push((idx, tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore closed");
                    let mut task = task;
                    let _ = runner.run(&mut task, &ctx).await;
                    task
                })));
            }
            for (idx, handle) in handles {
                let task = handle.await.map_err(|e| PhaseExecutorError::TaskRunner(crate::errors::TaskRunnerError::Other(e.into())))?;
                settled.insert(task.id.clone());
                *since_checkpoint += if task.status.is_terminal() { 1 } else { 0 };
                phase.tasks[idx] = task;
            }
            if *since_checkpoint >= self.config.checkpoint_after_tasks {
                on_checkpoint_due(phase);
                *since_checkpoint = 0;
            }
            if !self.config.continue_on_error && phase.tasks.iter().any(|t| t.status == TaskStatus::Failed) {
                break;
            }
        }
        Ok(())
    }

    async fn run_priority_based(&self, phase: &mut Phase, context: &ExecutionContext) -> Result<(), PhaseExecutorError> {
        let mut indices: Vec<usize> = (0..phase.tasks.len()).collect();
        indices.sort_by_key(|&i| std::cmp::Reverse(phase.tasks[i].priority));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks));

        for batch in indices.chunks(self.config.max_concurrent_tasks) {
            let runner = Arc::clone(&self.runner);
            let mut handles = Vec::new();
            for &idx in batch {
                let task = std::mem::replace(&mut phase.tasks[idx], placeholder_task());
                let sem = Arc::clone(&semaphore);
                let runner = Arc::clone(&runner);
                let ctx = context.clone();
                handles.push((idx, tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore closed");
                    let mut task = task;
                    let _ = runner.run(&mut task, &ctx).await;
                    task
                })));
            }
            for (idx, handle) in handles {
                phase.tasks[idx] = handle.await.map_err(|e| PhaseExecutorError::TaskRunner(crate::errors::TaskRunnerError::Other(e.into())))?;
            }
        }
        info!(phase_id = %phase.id, "priority-based execution complete");
        Ok(())
    }

}

fn placeholder_task() -> Task {
    Task::new("__placeholder__", "placeholder", crate::model::TaskKind::Analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Phase, Task, TaskKind};
    use crate::runner::RunnerConfig;
    use std::path::PathBuf;

    fn task(id: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(id, id, TaskKind::Transformation).with_dependencies(deps.iter().map(|s| s.to_string()));
        t.parameters.insert("transform_type".into(), serde_json::json!("json"));
        t.parameters.insert("input".into(), serde_json::json!(1));
        t
    }

    #[tokio::test]
    async fn empty_phase_completes_immediately() {
        let runner = Arc::new(TaskRunner::new(RunnerConfig::default()));
        let executor = PhaseExecutor::new(ExecutorConfig::default(), runner);
        let mut phase = Phase::new("p1", "Empty", "obj");
        let ctx = ExecutionContext::new("e", "proj", PathBuf::from("/tmp"));
        executor.run_phase(&mut phase, &ctx, |_| {}).await.unwrap();
        assert_eq!(phase.status, crate::model::phase::PhaseStatus::Completed);
    }

    #[tokio::test]
    async fn dependency_based_respects_wave_order() {
        let runner = Arc::new(TaskRunner::new(RunnerConfig::default()));
        let config = ExecutorConfig { strategy: Strategy::DependencyBased, max_concurrent_tasks: 2, ..Default::default() };
        let executor = PhaseExecutor::new(config, runner);
        let mut phase = Phase::new("p1", "P", "obj").with_tasks(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ]);
        let ctx = ExecutionContext::new("e", "proj", PathBuf::from("/tmp"));
        executor.run_phase(&mut phase, &ctx, |_| {}).await.unwrap();
        let a_end = phase.tasks.iter().find(|t| t.id == "a").unwrap().completed_at.unwrap();
        let b_start = phase.tasks.iter().find(|t| t.id == "b").unwrap().started_at.unwrap();
        assert!(a_end <= b_start);
    }
}
