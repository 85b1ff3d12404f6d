//! Task Runner (C5): executes one task of a given kind, with hooks, retries,
//! and a hard deadline. See SPEC_FULL.md §4.5.

mod hooks;
mod kinds;

pub use hooks::{TaskHook, TaskHookContext, TaskHookOutcome};

use crate::errors::TaskRunnerError;
use crate::interfaces::{FileSink, Generator};
use crate::model::{ExecutionContext, Task, TaskResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub default_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff_seconds: f64,
    pub retry_backoff_factor: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(600),
            retry_attempts: 3,
            retry_backoff_seconds: 1.0,
            retry_backoff_factor: 2.0,
        }
    }
}

pub struct TaskRunner {
    config: RunnerConfig,
    generator: Option<Arc<dyn Generator>>,
    sink: Option<Arc<dyn FileSink>>,
    pre_hooks: Vec<Arc<dyn TaskHook>>,
    post_hooks: Vec<Arc<dyn TaskHook>>,
}

impl TaskRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            generator: None,
            sink: None,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn FileSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn add_pre_hook(mut self, hook: Arc<dyn TaskHook>) -> Self {
        self.pre_hooks.push(hook);
        self
    }

    pub fn add_post_hook(mut self, hook: Arc<dyn TaskHook>) -> Self {
        self.post_hooks.push(hook);
        self
    }

    /// Runs `task` to completion (including retries), honoring hard
    /// deadlines and cooperative cancellation from `context`.
    #[instrument(skip(self, task, context), fields(task_id = %task.id, kind = %task.kind))]
    pub async fn run(&self, task: &mut Task, context: &ExecutionContext) -> Result<TaskResult, TaskRunnerError> {
        let timeout = task.timeout.unwrap_or(self.config.default_timeout);
        let max_attempts = task.max_retries + 1;
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            if context.is_cancelled() {
                return Err(TaskRunnerError::Cancelled { task_id: task.id.clone() });
            }

            if let Some(outcome) = self.run_hooks(&self.pre_hooks, task, context, "pre-task", task.critical).await? {
                if let TaskHookOutcome::Skip = outcome {
                    task.mark_skipped("skipped by pre-task hook");
                    return Ok(TaskResult {
                        task_id: task.id.clone(),
                        status: task.status,
                        outputs: Default::default(),
                        error: task.error.clone(),
                        attempts: attempt,
                        duration: None,
                        tokens_used: None,
                    });
                }
            }

            task.mark_started();
            let start = Instant::now();
            let dispatch = kinds::dispatch(task, context, self.generator.as_deref(), self.sink.as_deref());
            let result = match tokio::time::timeout(timeout, dispatch).await {
                Ok(Ok(outputs)) => {
                    let tokens_used = outputs.get("tokens_used").and_then(|v| v.as_u64());
                    task.mark_completed(outputs.clone());
                    Ok(TaskResult {
                        task_id: task.id.clone(),
                        status: task.status,
                        outputs,
                        error: None,
                        attempts: attempt,
                        duration: Some(start.elapsed()),
                        tokens_used,
                    })
                }
                Ok(Err(e)) => {
                    last_error = Some(e.to_string());
                    task.mark_failed(e.to_string());
                    Err(TaskRunnerError::Failed { task_id: task.id.clone(), message: e.to_string() })
                }
                Err(_) => {
                    let msg = format!("task {} timed out after {:?}", task.id, timeout);
                    last_error = Some(msg.clone());
                    task.mark_failed(msg);
                    Err(TaskRunnerError::Timeout { task_id: task.id.clone(), timeout_secs: timeout.as_secs() })
                }
            };

            self.run_hooks(&self.post_hooks, task, context, "post-task", task.critical).await?;

            if result.is_ok() {
                info!(attempts = attempt, "task completed");
                return result;
            }
            if attempt < max_attempts {
                let backoff = self.config.retry_backoff_seconds * self.config.retry_backoff_factor.powi((attempt - 1) as i32);
                warn!(attempt, backoff_seconds = backoff, "task failed, retrying after backoff");
                tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                task.reset_for_retry();
            } else {
                return result;
            }
        }

        Err(TaskRunnerError::Failed {
            task_id: task.id.clone(),
            message: last_error.unwrap_or_else(|| "exhausted retries".to_string()),
        })
    }

    async fn run_hooks(
        &self,
        hooks: &[Arc<dyn TaskHook>],
        task: &Task,
        context: &ExecutionContext,
        event: &str,
        critical: bool,
    ) -> Result<Option<TaskHookOutcome>, TaskRunnerError> {
        for hook in hooks {
            let ctx = TaskHookContext {
                event: event.to_string(),
                task_id: task.id.clone(),
                execution_id: context.execution_id.clone(),
            };
            match hook.run(&ctx).await {
                Ok(TaskHookOutcome::Continue) => continue,
                Ok(TaskHookOutcome::Block(reason)) => {
                    return Err(TaskRunnerError::HookBlocked {
                        task_id: task.id.clone(),
                        hook: hook.name().to_string(),
                        reason,
                    });
                }
                Ok(outcome @ TaskHookOutcome::Skip) => return Ok(Some(outcome)),
                Err(e) if critical => {
                    return Err(TaskRunnerError::HookBlocked {
                        task_id: task.id.clone(),
                        hook: hook.name().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(hook = hook.name(), error = %e, "hook failed, continuing (non-critical task)");
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskKind;
    use std::path::PathBuf;

    #[tokio::test]
    async fn retries_three_times_with_exponential_backoff_scenario_s3() {
        let runner = TaskRunner::new(RunnerConfig {
            default_timeout: Duration::from_secs(5),
            retry_attempts: 3,
            retry_backoff_seconds: 0.1,
            retry_backoff_factor: 2.0,
        });
        let mut task = Task::new("x", "X", TaskKind::Analysis);
        task.parameters.insert("analysis_type".into(), serde_json::json!("unsupported_to_force_failure"));
        let ctx = ExecutionContext::new("e", "p", PathBuf::from("/tmp"));
        let start = Instant::now();
        let result = runner.run(&mut task, &ctx).await;
        let elapsed = start.elapsed().as_secs_f64();
        assert!(result.is_err());
        assert_eq!(task.attempts, 3);
        assert!(elapsed >= 0.3 && elapsed < 1.0, "elapsed={elapsed}");
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let runner = TaskRunner::new(RunnerConfig::default());
        let mut task = Task::new("x", "X", TaskKind::Analysis);
        let ctx = ExecutionContext::new("e", "p", PathBuf::from("/tmp"));
        ctx.cancel();
        let result = runner.run(&mut task, &ctx).await;
        assert!(matches!(result, Err(TaskRunnerError::Cancelled { .. })));
    }
}
