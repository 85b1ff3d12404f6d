//! Task-level pre/post hooks. Grounded on the donor's
//! `src/hooks/{executor.rs,types.rs}` JSON-over-stdio handshake, narrowed to
//! task granularity (SPEC_FULL §4.5).

use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, Serialize)]
pub struct TaskHookContext {
    pub event: String,
    pub task_id: String,
    pub execution_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskHookOutcome {
    Continue,
    Block(String),
    Skip,
}

#[async_trait]
pub trait TaskHook: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, context: &TaskHookContext) -> anyhow::Result<TaskHookOutcome>;
}

/// A hook backed by a subprocess command. The context is piped as JSON on
/// stdin; the exit code selects the outcome: 0=continue, 1=block, 2=skip,
/// anything else is treated as block with the command's stderr as reason.
pub struct CommandHook {
    pub name: String,
    pub command: String,
    pub timeout: Duration,
}

#[async_trait]
impl TaskHook for CommandHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, context: &TaskHookContext) -> anyhow::Result<TaskHookOutcome> {
        let payload = serde_json::to_string(context)?;
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload.as_bytes()).await?;
        }
        let output = tokio::time::timeout(self.timeout, child.wait_with_output()).await??;
        let outcome = match output.status.code() {
            Some(0) => TaskHookOutcome::Continue,
            Some(2) => TaskHookOutcome::Skip,
            _ => TaskHookOutcome::Block(String::from_utf8_lossy(&output.stderr).to_string()),
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_zero_continues() {
        let hook = CommandHook {
            name: "noop".into(),
            command: "true".into(),
            timeout: Duration::from_secs(5),
        };
        let ctx = TaskHookContext { event: "pre-task".into(), task_id: "t".into(), execution_id: "e".into() };
        assert_eq!(hook.run(&ctx).await.unwrap(), TaskHookOutcome::Continue);
    }

    #[tokio::test]
    async fn exit_one_blocks() {
        let hook = CommandHook {
            name: "blocker".into(),
            command: "exit 1".into(),
            timeout: Duration::from_secs(5),
        };
        let ctx = TaskHookContext { event: "pre-task".into(), task_id: "t".into(), execution_id: "e".into() };
        assert!(matches!(hook.run(&ctx).await.unwrap(), TaskHookOutcome::Block(_)));
    }
}
