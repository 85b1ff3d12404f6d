//! The Generator interface and a concrete subprocess-backed implementation.
//!
//! `ProcessGenerator` is grounded on the donor's `ClaudeRunner`
//! (`src/orchestrator/runner.rs`): spawn a CLI subprocess, pipe the prompt
//! via stdin, and read newline-delimited JSON events from stdout.

use super::Generator;
use crate::model::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorResponse {
    pub text: String,
    pub usage: GeneratorUsage,
    pub execution_time: Duration,
    pub model: String,
}

/// Drives the configured CLI command (`claude` by default) as a subprocess.
pub struct ProcessGenerator {
    pub command: String,
    pub extra_args: Vec<String>,
    pub timeout: Duration,
}

impl ProcessGenerator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            extra_args: vec!["--print".to_string()],
            timeout: Duration::from_secs(600),
        }
    }
}

#[async_trait]
impl Generator for ProcessGenerator {
    #[instrument(skip(self, prompt, context), fields(execution_id = %context.execution_id))]
    async fn generate(&self, prompt: &str, context: &ExecutionContext) -> anyhow::Result<GeneratorResponse> {
        let start = Instant::now();
        let mut child = Command::new(&self.command)
            .args(&self.extra_args)
            .current_dir(&context.project_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let stdout = child.stdout.take().expect("stdout piped");
        let mut reader = BufReader::new(stdout).lines();
        let mut collected = String::new();
        let mut usage = GeneratorUsage::default();

        let read_fut = async {
            while let Ok(Some(line)) = reader.next_line().await {
                if let Ok(event) = serde_json::from_str::<serde_json::Value>(&line) {
                    if let Some(text) = event.get("text").and_then(|v| v.as_str()) {
                        collected.push_str(text);
                    }
                    if let Some(tokens) = event.get("usage") {
                        usage.input_tokens = tokens.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                        usage.output_tokens = tokens.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                        usage.total_tokens = usage.input_tokens + usage.output_tokens;
                    }
                } else {
                    collected.push_str(&line);
                    collected.push('\n');
                }
            }
        };

        match tokio::time::timeout(self.timeout, read_fut).await {
            Ok(()) => {}
            Err(_) => {
                warn!("generator subprocess timed out, killing");
                let _ = child.kill().await;
                anyhow::bail!("generator timed out after {:?}", self.timeout);
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            anyhow::bail!("generator process exited with {status}");
        }
        debug!(tokens = usage.total_tokens, "generator response collected");

        Ok(GeneratorResponse {
            text: collected,
            usage,
            execution_time: start.elapsed(),
            model: self.command.clone(),
        })
    }
}
