//! Per-kind task dispatch contracts (SPEC_FULL §4.5).

use crate::interfaces::{FileSink, Generator};
use crate::model::{ExecutionContext, Task, TaskKind};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;

pub async fn dispatch(
    task: &Task,
    context: &ExecutionContext,
    generator: Option<&dyn Generator>,
    sink: Option<&dyn FileSink>,
) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    match &task.kind {
        TaskKind::CodeGeneration => code_generation(task, context, generator).await,
        TaskKind::FileOperation => file_operation(task, sink).await,
        TaskKind::CommandExecution => command_execution(task).await,
        TaskKind::ApiCall => api_call(task).await,
        TaskKind::Validation => validation(task),
        TaskKind::Transformation => transformation(task),
        TaskKind::Analysis => analysis(task),
        TaskKind::Research | TaskKind::Mcp | TaskKind::Custom(_) => {
            anyhow::bail!("no handler registered for task kind {}", task.kind)
        }
    }
}

async fn code_generation(
    task: &Task,
    context: &ExecutionContext,
    generator: Option<&dyn Generator>,
) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let generator = generator.ok_or_else(|| anyhow::anyhow!("no Generator configured for code-generation task"))?;
    let prompt = task
        .parameters
        .get("prompt")
        .and_then(|v| v.as_str())
        .unwrap_or(&task.description)
        .to_string();
    let response = generator.generate(&prompt, context).await?;
    let mut outputs = HashMap::new();
    outputs.insert("response_summary".to_string(), serde_json::json!(response.text.chars().take(200).collect::<String>()));
    outputs.insert("tokens_used".to_string(), serde_json::json!(response.usage.total_tokens));
    outputs.insert("execution_time_ms".to_string(), serde_json::json!(response.execution_time.as_millis() as u64));
    Ok(outputs)
}

async fn file_operation(task: &Task, sink: Option<&dyn FileSink>) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let sink = sink.ok_or_else(|| anyhow::anyhow!("no FileSink configured for file-operation task"))?;
    let op = task.parameters.get("operation").and_then(|v| v.as_str()).unwrap_or("create");
    let path = task
        .parameters
        .get("path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("file-operation task missing 'path' parameter"))?;
    let path = std::path::Path::new(path);
    match op {
        "create" => {
            let content = task.parameters.get("content").and_then(|v| v.as_str()).unwrap_or("");
            sink.write(path, content.as_bytes()).await?;
        }
        "copy" => {
            let dst = task
                .parameters
                .get("destination")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("copy operation missing 'destination' parameter"))?;
            sink.copy(path, std::path::Path::new(dst)).await?;
        }
        "delete" => sink.remove(path).await?,
        other => anyhow::bail!("unknown file operation '{other}'"),
    }
    let mut outputs = HashMap::new();
    outputs.insert("operation".to_string(), serde_json::json!(op));
    outputs.insert("path".to_string(), serde_json::json!(path.to_string_lossy()));
    Ok(outputs)
}

async fn command_execution(task: &Task) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let command = task
        .parameters
        .get("command")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("command-execution task missing 'command' parameter"))?;
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;
    if !output.status.success() {
        anyhow::bail!(
            "command '{command}' exited with {}: {}",
            output.status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    let mut outputs = HashMap::new();
    outputs.insert("exit_code".to_string(), serde_json::json!(output.status.code().unwrap_or(-1)));
    outputs.insert("stdout".to_string(), serde_json::json!(String::from_utf8_lossy(&output.stdout)));
    outputs.insert("stderr".to_string(), serde_json::json!(String::from_utf8_lossy(&output.stderr)));
    Ok(outputs)
}

async fn api_call(task: &Task) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let url = task
        .parameters
        .get("url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("api-call task missing 'url' parameter"))?;
    let method = task.parameters.get("method").and_then(|v| v.as_str()).unwrap_or("GET");
    let client = reqwest::Client::new();
    let mut builder = client.request(method.parse()?, url);
    if let Some(body) = task.parameters.get("body") {
        builder = builder.json(body);
    }
    let response = builder.send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.as_u16() >= 400 {
        anyhow::bail!("api call to {url} failed with status {status}: {body}");
    }
    let mut outputs = HashMap::new();
    outputs.insert("status".to_string(), serde_json::json!(status.as_u16()));
    outputs.insert("body".to_string(), serde_json::json!(body));
    Ok(outputs)
}

fn validation(task: &Task) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let validation_type = task.parameters.get("validation_type").and_then(|v| v.as_str()).unwrap_or("custom");
    match validation_type {
        "file_exists" => {
            let path = task
                .parameters
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("file_exists validation missing 'path'"))?;
            let exists = std::path::Path::new(path).exists();
            let mut outputs = HashMap::new();
            outputs.insert("exists".to_string(), serde_json::json!(exists));
            if !exists {
                anyhow::bail!("expected file '{path}' does not exist");
            }
            Ok(outputs)
        }
        "json_schema" => {
            let value = task.parameters.get("value").cloned().unwrap_or(serde_json::Value::Null);
            let mut outputs = HashMap::new();
            outputs.insert("is_object_or_array".to_string(), serde_json::json!(value.is_object() || value.is_array()));
            Ok(outputs)
        }
        _ => Ok(HashMap::new()),
    }
}

fn transformation(task: &Task) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let transform_type = task.parameters.get("transform_type").and_then(|v| v.as_str()).unwrap_or("custom");
    match transform_type {
        "json" => {
            let input = task.parameters.get("input").cloned().unwrap_or(serde_json::Value::Null);
            let mut outputs = HashMap::new();
            outputs.insert("output".to_string(), input);
            Ok(outputs)
        }
        "template" => {
            let template = task.parameters.get("template").and_then(|v| v.as_str()).unwrap_or("");
            let mut rendered = template.to_string();
            if let Some(serde_json::Value::Object(vars)) = task.parameters.get("variables") {
                for (k, v) in vars {
                    let placeholder = format!("{{{{{k}}}}}");
                    rendered = rendered.replace(&placeholder, &v.to_string());
                }
            }
            let mut outputs = HashMap::new();
            outputs.insert("rendered".to_string(), serde_json::json!(rendered));
            Ok(outputs)
        }
        _ => Ok(HashMap::new()),
    }
}

fn analysis(task: &Task) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let analysis_type = task.parameters.get("analysis_type").and_then(|v| v.as_str()).unwrap_or("custom");
    match analysis_type {
        "code_complexity" => {
            let source = task.parameters.get("source").and_then(|v| v.as_str()).unwrap_or("");
            let mut outputs = HashMap::new();
            outputs.insert("lines".to_string(), serde_json::json!(source.lines().count()));
            Ok(outputs)
        }
        "dependencies" => Ok(HashMap::new()),
        "custom" => anyhow::bail!("custom analysis requires a registered handler"),
        other => anyhow::bail!("unsupported analysis type '{other}'"),
    }
}
