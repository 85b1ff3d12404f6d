use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forge::engine_config::{CliOverrides, EngineConfig};
use forge::interfaces::{LocalFileSink, ProcessGenerator};
use forge::model::ProjectSpec;
use forge::orchestrator::{ExecutionState, Orchestrator};
use forge::state_store::StateStoreConfig;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit codes: 0 success, 1 build failed but reported cleanly, 2 invalid
/// input/spec, 3 aborted by user, 4 unrecoverable internal error.
#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(version, about = "Hierarchical build orchestrator: phases, tasks, checkpoints, recovery, and cost tracking")]
struct Cli {
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a build from a project spec file.
    Build {
        spec: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        resume: bool,
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long = "max-concurrent")]
        max_concurrent: Option<usize>,
        #[arg(long)]
        budget: Option<f64>,
        #[arg(long = "no-validate")]
        no_validate: bool,
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Print the planned phase/task graph and exit.
    Plan { spec: PathBuf },
    /// Continue a previously started build from its latest checkpoint.
    Resume { execution_id: String },
    /// Run the validator over existing generated output.
    Validate { output_dir: PathBuf },
    /// Durable state import/export.
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    Export { execution_id: String, path: PathBuf },
    Import { path: PathBuf },
}

fn init_logging() {
    let filter = std::env::var("CLAUDE_CODE_LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_project_spec(path: &Path) -> Result<ProjectSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read spec file: {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).context("failed to parse YAML project spec")
        }
        _ => serde_json::from_str(&content).context("failed to parse JSON project spec"),
    }
}

/// Stable execution id derived from the spec file's canonical path, so
/// `--resume` finds the same state-store row across invocations.
fn execution_id_for(spec_path: &Path) -> String {
    let canonical = spec_path.canonicalize().unwrap_or_else(|_| spec_path.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    format!("build-{}", &hex[..20])
}

fn print_plan(project: &ProjectSpec) {
    println!("project: {} ({})", project.config.name, project.config.id);
    for phase in &project.phases {
        println!("phase {} — {} [{} tasks]", phase.id, phase.name, phase.tasks.len());
        for task in &phase.tasks {
            let deps = if task.dependencies.is_empty() {
                String::new()
            } else {
                format!(" deps={:?}", task.dependencies)
            };
            println!("  - {} ({}){}", task.id, task.kind, deps);
        }
    }
}

async fn run_build(
    project_dir: &Path,
    config_path: Option<&Path>,
    spec: PathBuf,
    output: Option<PathBuf>,
    resume: bool,
    strategy: Option<String>,
    max_concurrent: Option<usize>,
    budget: Option<f64>,
    no_validate: bool,
    dry_run: bool,
) -> Result<ExitCode> {
    let mut project = match load_project_spec(&spec) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("invalid project spec: {e:#}");
            return Ok(ExitCode::from(2));
        }
    };

    if dry_run {
        print_plan(&project);
        return Ok(ExitCode::SUCCESS);
    }

    let cli_overrides = CliOverrides {
        strategy,
        max_concurrent_tasks: max_concurrent,
        budget_usd: budget,
        continue_on_error: None,
    };
    let config = EngineConfig::resolve(project_dir, config_path, &cli_overrides)?;

    let output_dir = output.unwrap_or_else(|| project_dir.join("output"));
    let state_dir = project_dir.join(".orchestrator");
    std::fs::create_dir_all(&state_dir).context("failed to create .orchestrator state directory")?;
    std::fs::create_dir_all(&output_dir).context("failed to create output directory")?;

    let execution_id = execution_id_for(&spec);
    let generator: Arc<dyn forge::interfaces::Generator> = Arc::new(ProcessGenerator::new("claude"));
    let sink: Arc<dyn forge::interfaces::FileSink> = Arc::new(LocalFileSink::new(output_dir.clone()));

    let orchestrator = Orchestrator::new(execution_id.clone(), config, &state_dir, Some(generator), Some(sink), None).await?;

    let mut context = forge::model::ExecutionContext::new(execution_id.clone(), project.config.id.clone(), project_dir.to_path_buf());

    if resume {
        if let Some(saved) = orchestrator.state_store().load_execution_state(&execution_id).await? {
            if let Ok(saved_project) = serde_json::from_value::<ProjectSpec>(saved) {
                project = saved_project;
            }
            if let Some(first_incomplete) = project
                .phases
                .iter()
                .find(|p| !matches!(p.status, forge::model::PhaseStatus::Completed))
            {
                context.resume_hints.resume_from_phase = Some(first_incomplete.id.clone());
            }
        }
    }

    let result = orchestrator.build_with_options(&mut project, &context, &output_dir, !no_validate).await;

    match result {
        Ok(build_result) => match build_result.state {
            ExecutionState::Completed => {
                if let Some(report) = &build_result.validation {
                    if !report.is_clean() {
                        eprintln!("build completed with {} validation error(s)", report.errors.len());
                    }
                }
                println!("build {} completed: {} phase(s)", build_result.execution_id, build_result.completed_phases.len());
                Ok(ExitCode::SUCCESS)
            }
            ExecutionState::Aborted => {
                eprintln!("build aborted");
                Ok(ExitCode::from(3))
            }
            _ => {
                eprintln!(
                    "build failed at phase {}",
                    build_result.failed_phase.unwrap_or_else(|| "<unknown>".to_string())
                );
                Ok(ExitCode::from(1))
            }
        },
        Err(e) => {
            eprintln!("unrecoverable engine error: {e:#}");
            Ok(ExitCode::from(4))
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();
    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    let code = match cli.command {
        Commands::Build { spec, output, resume, strategy, max_concurrent, budget, no_validate, dry_run } => {
            run_build(&project_dir, cli.config.as_deref(), spec, output, resume, strategy, max_concurrent, budget, no_validate, dry_run).await?
        }
        Commands::Plan { spec } => match load_project_spec(&spec) {
            Ok(project) => {
                print_plan(&project);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("invalid project spec: {e:#}");
                ExitCode::from(2)
            }
        },
        Commands::Resume { execution_id } => {
            let state_dir = project_dir.join(".orchestrator");
            let store = forge::state_store::StateStore::open(&state_dir.join("execution_state.db"), StateStoreConfig::default()).await?;
            match store.load_execution_state(&execution_id).await? {
                Some(saved) => {
                    let mut project: ProjectSpec = serde_json::from_value(saved).context("corrupt saved project state")?;
                    let config = EngineConfig::resolve(&project_dir, cli.config.as_deref(), &CliOverrides::default())?;
                    let output_dir = project_dir.join("output");
                    std::fs::create_dir_all(&output_dir)?;
                    let generator: Arc<dyn forge::interfaces::Generator> = Arc::new(ProcessGenerator::new("claude"));
                    let sink: Arc<dyn forge::interfaces::FileSink> = Arc::new(LocalFileSink::new(output_dir.clone()));
                    let orchestrator = Orchestrator::new(execution_id.clone(), config, &state_dir, Some(generator), Some(sink), None).await?;
                    let mut context = forge::model::ExecutionContext::new(execution_id.clone(), project.config.id.clone(), project_dir.clone());
                    if let Some(first_incomplete) = project.phases.iter().find(|p| !matches!(p.status, forge::model::PhaseStatus::Completed)) {
                        context.resume_hints.resume_from_phase = Some(first_incomplete.id.clone());
                    }
                    match orchestrator.build(&mut project, &context, &output_dir).await {
                        Ok(r) if r.state == ExecutionState::Completed => ExitCode::SUCCESS,
                        Ok(r) if r.state == ExecutionState::Aborted => ExitCode::from(3),
                        Ok(_) => ExitCode::from(1),
                        Err(e) => {
                            eprintln!("unrecoverable engine error: {e:#}");
                            ExitCode::from(4)
                        }
                    }
                }
                None => {
                    eprintln!("no saved state found for execution {execution_id}");
                    ExitCode::from(2)
                }
            }
        }
        Commands::Validate { output_dir } => {
            let validator = forge::validator::Validator::new();
            let project = ProjectSpec::new("adhoc", "Ad-hoc validation");
            let report = validator.validate(&project, &output_dir).await?;
            println!("errors: {}, warnings: {}", report.errors.len(), report.warnings.len());
            for issue in report.errors.iter().chain(report.warnings.iter()) {
                println!("  [{}] {}: {}", issue.severity, issue.category, issue.message);
            }
            if report.is_clean() { ExitCode::SUCCESS } else { ExitCode::from(1) }
        }
        Commands::State { command } => {
            let state_dir = project_dir.join(".orchestrator");
            std::fs::create_dir_all(&state_dir)?;
            let store = forge::state_store::StateStore::open(&state_dir.join("execution_state.db"), StateStoreConfig::default()).await?;
            match command {
                StateCommands::Export { execution_id, path } => {
                    store.export(&execution_id, &path).await?;
                    println!("exported {execution_id} to {}", path.display());
                    ExitCode::SUCCESS
                }
                StateCommands::Import { path } => {
                    let execution_id = store.import(&path).await?;
                    println!("imported execution {execution_id}");
                    ExitCode::SUCCESS
                }
            }
        }
    };

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_is_stable_for_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let spec_path = dir.path().join("spec.json");
        std::fs::write(&spec_path, "{}").unwrap();
        let a = execution_id_for(&spec_path);
        let b = execution_id_for(&spec_path);
        assert_eq!(a, b);
    }

    #[test]
    fn loads_json_and_yaml_specs() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("spec.json");
        std::fs::write(&json_path, r#"{"config":{"id":"p","name":"P","version":"","description":""},"phases":[]}"#).unwrap();
        let project = load_project_spec(&json_path).unwrap();
        assert_eq!(project.config.id, "p");
    }
}
