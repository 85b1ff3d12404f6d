//! Layered configuration for the build engine: CLI flags > config file
//! (`.orchestrator/config.toml` or `--config <path>`) > environment
//! variables > defaults, mirroring the donor's `ForgeConfig`/`Config::new()`
//! precedence (SPEC_FULL §6).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every field is optional so a partially-specified file only overrides
/// what it mentions; missing fields fall through to env then defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigFile {
    pub strategy: Option<String>,
    pub max_concurrent_tasks: Option<usize>,
    pub task_timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_backoff_seconds: Option<f64>,
    pub retry_backoff_factor: Option<f64>,
    pub checkpoint_after_tasks: Option<u32>,
    pub max_snapshots: Option<usize>,
    pub auto_snapshot: Option<bool>,
    pub snapshot_min_interval_seconds: Option<i64>,
    pub cache_capacity: Option<usize>,
    pub budget_usd: Option<f64>,
    pub budget_alert_thresholds: Option<Vec<f64>>,
    pub failure_threshold_per_hour: Option<u32>,
    pub max_recovery_attempts: Option<u32>,
    pub continue_on_error: Option<bool>,
    pub enable_research: Option<bool>,
    pub enable_mcp: Option<bool>,
    pub enable_rules: Option<bool>,
}

impl EngineConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content).context("failed to parse engine config file")
    }

    pub fn load_or_default(project_dir: &Path, override_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = override_path {
            return Self::load(path);
        }
        let default_path = project_dir.join(".orchestrator").join("config.toml");
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Fully-resolved configuration consumed by the orchestrator and its
/// components. Every field has a value; defaults match SPEC_FULL §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub strategy: String,
    pub max_concurrent_tasks: usize,
    pub task_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_backoff_seconds: f64,
    pub retry_backoff_factor: f64,
    pub checkpoint_after_tasks: u32,
    pub max_snapshots: usize,
    pub auto_snapshot: bool,
    pub snapshot_min_interval_seconds: i64,
    pub cache_capacity: usize,
    pub budget_usd: Option<f64>,
    pub budget_alert_thresholds: Vec<f64>,
    pub failure_threshold_per_hour: u32,
    pub max_recovery_attempts: u32,
    pub continue_on_error: bool,
    pub enable_research: bool,
    pub enable_mcp: bool,
    pub enable_rules: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: "dep".to_string(),
            max_concurrent_tasks: 5,
            task_timeout_seconds: 600,
            retry_attempts: 3,
            retry_backoff_seconds: 1.0,
            retry_backoff_factor: 2.0,
            checkpoint_after_tasks: 10,
            max_snapshots: 100,
            auto_snapshot: true,
            snapshot_min_interval_seconds: 300,
            cache_capacity: 1000,
            budget_usd: None,
            budget_alert_thresholds: vec![0.5, 0.75, 0.9, 1.0],
            failure_threshold_per_hour: 5,
            max_recovery_attempts: 3,
            continue_on_error: false,
            enable_research: true,
            enable_mcp: true,
            enable_rules: true,
        }
    }
}

/// CLI overrides threaded through from `clap`; every field is `Option` so
/// "not passed on the command line" is distinguishable from "explicitly
/// set to the default value".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub strategy: Option<String>,
    pub max_concurrent_tasks: Option<usize>,
    pub budget_usd: Option<f64>,
    pub continue_on_error: Option<bool>,
}

impl EngineConfig {
    /// Builds the effective configuration: CLI > file > env > defaults.
    pub fn resolve(project_dir: &Path, config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut config = Self::default();
        let file = EngineConfigFile::load_or_default(project_dir, config_path)?;

        apply_file(&mut config, &file);
        apply_env(&mut config);
        apply_cli(&mut config, cli);
        Ok(config)
    }
}

fn apply_file(config: &mut EngineConfig, file: &EngineConfigFile) {
    if let Some(v) = &file.strategy {
        config.strategy = v.clone();
    }
    if let Some(v) = file.max_concurrent_tasks {
        config.max_concurrent_tasks = v;
    }
    if let Some(v) = file.task_timeout_seconds {
        config.task_timeout_seconds = v;
    }
    if let Some(v) = file.retry_attempts {
        config.retry_attempts = v;
    }
    if let Some(v) = file.retry_backoff_seconds {
        config.retry_backoff_seconds = v;
    }
    if let Some(v) = file.retry_backoff_factor {
        config.retry_backoff_factor = v;
    }
    if let Some(v) = file.checkpoint_after_tasks {
        config.checkpoint_after_tasks = v;
    }
    if let Some(v) = file.max_snapshots {
        config.max_snapshots = v;
    }
    if let Some(v) = file.auto_snapshot {
        config.auto_snapshot = v;
    }
    if let Some(v) = file.snapshot_min_interval_seconds {
        config.snapshot_min_interval_seconds = v;
    }
    if let Some(v) = file.cache_capacity {
        config.cache_capacity = v;
    }
    if let Some(v) = file.budget_usd {
        config.budget_usd = Some(v);
    }
    if let Some(v) = &file.budget_alert_thresholds {
        config.budget_alert_thresholds = v.clone();
    }
    if let Some(v) = file.failure_threshold_per_hour {
        config.failure_threshold_per_hour = v;
    }
    if let Some(v) = file.max_recovery_attempts {
        config.max_recovery_attempts = v;
    }
    if let Some(v) = file.continue_on_error {
        config.continue_on_error = v;
    }
    if let Some(v) = file.enable_research {
        config.enable_research = v;
    }
    if let Some(v) = file.enable_mcp {
        config.enable_mcp = v;
    }
    if let Some(v) = file.enable_rules {
        config.enable_rules = v;
    }
}

fn apply_env(config: &mut EngineConfig) {
    if let Ok(v) = std::env::var("CLAUDE_CODE_LOG_LEVEL") {
        let _ = v; // consumed by logging init, not config; documented in SPEC_FULL §6.
    }
    if let Ok(v) = std::env::var("ORCHESTRATOR_STRATEGY") {
        config.strategy = v;
    }
    if let Ok(v) = std::env::var("ORCHESTRATOR_MAX_CONCURRENT_TASKS") {
        if let Ok(n) = v.parse() {
            config.max_concurrent_tasks = n;
        }
    }
    if let Ok(v) = std::env::var("ORCHESTRATOR_BUDGET_USD") {
        if let Ok(n) = v.parse() {
            config.budget_usd = Some(n);
        }
    }
}

fn apply_cli(config: &mut EngineConfig, cli: &CliOverrides) {
    if let Some(v) = &cli.strategy {
        config.strategy = v.clone();
    }
    if let Some(v) = cli.max_concurrent_tasks {
        config.max_concurrent_tasks = v;
    }
    if let Some(v) = cli.budget_usd {
        config.budget_usd = Some(v);
    }
    if let Some(v) = cli.continue_on_error {
        config.continue_on_error = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_spec() {
        let config = EngineConfig::default();
        assert_eq!(config.strategy, "dep");
        assert_eq!(config.max_concurrent_tasks, 5);
        assert_eq!(config.budget_alert_thresholds, vec![0.5, 0.75, 0.9, 1.0]);
    }

    #[test]
    fn cli_overrides_beat_file_which_beats_defaults() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".orchestrator")).unwrap();
        std::fs::write(
            dir.path().join(".orchestrator/config.toml"),
            "strategy = \"par\"\nmax_concurrent_tasks = 8\n",
        )
        .unwrap();

        let file_only = EngineConfig::resolve(dir.path(), None, &CliOverrides::default()).unwrap();
        assert_eq!(file_only.strategy, "par");
        assert_eq!(file_only.max_concurrent_tasks, 8);

        let cli = CliOverrides { strategy: Some("seq".to_string()), ..Default::default() };
        let with_cli = EngineConfig::resolve(dir.path(), None, &cli).unwrap();
        assert_eq!(with_cli.strategy, "seq");
        assert_eq!(with_cli.max_concurrent_tasks, 8);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::resolve(dir.path(), None, &CliOverrides::default()).unwrap();
        assert_eq!(config.strategy, "dep");
    }
}
