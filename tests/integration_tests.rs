//! Integration tests for the build orchestrator CLI.
//!
//! These exercise the `forge` binary end-to-end: spec loading, dry-run
//! planning, validation, and durable state export/import.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn forge() -> Command {
    cargo_bin_cmd!("forge")
}

fn write_spec(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const MINIMAL_SPEC: &str = r#"{
  "config": { "id": "demo", "name": "Demo Project", "version": "0.1.0", "description": "" },
  "phases": [
    {
      "id": "setup",
      "name": "Setup",
      "objective": "lay groundwork",
      "tasks": [
        {
          "id": "write-readme",
          "name": "Write README",
          "description": "",
          "kind": { "kind": "analysis" }
        }
      ]
    }
  ]
}"#;

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        forge().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        forge().arg("--version").assert().success();
    }

    #[test]
    fn test_build_requires_subcommand_args() {
        forge().arg("build").assert().failure();
    }
}

// =============================================================================
// Plan / Dry-run Tests
// =============================================================================

mod planning {
    use super::*;

    #[test]
    fn test_plan_prints_phase_and_task_tree() {
        let dir = TempDir::new().unwrap();
        let spec = write_spec(&dir, "spec.json", MINIMAL_SPEC);

        forge()
            .arg("plan")
            .arg(&spec)
            .assert()
            .success()
            .stdout(predicate::str::contains("demo"))
            .stdout(predicate::str::contains("setup"))
            .stdout(predicate::str::contains("write-readme"));
    }

    #[test]
    fn test_build_dry_run_matches_plan_output() {
        let dir = TempDir::new().unwrap();
        let spec = write_spec(&dir, "spec.json", MINIMAL_SPEC);

        forge()
            .current_dir(dir.path())
            .arg("build")
            .arg(&spec)
            .arg("--dry-run")
            .assert()
            .success()
            .stdout(predicate::str::contains("write-readme"));
    }

    #[test]
    fn test_plan_invalid_spec_exits_2() {
        let dir = TempDir::new().unwrap();
        let spec = write_spec(&dir, "bad.json", "{ not json");

        forge()
            .arg("plan")
            .arg(&spec)
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("invalid project spec"));
    }

    #[test]
    fn test_build_missing_spec_file_exits_2() {
        let dir = TempDir::new().unwrap();

        forge()
            .current_dir(dir.path())
            .arg("build")
            .arg(dir.path().join("does-not-exist.json"))
            .assert()
            .failure()
            .code(2);
    }

    #[test]
    fn test_plan_accepts_yaml_spec() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
config:
  id: demo
  name: Demo Project
phases: []
"#;
        let spec = write_spec(&dir, "spec.yaml", yaml);

        forge()
            .arg("plan")
            .arg(&spec)
            .assert()
            .success()
            .stdout(predicate::str::contains("demo"));
    }
}

// =============================================================================
// Validate Tests
// =============================================================================

mod validate {
    use super::*;

    #[test]
    fn test_validate_empty_output_dir_is_clean_with_warnings() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("output");
        fs::create_dir_all(&output).unwrap();

        forge()
            .arg("validate")
            .arg(&output)
            .assert()
            .success()
            .stdout(predicate::str::contains("errors: 0"));
    }

    #[test]
    fn test_validate_reports_invalid_json() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("output");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("config.json"), "{ broken").unwrap();

        forge()
            .arg("validate")
            .arg(&output)
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains("syntax"));
    }
}

// =============================================================================
// State Export / Import Tests
// =============================================================================

mod state {
    use super::*;

    #[test]
    fn test_state_export_then_import_round_trips() {
        let dir = TempDir::new().unwrap();
        let export_path = dir.path().join("snapshot.json");

        forge()
            .current_dir(dir.path())
            .arg("state")
            .arg("export")
            .arg("build-does-not-exist")
            .arg(&export_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("exported build-does-not-exist"));

        assert!(export_path.exists());

        forge()
            .current_dir(dir.path())
            .arg("state")
            .arg("import")
            .arg(&export_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("imported execution build-does-not-exist"));
    }

    #[test]
    fn test_state_import_missing_file_fails() {
        let dir = TempDir::new().unwrap();

        forge()
            .current_dir(dir.path())
            .arg("state")
            .arg("import")
            .arg(dir.path().join("nope.json"))
            .assert()
            .failure();
    }
}

// =============================================================================
// Resume Tests
// =============================================================================

mod resume {
    use super::*;

    #[test]
    fn test_resume_unknown_execution_exits_2() {
        let dir = TempDir::new().unwrap();

        forge()
            .current_dir(dir.path())
            .arg("resume")
            .arg("build-never-started")
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("no saved state"));
    }
}

// =============================================================================
// Global Flag Tests
// =============================================================================

mod global_flags {
    use super::*;

    #[test]
    fn test_project_dir_flag_is_accepted() {
        let dir = TempDir::new().unwrap();
        let other_dir = TempDir::new().unwrap();
        let spec = write_spec(&dir, "spec.json", MINIMAL_SPEC);

        forge()
            .current_dir(other_dir.path())
            .arg("--project-dir")
            .arg(dir.path())
            .arg("build")
            .arg(&spec)
            .arg("--dry-run")
            .assert()
            .success();
    }
}
