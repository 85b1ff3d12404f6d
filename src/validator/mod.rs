//! Validator (C8): declarative checks over emitted artifacts and
//! project-level structure. See SPEC_FULL.md §4.8.

use crate::errors::ValidatorError;
use crate::model::ProjectSpec;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use walkdir::WalkDir;

/// Severity canonicalized to three levels (SPEC_FULL §4.8, resolving the
/// donor's open question on severity granularity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Syntax,
    Imports,
    Structure,
    Dependencies,
    Tests,
    Documentation,
}

impl std::fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckCategory::Syntax => "syntax",
            CheckCategory::Imports => "imports",
            CheckCategory::Structure => "structure",
            CheckCategory::Dependencies => "dependencies",
            CheckCategory::Tests => "tests",
            CheckCategory::Documentation => "documentation",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub category: CheckCategory,
    pub severity: Severity,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
}

impl ValidationIssue {
    pub fn new(category: CheckCategory, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub passed_checks: Vec<String>,
    pub failed_checks: Vec<String>,
    pub metrics: HashMap<String, serde_json::Value>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    fn record(&mut self, check_name: &str, issue: ValidationIssue) {
        self.failed_checks.push(check_name.to_string());
        match issue.severity {
            Severity::High => self.errors.push(issue),
            Severity::Medium | Severity::Low => self.warnings.push(issue),
        }
    }

    fn pass(&mut self, check_name: &str) {
        self.passed_checks.push(check_name.to_string());
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// File extensions whose syntax we can cheaply sanity-check without a real
/// parser: JSON and YAML via serde, everything else via balanced delimiters.
const BALANCED_DELIMITER_EXTENSIONS: &[&str] = &["rs", "ts", "tsx", "js", "jsx", "go", "java", "c", "cpp"];

pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Runs every check category over `output_dir`, guided by `project`.
    /// Never fails the caller on an individual check error; each failure is
    /// recorded in the returned report instead (SPEC_FULL §4.8).
    #[instrument(skip(self, project))]
    pub async fn validate(&self, project: &ProjectSpec, output_dir: &Path) -> Result<ValidationReport, ValidatorError> {
        let mut report = ValidationReport::default();

        self.check_syntax(output_dir, &mut report).await?;
        self.check_imports(output_dir, &mut report).await?;
        self.check_structure(project, output_dir, &mut report).await;
        self.check_dependencies(project, output_dir, &mut report).await;
        self.check_tests(project, output_dir, &mut report).await;
        self.check_documentation(output_dir, &mut report).await;

        report.metrics.insert("error_count".to_string(), serde_json::json!(report.errors.len()));
        report.metrics.insert("warning_count".to_string(), serde_json::json!(report.warnings.len()));
        info!(errors = report.errors.len(), warnings = report.warnings.len(), "validation complete");
        Ok(report)
    }

    async fn check_syntax(&self, output_dir: &Path, report: &mut ValidationReport) -> Result<(), ValidatorError> {
        if !output_dir.exists() {
            return Ok(());
        }
        let mut clean = true;
        for entry in WalkDir::new(output_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
            let contents = match tokio::fs::read_to_string(path).await {
                Ok(c) => c,
                Err(_) => continue,
            };
            let issue = match ext {
                "json" => serde_json::from_str::<serde_json::Value>(&contents)
                    .err()
                    .map(|e| ValidationIssue::new(CheckCategory::Syntax, Severity::High, format!("invalid JSON: {e}"))),
                "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(&contents)
                    .err()
                    .map(|e| ValidationIssue::new(CheckCategory::Syntax, Severity::High, format!("invalid YAML: {e}"))),
                ext if BALANCED_DELIMITER_EXTENSIONS.contains(&ext) => {
                    unbalanced_delimiter_line(&contents).map(|line| {
                        ValidationIssue::new(CheckCategory::Syntax, Severity::High, "unbalanced delimiters").at(path, Some(line))
                    })
                }
                _ => None,
            };
            if let Some(issue) = issue {
                clean = false;
                report.record("syntax", issue.at(path, None));
            }
        }
        if clean {
            report.pass("syntax");
        }
        Ok(())
    }

    async fn check_imports(&self, output_dir: &Path, report: &mut ValidationReport) -> Result<(), ValidatorError> {
        if !output_dir.exists() {
            return Ok(());
        }
        let rust_use = Regex::new(r"^\s*use\s+([a-zA-Z0-9_:]+)").unwrap();
        let mut clean = true;
        for entry in WalkDir::new(output_dir).into_iter().filter_map(|e| e.ok()) {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("rs") {
                continue;
            }
            let Ok(contents) = tokio::fs::read_to_string(entry.path()).await else { continue };
            for (lineno, line) in contents.lines().enumerate() {
                if let Some(caps) = rust_use.captures(line) {
                    let path = &caps[1];
                    if path.is_empty() || path.ends_with("::") {
                        clean = false;
                        report.record(
                            "imports",
                            ValidationIssue::new(CheckCategory::Imports, Severity::Medium, format!("malformed import '{path}'"))
                                .at(entry.path(), Some(lineno as u32 + 1)),
                        );
                    }
                }
            }
        }
        if clean {
            report.pass("imports");
        }
        Ok(())
    }

    async fn check_structure(&self, project: &ProjectSpec, output_dir: &Path, report: &mut ValidationReport) {
        let required: Vec<String> = project
            .metadata
            .get("required_paths")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let mut clean = true;
        for rel in &required {
            if !output_dir.join(rel).exists() {
                clean = false;
                report.record(
                    "structure",
                    ValidationIssue::new(CheckCategory::Structure, Severity::High, format!("required path '{rel}' is missing")),
                );
            }
        }
        if clean {
            report.pass("structure");
        }
    }

    async fn check_dependencies(&self, project: &ProjectSpec, output_dir: &Path, report: &mut ValidationReport) {
        let wants_rust = project.technologies.iter().any(|t| t.eq_ignore_ascii_case("rust"));
        let wants_node = project.technologies.iter().any(|t| t.eq_ignore_ascii_case("node") || t.eq_ignore_ascii_case("javascript") || t.eq_ignore_ascii_case("typescript"));

        let mut clean = true;
        if wants_rust && !output_dir.join("Cargo.toml").exists() {
            clean = false;
            report.record(
                "dependencies",
                ValidationIssue::new(CheckCategory::Dependencies, Severity::Medium, "technologies declare Rust but no Cargo.toml was emitted"),
            );
        }
        if wants_node && !output_dir.join("package.json").exists() {
            clean = false;
            report.record(
                "dependencies",
                ValidationIssue::new(CheckCategory::Dependencies, Severity::Medium, "technologies declare Node but no package.json was emitted"),
            );
        }
        if clean {
            report.pass("dependencies");
        }
    }

    async fn check_tests(&self, project: &ProjectSpec, output_dir: &Path, report: &mut ValidationReport) {
        let test_bearing = project
            .phases
            .iter()
            .any(|p| p.objective.to_lowercase().contains("test") || p.name.to_lowercase().contains("test"));
        if !test_bearing {
            report.pass("tests");
            return;
        }
        let has_tests = WalkDir::new(output_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| {
                let name = e.file_name().to_string_lossy();
                name.contains("test") || e.path().components().any(|c| c.as_os_str() == "tests")
            });
        if has_tests {
            report.pass("tests");
        } else {
            report.record(
                "tests",
                ValidationIssue::new(CheckCategory::Tests, Severity::Medium, "no test files found for a test-bearing phase"),
            );
        }
    }

    async fn check_documentation(&self, output_dir: &Path, report: &mut ValidationReport) {
        let has_readme = ["README.md", "README", "Readme.md"]
            .iter()
            .any(|name| output_dir.join(name).exists());
        if has_readme {
            report.pass("documentation");
        } else {
            report.record(
                "documentation",
                ValidationIssue::new(CheckCategory::Documentation, Severity::Low, "no README found"),
            );
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

fn unbalanced_delimiter_line(contents: &str) -> Option<u32> {
    let mut depth: i64 = 0;
    for (lineno, line) in contents.lines().enumerate() {
        for ch in line.chars() {
            match ch {
                '{' | '(' | '[' => depth += 1,
                '}' | ')' | ']' => depth -= 1,
            _ => {}
            }
            if depth < 0 {
                return Some(lineno as u32 + 1);
            }
        }
    }
    if depth != 0 {
        return Some(contents.lines().count() as u32);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn clean_project_passes_all_checks() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("README.md"), "# Demo").await.unwrap();
        let project = ProjectSpec::new("p1", "Demo");
        let report = Validator::new().validate(&project, dir.path()).await.unwrap();
        assert!(report.is_clean());
        assert!(report.passed_checks.contains(&"documentation".to_string()));
    }

    #[tokio::test]
    async fn missing_readme_is_low_severity_warning() {
        let dir = tempdir().unwrap();
        let project = ProjectSpec::new("p1", "Demo");
        let report = Validator::new().validate(&project, dir.path()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].severity, Severity::Low);
    }

    #[tokio::test]
    async fn invalid_json_is_high_severity_error() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("config.json"), "{ invalid").await.unwrap();
        let project = ProjectSpec::new("p1", "Demo");
        let report = Validator::new().validate(&project, dir.path()).await.unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.errors[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn missing_required_structure_is_high_severity() {
        let dir = tempdir().unwrap();
        let mut project = ProjectSpec::new("p1", "Demo");
        project.metadata.insert("required_paths".to_string(), serde_json::json!(["src/main.rs"]));
        let report = Validator::new().validate(&project, dir.path()).await.unwrap();
        assert!(!report.is_clean());
        assert!(report.errors.iter().any(|e| e.category == CheckCategory::Structure));
    }
}
