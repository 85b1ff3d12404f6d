//! The project specification: the declarative input to a build.

use super::phase::Phase;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

/// Ordered list of phases plus metadata. Phase declaration order is the
/// default execution order; cross-phase dependencies, if declared via
/// `Phase::required_capabilities`-adjacent metadata, must form a DAG (the
/// phase executor validates this at plan time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub config: ProjectConfig,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Mirrors the top-level execution status once planning starts.
    #[serde(default)]
    pub status: Option<String>,
}

impl ProjectSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            config: ProjectConfig {
                id: id.into(),
                name: name.into(),
                version: "0.1.0".to_string(),
                description: String::new(),
            },
            phases: Vec::new(),
            technologies: Vec::new(),
            features: Vec::new(),
            metadata: HashMap::new(),
            status: None,
        }
    }

    pub fn with_phases(mut self, phases: Vec<Phase>) -> Self {
        self.phases = phases;
        self
    }

    pub fn phase_by_id(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn phase_index(&self, id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.id == id)
    }

    /// Overall project progress: arithmetic mean of phase progress
    /// (SPEC_FULL §8 universal invariant).
    pub fn progress(&self) -> f64 {
        if self.phases.is_empty() {
            return 100.0;
        }
        let sum: f64 = self.phases.iter().map(|p| p.progress()).sum();
        sum / self.phases.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_progress_is_mean_of_phases() {
        let p1 = Phase::new("p1", "A", "obj");
        let p2 = Phase::new("p2", "B", "obj");
        let spec = ProjectSpec::new("proj", "Demo").with_phases(vec![p1, p2]);
        assert_eq!(spec.progress(), 100.0);
    }
}
