//! The Researcher interface, a closed `ResearchKind` vocabulary, and the
//! trivial default implementations (SPEC_FULL.md §2.1, §6).

use super::Researcher;
use crate::model::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Named specialist angles, mirroring the donor's `research/` package
/// (`solutions-architect`, `security-specialist`, etc.) collapsed to a
/// closed enum since their internal judgment is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchKind {
    SolutionsArchitecture,
    Security,
    Performance,
    Devops,
    QualityAssurance,
    Technology,
    BestPractices,
    Custom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchFindings {
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub sources: Vec<String>,
    pub confidence: f64,
}

/// Always returns empty findings. Used when research preparation is
/// disabled or no researcher is configured.
pub struct NullResearcher;

#[async_trait]
impl Researcher for NullResearcher {
    async fn research(&self, _query: &str, _kind: ResearchKind, _context: &ExecutionContext) -> anyhow::Result<ResearchFindings> {
        Ok(ResearchFindings::default())
    }
}

/// Fans a query out to several researchers and concatenates their findings.
pub struct CompositeResearcher {
    researchers: Vec<Box<dyn Researcher>>,
}

impl CompositeResearcher {
    pub fn new(researchers: Vec<Box<dyn Researcher>>) -> Self {
        Self { researchers }
    }
}

#[async_trait]
impl Researcher for CompositeResearcher {
    async fn research(&self, query: &str, kind: ResearchKind, context: &ExecutionContext) -> anyhow::Result<ResearchFindings> {
        let mut combined = ResearchFindings::default();
        let mut confidences = Vec::new();
        for researcher in &self.researchers {
            match researcher.research(query, kind, context).await {
                Ok(result) => {
                    combined.findings.extend(result.findings);
                    combined.recommendations.extend(result.recommendations);
                    combined.sources.extend(result.sources);
                    confidences.push(result.confidence);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "researcher failed, continuing with remaining researchers");
                }
            }
        }
        combined.confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn null_researcher_returns_empty_findings() {
        let ctx = ExecutionContext::new("e", "p", PathBuf::from("/tmp"));
        let result = NullResearcher.research("q", ResearchKind::Security, &ctx).await.unwrap();
        assert!(result.findings.is_empty());
    }

    #[tokio::test]
    async fn composite_researcher_continues_past_a_failing_member() {
        struct Failing;
        #[async_trait]
        impl Researcher for Failing {
            async fn research(&self, _: &str, _: ResearchKind, _: &ExecutionContext) -> anyhow::Result<ResearchFindings> {
                anyhow::bail!("boom")
            }
        }
        let ctx = ExecutionContext::new("e", "p", PathBuf::from("/tmp"));
        let composite = CompositeResearcher::new(vec![Box::new(Failing), Box::new(NullResearcher)]);
        let result = composite.research("q", ResearchKind::Security, &ctx).await.unwrap();
        assert_eq!(result.confidence, 0.0);
    }
}
