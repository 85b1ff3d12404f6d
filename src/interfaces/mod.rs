//! External collaborator interfaces: `Generator`, `Researcher`, `FileSink`.
//! See SPEC_FULL.md §6. Modeled with `async-trait`, already a donor
//! dependency (`src/swarm`, `src/factory`).

mod file_sink;
mod generator;
mod researcher;

pub use file_sink::{FileSink, LocalFileSink};
pub use generator::{GeneratorResponse, GeneratorUsage, ProcessGenerator};
pub use researcher::{CompositeResearcher, NullResearcher, ResearchFindings, ResearchKind};

use crate::model::ExecutionContext;
use async_trait::async_trait;

/// Turns a prompt into generated code/text. The only component allowed to
/// perform outbound network or subprocess I/O on the engine's behalf.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, context: &ExecutionContext) -> anyhow::Result<GeneratorResponse>;
}

/// Answers a domain question for a phase's optional research-preparation
/// step (SPEC_FULL §4.6). Internals out of scope; shape grounded in the
/// donor's `research/` taxonomy (§2.1 of SPEC_FULL.md).
#[async_trait]
pub trait Researcher: Send + Sync {
    async fn research(
        &self,
        query: &str,
        kind: ResearchKind,
        context: &ExecutionContext,
    ) -> anyhow::Result<ResearchFindings>;
}
