//! Forge stages: researcher, coder and reviewer.
//!
//! Each stage is a trait so the controller can be driven by scripted
//! doubles in tests; the `Llm*` implementations go through a
//! [`LanguageModel`](crate::gateway::LanguageModel).

pub mod coder;
pub mod extract;
pub mod researcher;
pub mod reviewer;

use async_trait::async_trait;

use crate::domain::{
    AttemptRecord, Candidate, GenerationError, Requirement, ResearchBrief, ReviewVerdict,
    ValidationReport,
};

pub use coder::{render_feedback, FeedbackWindow, LlmCoder};
pub use researcher::LlmResearcher;
pub use reviewer::{security_findings, LlmReviewer};

/// Turns a requirement into a research brief.
#[async_trait]
pub trait Researcher: Send + Sync {
    async fn research(&self, requirement: &Requirement) -> Result<ResearchBrief, GenerationError>;
}

/// Writes a candidate module from the brief and recent failures.
#[async_trait]
pub trait Coder: Send + Sync {
    /// `history` holds every failed attempt so far, oldest first.
    /// Implementations bound how much of it they use.
    async fn write(
        &self,
        brief: &ResearchBrief,
        history: &[AttemptRecord],
        attempt: u32,
    ) -> Result<Candidate, GenerationError>;
}

/// Qualitative review of a candidate that passed validation.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        requirement: &Requirement,
        candidate: &Candidate,
        brief: &ResearchBrief,
        report: &ValidationReport,
    ) -> Result<ReviewVerdict, GenerationError>;
}
