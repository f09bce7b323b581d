//! Domain models for Forge.
//!
//! Canonical definitions for the entities a forge run passes between stages:
//! - `Requirement` / `ForgeRequest`: what to build and whether it is approved
//! - `ResearchBrief`: the researcher's plan, produced once per run
//! - `Candidate`: one generated capability module with its test scenarios
//! - `ValidationReport`: the tester's graded verdict on a candidate
//! - `ForgeRun` / `ForgeOutcome`: the terminal record of a run

pub mod candidate;
pub mod error;
pub mod outcome;
pub mod report;
pub mod request;

pub use candidate::{Candidate, Expectation, ResearchBrief, Scenario};
pub use error::{ForgeError, GenerationError, Result};
pub use outcome::{AbortReason, AttemptRecord, ForgeOutcome, ForgeRun, ForgeStage, ReviewVerdict};
pub use report::{LevelResult, ValidationFailure, ValidationLevel, ValidationReport};
pub use request::{Approval, ForgeRequest, Requirement};
