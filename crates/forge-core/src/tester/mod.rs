//! Five-level candidate validation.
//!
//! Levels run in order and stop at the first failure:
//!
//! 1. syntax: the source parses
//! 2. load: static self-containment and security screen, then an isolated compile
//! 3. instantiation: `Default::default()` succeeds
//! 4. interface: every contract operation is overridden with the right shape
//! 5. behavioral: health check plus brief and candidate scenarios
//!
//! Levels 1, 2 (static half) and 4 are pure source analysis; the rest go
//! through a [`Sandbox`].

pub mod behavior;
pub mod cargo_sandbox;
pub mod interface;
pub mod load;
pub mod sandbox;
pub mod security;
pub mod syntax;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Candidate, ResearchBrief, ValidationLevel, ValidationReport};

pub use cargo_sandbox::{CargoSandbox, SandboxConfig};
pub use sandbox::{ExerciseReport, Sandbox, SandboxError, ScenarioRun};

/// The capability contract source, written into every sandbox scaffold and
/// shown to the coder.
pub const CONTRACT_SOURCE: &str = include_str!("../capability.rs");

/// Produces a [`ValidationReport`] for a candidate.
///
/// An `Err` means the sandbox host itself is broken; candidate defects are
/// always reported as a failed level.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        candidate: &Candidate,
        brief: &ResearchBrief,
    ) -> Result<ValidationReport, SandboxError>;
}

/// Outcome of one level.
type LevelOutcome = Result<Result<(), String>, SandboxError>;

/// Split a sandbox result into a level failure or a host failure.
fn sandbox_step<T>(result: Result<T, SandboxError>) -> Result<Result<T, String>, SandboxError> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e) if e.is_infrastructure() => Err(e),
        Err(e) => Ok(Err(e.to_string())),
    }
}

/// The standard five-level validator.
pub struct Tester {
    sandbox: Arc<dyn Sandbox>,
}

impl Tester {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }

    async fn run_level(
        &self,
        level: ValidationLevel,
        candidate: &Candidate,
        brief: &ResearchBrief,
        touched: &mut bool,
    ) -> LevelOutcome {
        match level {
            ValidationLevel::Syntax => Ok(syntax::check(candidate)),
            ValidationLevel::Load => {
                if let Err(detail) = load::check(candidate) {
                    return Ok(Err(detail));
                }
                *touched = true;
                sandbox_step(self.sandbox.load(candidate).await)
            }
            ValidationLevel::Instantiation => {
                sandbox_step(self.sandbox.instantiate(candidate).await)
            }
            ValidationLevel::Interface => Ok(interface::check(candidate)),
            ValidationLevel::Behavioral => {
                let scenarios = behavior::collect_scenarios(brief, candidate);
                match sandbox_step(self.sandbox.exercise(candidate, &scenarios).await)? {
                    Ok(report) => Ok(behavior::evaluate(&scenarios, &report)),
                    Err(detail) => Ok(Err(detail)),
                }
            }
        }
    }

    async fn run_levels(
        &self,
        candidate: &Candidate,
        brief: &ResearchBrief,
        touched: &mut bool,
    ) -> Result<ValidationReport, SandboxError> {
        for level in ValidationLevel::ALL {
            if let Err(detail) = self.run_level(level, candidate, brief, touched).await? {
                debug!(candidate = %candidate.short_digest(), %level, "validation stopped");
                return Ok(ValidationReport::failed_at(&candidate.digest, level, detail));
            }
        }
        Ok(ValidationReport::passed(&candidate.digest))
    }
}

#[async_trait]
impl Validator for Tester {
    async fn validate(
        &self,
        candidate: &Candidate,
        brief: &ResearchBrief,
    ) -> Result<ValidationReport, SandboxError> {
        let mut touched = false;
        let result = self.run_levels(candidate, brief, &mut touched).await;
        if touched {
            self.sandbox.release(candidate).await;
        }
        result
    }
}
