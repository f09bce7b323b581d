//! Structured observability hooks for the forge run lifecycle.
//!
//! Every event carries an `event` field (`forge.started`,
//! `forge.transition`, `forge.attempt_failed`, `forge.sandbox_unavailable`,
//! `forge.finished`) plus the run id, so logs can be filtered per run.

use tracing::{error, info, warn};

/// Span that scopes all events of one run. Attach it with
/// `tracing::Instrument` so it survives across awaits.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("forge.run", run_id = %run_id)
}

pub fn emit_forge_started(run_id: &str, requirement: &str, max_attempts: u32) {
    info!(
        event = "forge.started",
        run_id = %run_id,
        requirement = %requirement,
        max_attempts = max_attempts,
    );
}

/// Emit event: controller moved between states.
pub fn emit_transition(run_id: &str, from: &str, to: &str, attempt: u32) {
    info!(
        event = "forge.transition",
        run_id = %run_id,
        from = %from,
        to = %to,
        attempt = attempt,
    );
}

/// Emit event: an attempt failed and will be retried or exhaust the run.
pub fn emit_attempt_failed(run_id: &str, attempt: u32, stage: &str, summary: &str) {
    warn!(
        event = "forge.attempt_failed",
        run_id = %run_id,
        attempt = attempt,
        stage = %stage,
        summary = %summary,
    );
}

pub fn emit_forge_finished(run_id: &str, outcome: &str, attempts: u32, duration_ms: u64) {
    info!(
        event = "forge.finished",
        run_id = %run_id,
        outcome = %outcome,
        attempts = attempts,
        duration_ms = duration_ms,
    );
}

/// Emit event: the validation sandbox failed on the host (error level).
pub fn emit_sandbox_unavailable(run_id: &str, attempt: u32, error: &dyn std::fmt::Display) {
    error!(
        event = "forge.sandbox_unavailable",
        run_id = %run_id,
        attempt = attempt,
        error = %error,
    );
}

/// Emit event: a run artifact could not be written (warning level).
pub fn emit_artifact_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "forge.artifact_error", run_id = %run_id, error = %error);
}
