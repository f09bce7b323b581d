//! Observability tests for the forge run lifecycle.
//!
//! Event contents are asserted in the `obs` unit tests; these check that the
//! hooks and counters behave when driven from outside the crate.

use std::sync::Arc;

use capability_registry::fakes::MemoryCapabilityRegistry;
use forge_core::fakes::{sample_module, ScriptedGateway, ScriptedSandbox};
use forge_core::metrics::METRICS;
use forge_core::obs::{
    emit_artifact_error, emit_attempt_failed, emit_forge_finished, emit_forge_started,
    emit_transition, run_span,
};
use forge_core::{Forge, ForgePolicy, ForgeRequest, PromptRole, Requirement};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_lifecycle_hooks_do_not_panic() {
    let span = run_span("run-obs-1");
    let _guard = span.enter();
    emit_forge_started("run-obs-1", "toggle lamps", 5);
    emit_transition("run-obs-1", "awaiting_approval", "researching", 1);
    emit_attempt_failed("run-obs-1", 1, "testing", "failed at level 4 (interface)");
    emit_forge_finished("run-obs-1", "exhausted", 5, 1200);
}

#[traced_test]
#[test]
fn test_artifact_error_accepts_any_display() {
    let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
    emit_artifact_error("run-obs-2", &err);
}

#[tokio::test]
async fn test_successful_run_moves_counters() {
    let started = METRICS.runs_started();
    let published = METRICS.capabilities_published();
    let candidates = METRICS.candidates_generated();

    let gateway = ScriptedGateway::new()
        .respond(PromptRole::Researcher, "Toggle the lamp state.")
        .respond(PromptRole::Coder, sample_module("Lamp"))
        .respond(PromptRole::Reviewer, "APPROVED");
    let forge = Forge::from_model(
        Arc::new(gateway),
        Arc::new(ScriptedSandbox::passing()),
        Arc::new(MemoryCapabilityRegistry::new()),
        ForgePolicy::default(),
    );
    let request = ForgeRequest::approved(Requirement::new("toggle lamps").unwrap(), "ops");
    let run = forge.run(request).await;
    assert!(run.outcome.is_success(), "{:?}", run.outcome);

    // Counters are process-wide and other tests run concurrently.
    assert!(METRICS.runs_started() > started);
    assert!(METRICS.capabilities_published() > published);
    assert!(METRICS.candidates_generated() > candidates);
    METRICS.flush();
}
