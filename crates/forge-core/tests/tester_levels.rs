//! Five-level validation against scripted sandboxes.

use std::sync::Arc;

use forge_core::fakes::{sample_module, ScriptedSandbox};
use forge_core::{
    Candidate, Command, CommandStatus, ResearchBrief, SandboxError, Scenario, Tester,
    ValidationLevel, ValidationReport, Validator,
};

const HEALTH_CHECK_BLOCK: &str = "    async fn health_check(&self) -> bool {\n        true\n    }\n";

fn candidate(source: impl Into<String>) -> Candidate {
    Candidate::new("Lamp", source, vec![], 1)
}

async fn validate(sandbox: &Arc<ScriptedSandbox>, candidate: &Candidate) -> ValidationReport {
    validate_with(sandbox, candidate, &ResearchBrief::default()).await
}

async fn validate_with(
    sandbox: &Arc<ScriptedSandbox>,
    candidate: &Candidate,
    brief: &ResearchBrief,
) -> ValidationReport {
    Tester::new(sandbox.clone())
        .validate(candidate, brief)
        .await
        .unwrap()
}

fn detail(report: &ValidationReport) -> &str {
    report
        .failure
        .as_ref()
        .map(|f| f.detail.as_str())
        .unwrap_or("")
}

#[tokio::test]
async fn syntax_error_stops_at_level_one() {
    let sandbox = Arc::new(ScriptedSandbox::passing());
    let report = validate(&sandbox, &candidate("pub struct Lamp;\nfn broken() -> { }\n")).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Syntax));
    assert_eq!(report.level_reached, 0);
    assert_eq!(report.levels.len(), 1);
    assert!(detail(&report).contains("syntax error at line"));
    assert_eq!(sandbox.load_calls(), 0);
}

#[tokio::test]
async fn foreign_crate_import_fails_load_without_compiling() {
    let sandbox = Arc::new(ScriptedSandbox::passing());
    let source = format!("use reqwest::Client;\n{}", sample_module("Lamp"));
    let report = validate(&sandbox, &candidate(source)).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Load));
    assert!(detail(&report).contains("reqwest"));
    assert_eq!(sandbox.load_calls(), 0);
}

#[tokio::test]
async fn out_of_line_module_fails_load() {
    let sandbox = Arc::new(ScriptedSandbox::passing());
    let source = format!("mod helpers;\n{}", sample_module("Lamp"));
    let report = validate(&sandbox, &candidate(source)).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Load));
    assert!(detail(&report).contains("mod helpers"));
}

#[tokio::test]
async fn compile_error_fails_load_with_diagnostics() {
    let sandbox = Arc::new(ScriptedSandbox::passing().fail_load(SandboxError::Build {
        step: "cargo check".to_string(),
        diagnostics: "error[E0308]: mismatched types".to_string(),
    }));
    let report = validate(&sandbox, &candidate(sample_module("Lamp"))).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Load));
    assert!(detail(&report).contains("E0308"));
    assert_eq!(sandbox.instantiate_calls(), 0);
}

#[tokio::test]
async fn construction_panic_fails_instantiation() {
    let sandbox = Arc::new(
        ScriptedSandbox::passing()
            .fail_instantiate(SandboxError::Panicked("missing LAMP_HOST".to_string())),
    );
    let report = validate(&sandbox, &candidate(sample_module("Lamp"))).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Instantiation));
    assert_eq!(report.level_reached, 2);
    assert!(detail(&report).contains("missing LAMP_HOST"));
    assert_eq!(sandbox.exercise_calls(), 0);
}

#[tokio::test]
async fn missing_operation_fails_interface_and_skips_behavior() {
    let sandbox = Arc::new(ScriptedSandbox::passing().unhealthy());
    let source = sample_module("Lamp").replace(HEALTH_CHECK_BLOCK, "");
    let report = validate(&sandbox, &candidate(source)).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Interface));
    assert_eq!(report.level_reached, 3);
    assert!(detail(&report).contains("health_check"));
    assert_eq!(sandbox.exercise_calls(), 0);
}

#[tokio::test]
async fn synchronous_operation_fails_interface() {
    let sandbox = Arc::new(ScriptedSandbox::passing());
    let source = sample_module("Lamp").replace("async fn discover_resources", "fn discover_resources");
    let report = validate(&sandbox, &candidate(source)).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Interface));
    assert!(detail(&report).contains("`discover_resources` must be async"));
}

#[tokio::test]
async fn unhealthy_capability_fails_behavior() {
    let sandbox = Arc::new(ScriptedSandbox::passing().unhealthy());
    let report = validate(&sandbox, &candidate(sample_module("Lamp"))).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Behavioral));
    assert_eq!(report.level_reached, 4);
    assert!(detail(&report).contains("health check failed"));
}

#[tokio::test]
async fn harness_failure_fails_behavior() {
    let sandbox = Arc::new(ScriptedSandbox::passing().fail_exercise(SandboxError::Timeout {
        step: "forge-harness".to_string(),
        seconds: 30,
    }));
    let report = validate(&sandbox, &candidate(sample_module("Lamp"))).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Behavioral));
    assert!(detail(&report).contains("timed out after 30s"));
}

#[tokio::test]
async fn brief_and_candidate_scenarios_are_merged_by_name() {
    let sandbox = Arc::new(ScriptedSandbox::passing());
    let brief = ResearchBrief {
        scenarios: vec![
            Scenario::new("turn_on", Command::new("turn_on", "lamp.kitchen")),
            Scenario::new("bad_action", Command::new("explode", "lamp.kitchen"))
                .expecting_status(CommandStatus::Error),
        ],
        ..ResearchBrief::default()
    };
    let own = vec![
        Scenario::new("turn_on", Command::new("turn_on", "lamp.hall")),
        Scenario::new("turn_off", Command::new("turn_off", "lamp.kitchen")).expecting("off"),
    ];
    let candidate = Candidate::new("Lamp", sample_module("Lamp"), own, 1);

    let report = validate_with(&sandbox, &candidate, &brief).await;

    assert!(report.is_pass(), "{}", report.summary());
    assert_eq!(report.level_reached, 5);
    assert_eq!(
        sandbox.exercised_scenarios(),
        vec![vec![
            "turn_on".to_string(),
            "bad_action".to_string(),
            "turn_off".to_string()
        ]]
    );
}

#[tokio::test]
async fn revalidating_unchanged_candidate_yields_identical_report() {
    let sandbox = Arc::new(ScriptedSandbox::passing().fail_load(SandboxError::Build {
        step: "cargo check".to_string(),
        diagnostics: "error: expected one of `;` or `}`".to_string(),
    }));
    let candidate = candidate(sample_module("Lamp"));

    let first = validate(&sandbox, &candidate).await;
    let second = validate(&sandbox, &candidate).await;

    assert_eq!(first, second);
    assert_eq!(first.candidate_digest, candidate.digest);
}

#[tokio::test]
async fn host_failures_are_errors_not_reports() {
    let candidate = candidate(sample_module("Lamp"));

    let sandbox = Arc::new(
        ScriptedSandbox::passing().fail_load(SandboxError::Unavailable("cannot run cargo".to_string())),
    );
    let err = Tester::new(sandbox.clone())
        .validate(&candidate, &ResearchBrief::default())
        .await
        .unwrap_err();
    assert!(err.is_infrastructure());
    assert_eq!(sandbox.instantiate_calls(), 0);

    let sandbox = Arc::new(ScriptedSandbox::passing().fail_instantiate(SandboxError::BuildTimeout {
        step: "building forge-instantiate".to_string(),
        seconds: 300,
    }));
    let err = Tester::new(sandbox)
        .validate(&candidate, &ResearchBrief::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::BuildTimeout { seconds: 300, .. }));
}

#[tokio::test]
async fn sandbox_is_released_once_per_validation_that_used_it() {
    let sandbox = Arc::new(ScriptedSandbox::passing());
    validate(&sandbox, &candidate("pub struct Lamp;\nfn broken() -> { }\n")).await;
    assert_eq!(sandbox.release_calls(), 0);
    validate(&sandbox, &candidate(sample_module("Lamp"))).await;
    assert_eq!(sandbox.release_calls(), 1);
    assert_eq!(sandbox.load_calls(), 1);

    let failing = Arc::new(
        ScriptedSandbox::passing().fail_load(SandboxError::Unavailable("disk full".to_string())),
    );
    let _ = Tester::new(failing.clone())
        .validate(&candidate(sample_module("Lamp")), &ResearchBrief::default())
        .await;
    assert_eq!(failing.release_calls(), 1);
}

#[tokio::test]
async fn grouped_forbidden_import_fails_load_before_sandbox() {
    let sandbox = Arc::new(ScriptedSandbox::passing());
    let source = format!("use std::{{fs, net::TcpStream}};\n{}", sample_module("Lamp"));
    let report = validate(&sandbox, &candidate(source)).await;

    assert_eq!(report.failing_level(), Some(ValidationLevel::Load));
    assert!(detail(&report).contains("touches the file system"));
    assert!(detail(&report).contains("opens network connections"));
    assert_eq!(sandbox.load_calls(), 0);
}
