//! Level 5: the capability is healthy and satisfies its scenarios.

use crate::domain::{Candidate, ResearchBrief, Scenario};

use super::sandbox::{ExerciseReport, ScenarioRun};

/// Scenarios a candidate is exercised with: the brief's first, then the
/// candidate's own, skipping names already taken.
pub fn collect_scenarios(brief: &ResearchBrief, candidate: &Candidate) -> Vec<Scenario> {
    let mut scenarios = brief.scenarios.clone();
    for s in &candidate.scenarios {
        if !scenarios.iter().any(|existing| existing.name == s.name) {
            scenarios.push(s.clone());
        }
    }
    scenarios
}

fn render_response(run: &ScenarioRun) -> String {
    run.response
        .as_ref()
        .and_then(|r| serde_json::to_string(r).ok())
        .unwrap_or_default()
}

fn check_run(scenario: &Scenario, run: Option<&ScenarioRun>) -> Result<(), String> {
    let Some(run) = run else {
        return Err(format!("scenario `{}` was not run", scenario.name));
    };
    if let Some(panic) = &run.panic {
        return Err(format!("scenario `{}` panicked: {}", scenario.name, panic));
    }
    let Some(response) = &run.response else {
        return Err(format!("scenario `{}` produced no response", scenario.name));
    };
    if response.status != scenario.expect.status {
        let reason = response
            .error
            .as_deref()
            .or(response.message.as_deref())
            .unwrap_or("no message");
        return Err(format!(
            "scenario `{}` (action `{}`): expected status {}, got {} ({})",
            scenario.name, scenario.command.action, scenario.expect.status, response.status, reason
        ));
    }
    if let Some(expected) = &scenario.expect.contains {
        let rendered = render_response(run);
        if !rendered.contains(expected.as_str()) {
            return Err(format!(
                "scenario `{}` (action `{}`): expected response to contain {:?}, got {}",
                scenario.name, scenario.command.action, expected, rendered
            ));
        }
    }
    Ok(())
}

/// Judge an exercise report against the scenarios that produced it.
pub fn evaluate(scenarios: &[Scenario], report: &ExerciseReport) -> Result<(), String> {
    if !report.healthy {
        return Err("health check failed: health_check() returned false".to_string());
    }
    for scenario in scenarios {
        let run = report.runs.iter().find(|r| r.scenario == scenario.name);
        check_run(scenario, run)?;
    }
    Ok(())
}
