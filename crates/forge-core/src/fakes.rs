//! Scripted doubles for the gateway, sandbox and reviewer.
//!
//! Scripts are queues per role or step. Each call pops the front entry
//! except the last, which repeats for every later call.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::capability::{Command, CommandResponse, CommandStatus};
use crate::domain::{
    Candidate, GenerationError, Requirement, ResearchBrief, ReviewVerdict, Scenario,
    ValidationReport,
};
use crate::gateway::{LanguageModel, PromptRole, PromptVars};
use crate::stages::Reviewer;
use crate::tester::{ExerciseReport, Sandbox, SandboxError, ScenarioRun};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// A capability module that passes every static validation level.
pub fn sample_module(type_name: &str) -> String {
    format!(
        r#"use crate::capability::{{Capability, Command, CommandResponse, ResourceInfo}};

#[derive(Debug, Default)]
pub struct {type_name};

#[async_trait::async_trait]
impl Capability for {type_name} {{
    async fn execute_command(&self, command: &Command) -> CommandResponse {{
        CommandResponse::success(command, "done")
    }}

    async fn describe_resource(&self, _entity_id: &str) -> Option<ResourceInfo> {{
        None
    }}

    async fn discover_resources(&self) -> Vec<ResourceInfo> {{
        Vec::new()
    }}

    async fn health_check(&self) -> bool {{
        true
    }}
}}
"#
    )
}

#[derive(Default)]
struct GatewayState {
    scripts: HashMap<PromptRole, VecDeque<Result<String, GenerationError>>>,
    calls: Vec<(PromptRole, PromptVars)>,
}

/// [`LanguageModel`] that replays scripted outputs per role.
///
/// A role with nothing scripted returns [`GenerationError::EmptyOutput`].
#[derive(Default)]
pub struct ScriptedGateway {
    state: Mutex<GatewayState>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, role: PromptRole, text: impl Into<String>) -> Self {
        self.push(role, Ok(text.into()))
    }

    pub fn fail(self, role: PromptRole, err: GenerationError) -> Self {
        self.push(role, Err(err))
    }

    fn push(self, role: PromptRole, entry: Result<String, GenerationError>) -> Self {
        lock(&self.state)
            .scripts
            .entry(role)
            .or_default()
            .push_back(entry);
        self
    }

    /// Number of generations requested for `role`.
    pub fn calls(&self, role: PromptRole) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|(r, _)| *r == role)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.state).calls.len()
    }

    /// Variables of the most recent call for `role`.
    pub fn last_vars(&self, role: PromptRole) -> Option<PromptVars> {
        lock(&self.state)
            .calls
            .iter()
            .rev()
            .find(|(r, _)| *r == role)
            .map(|(_, vars)| vars.clone())
    }
}

#[async_trait]
impl LanguageModel for ScriptedGateway {
    async fn generate(&self, role: PromptRole, vars: &PromptVars) -> Result<String, GenerationError> {
        let mut state = lock(&self.state);
        state.calls.push((role, vars.clone()));
        state
            .scripts
            .get_mut(&role)
            .and_then(next_scripted)
            .unwrap_or_else(|| {
                Err(GenerationError::EmptyOutput {
                    role: role.to_string(),
                })
            })
    }
}

struct SandboxState {
    load: VecDeque<Result<(), SandboxError>>,
    instantiate: VecDeque<Result<(), SandboxError>>,
    exercise: VecDeque<Result<(), SandboxError>>,
    healthy: bool,
    load_calls: usize,
    instantiate_calls: usize,
    exercised: Vec<Vec<String>>,
    releases: usize,
}

/// [`Sandbox`] whose steps succeed unless scripted to fail.
///
/// A successful exercise answers every scenario with exactly what it
/// expects, so behavioral results depend only on the script.
pub struct ScriptedSandbox {
    state: Mutex<SandboxState>,
}

impl Default for ScriptedSandbox {
    fn default() -> Self {
        Self::passing()
    }
}

impl ScriptedSandbox {
    pub fn passing() -> Self {
        Self {
            state: Mutex::new(SandboxState {
                load: VecDeque::new(),
                instantiate: VecDeque::new(),
                exercise: VecDeque::new(),
                healthy: true,
                load_calls: 0,
                instantiate_calls: 0,
                exercised: Vec::new(),
                releases: 0,
            }),
        }
    }

    pub fn fail_load(self, err: SandboxError) -> Self {
        lock(&self.state).load.push_back(Err(err));
        self
    }

    pub fn pass_load(self) -> Self {
        lock(&self.state).load.push_back(Ok(()));
        self
    }

    pub fn fail_instantiate(self, err: SandboxError) -> Self {
        lock(&self.state).instantiate.push_back(Err(err));
        self
    }

    pub fn pass_instantiate(self) -> Self {
        lock(&self.state).instantiate.push_back(Ok(()));
        self
    }

    pub fn fail_exercise(self, err: SandboxError) -> Self {
        lock(&self.state).exercise.push_back(Err(err));
        self
    }

    /// Report `health_check() == false` on every exercise.
    pub fn unhealthy(self) -> Self {
        lock(&self.state).healthy = false;
        self
    }

    pub fn load_calls(&self) -> usize {
        lock(&self.state).load_calls
    }

    pub fn instantiate_calls(&self) -> usize {
        lock(&self.state).instantiate_calls
    }

    pub fn exercise_calls(&self) -> usize {
        lock(&self.state).exercised.len()
    }

    pub fn release_calls(&self) -> usize {
        lock(&self.state).releases
    }

    /// Scenario names of every exercise, in call order.
    pub fn exercised_scenarios(&self) -> Vec<Vec<String>> {
        lock(&self.state).exercised.clone()
    }
}

fn echo_response(command: &Command, scenario: &Scenario) -> CommandResponse {
    let message = scenario
        .expect
        .contains
        .clone()
        .unwrap_or_else(|| "ok".to_string());
    let mut response = match scenario.expect.status {
        CommandStatus::Error => CommandResponse::failure(command, message),
        _ => CommandResponse::success(command, message),
    };
    response.status = scenario.expect.status;
    response
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn load(&self, _candidate: &Candidate) -> Result<(), SandboxError> {
        let mut state = lock(&self.state);
        state.load_calls += 1;
        next_scripted(&mut state.load).unwrap_or(Ok(()))
    }

    async fn instantiate(&self, _candidate: &Candidate) -> Result<(), SandboxError> {
        let mut state = lock(&self.state);
        state.instantiate_calls += 1;
        next_scripted(&mut state.instantiate).unwrap_or(Ok(()))
    }

    async fn exercise(
        &self,
        _candidate: &Candidate,
        scenarios: &[Scenario],
    ) -> Result<ExerciseReport, SandboxError> {
        let mut state = lock(&self.state);
        state
            .exercised
            .push(scenarios.iter().map(|s| s.name.clone()).collect());
        next_scripted(&mut state.exercise).unwrap_or(Ok(()))?;
        Ok(ExerciseReport {
            healthy: state.healthy,
            runs: scenarios
                .iter()
                .map(|s| ScenarioRun {
                    scenario: s.name.clone(),
                    response: Some(echo_response(&s.command, s)),
                    panic: None,
                })
                .collect(),
        })
    }

    async fn release(&self, _candidate: &Candidate) {
        lock(&self.state).releases += 1;
    }
}

/// [`Reviewer`] that replays scripted verdicts. Approves when unscripted.
#[derive(Default)]
pub struct ScriptedReviewer {
    verdicts: Mutex<VecDeque<Result<ReviewVerdict, GenerationError>>>,
    calls: Mutex<usize>,
}

impl ScriptedReviewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, verdict: ReviewVerdict) -> Self {
        lock(&self.verdicts).push_back(Ok(verdict));
        self
    }

    pub fn then_fail(self, err: GenerationError) -> Self {
        lock(&self.verdicts).push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn review(
        &self,
        _requirement: &Requirement,
        _candidate: &Candidate,
        _brief: &ResearchBrief,
        _report: &ValidationReport,
    ) -> Result<ReviewVerdict, GenerationError> {
        *lock(&self.calls) += 1;
        next_scripted(&mut lock(&self.verdicts)).unwrap_or(Ok(ReviewVerdict::Approved))
    }
}
