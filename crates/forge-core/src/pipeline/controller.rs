use std::sync::Arc;

use capability_registry::CapabilityRegistry;
use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use super::abort::AbortHandle;
use super::policy::ForgePolicy;
use crate::domain::{
    AbortReason, Approval, AttemptRecord, Candidate, ForgeOutcome, ForgeRequest, ForgeRun,
    ForgeStage, Requirement, ResearchBrief, ReviewVerdict, ValidationReport,
};
use crate::gateway::LanguageModel;
use crate::metrics::METRICS;
use crate::obs;
use crate::publisher::{self, Publisher};
use crate::stages::{Coder, LlmCoder, LlmResearcher, LlmReviewer, Researcher, Reviewer};
use crate::tester::{Sandbox, Tester, Validator};

/// The four generation/validation stages a [`Forge`] drives.
#[derive(Clone)]
pub struct ForgeStages {
    pub researcher: Arc<dyn Researcher>,
    pub coder: Arc<dyn Coder>,
    pub validator: Arc<dyn Validator>,
    pub reviewer: Arc<dyn Reviewer>,
}

impl ForgeStages {
    /// Language-model stages with a sandboxed five-level tester.
    pub fn from_model(
        model: Arc<dyn LanguageModel>,
        sandbox: Arc<dyn Sandbox>,
        policy: &ForgePolicy,
    ) -> Self {
        Self {
            researcher: Arc::new(LlmResearcher::new(Arc::clone(&model))),
            coder: Arc::new(LlmCoder::with_window(Arc::clone(&model), policy.feedback)),
            validator: Arc::new(Tester::new(sandbox)),
            reviewer: Arc::new(LlmReviewer::new(model)),
        }
    }
}

/// Controller states. Data produced by a stage rides on the state that
/// consumes it.
enum ForgeState {
    AwaitingApproval,
    Researching,
    Coding,
    Testing(Candidate),
    Reviewing(Candidate, ValidationReport),
    Publishing(Candidate),
    Done(ForgeOutcome),
}

impl ForgeState {
    fn stage(&self) -> ForgeStage {
        match self {
            ForgeState::AwaitingApproval => ForgeStage::AwaitingApproval,
            ForgeState::Researching => ForgeStage::Researching,
            ForgeState::Coding => ForgeStage::Coding,
            ForgeState::Testing(_) => ForgeStage::Testing,
            ForgeState::Reviewing(..) => ForgeStage::Reviewing,
            ForgeState::Publishing(_) => ForgeStage::Publishing,
            ForgeState::Done(_) => ForgeStage::Done,
        }
    }
}

/// Mutable bookkeeping for one run.
struct RunContext {
    run_id: String,
    requirement: Requirement,
    approval: Approval,
    brief: Option<ResearchBrief>,
    attempts: u32,
    history: Vec<AttemptRecord>,
    trace: Vec<ForgeStage>,
    last_candidate: Option<Candidate>,
    last_report: Option<ValidationReport>,
}

/// Drives forge runs.
///
/// A run always terminates: every failed attempt consumes budget, and
/// success paths only move forward.
#[derive(Clone)]
pub struct Forge {
    stages: ForgeStages,
    publisher: Publisher,
    policy: ForgePolicy,
}

impl Forge {
    pub fn new(stages: ForgeStages, publisher: Publisher, policy: ForgePolicy) -> Self {
        Self {
            stages,
            publisher,
            policy,
        }
    }

    /// Forge wired to a language model, a sandbox and a registry.
    pub fn from_model(
        model: Arc<dyn LanguageModel>,
        sandbox: Arc<dyn Sandbox>,
        registry: Arc<dyn CapabilityRegistry>,
        policy: ForgePolicy,
    ) -> Self {
        let stages = ForgeStages::from_model(model, sandbox, &policy);
        Self::new(stages, Publisher::new(registry), policy)
    }

    pub fn policy(&self) -> &ForgePolicy {
        &self.policy
    }

    pub async fn run(&self, request: ForgeRequest) -> ForgeRun {
        self.run_with_abort(request, &AbortHandle::new()).await
    }

    /// Run with an operator abort handle, checked before every transition.
    pub async fn run_with_abort(&self, request: ForgeRequest, abort: &AbortHandle) -> ForgeRun {
        let run_id = Uuid::new_v4();
        let span = obs::run_span(&run_id.to_string());
        self.drive(run_id, request, abort).instrument(span).await
    }

    async fn drive(&self, run_id: Uuid, request: ForgeRequest, abort: &AbortHandle) -> ForgeRun {
        let started_at = Utc::now();
        METRICS.inc_runs_started();
        obs::emit_forge_started(
            &run_id.to_string(),
            request.requirement.label(),
            self.policy.budget(),
        );

        let mut ctx = RunContext {
            run_id: run_id.to_string(),
            requirement: request.requirement,
            approval: request.approval,
            brief: None,
            attempts: 0,
            history: Vec::new(),
            trace: vec![ForgeStage::AwaitingApproval],
            last_candidate: None,
            last_report: None,
        };

        let mut state = ForgeState::AwaitingApproval;
        let outcome = loop {
            if let ForgeState::Done(outcome) = state {
                break outcome;
            }
            let from = state.stage();
            let next = match abort.request() {
                Some(req) => ForgeState::Done(ForgeOutcome::Aborted {
                    reason: AbortReason::Operator {
                        message: format!("{}: {}", req.operator, req.reason),
                    },
                }),
                None => self.step(state, &mut ctx).await,
            };
            let to = next.stage();
            obs::emit_transition(&ctx.run_id, from.as_str(), to.as_str(), ctx.attempts);
            ctx.trace.push(to);
            state = next;
        };

        match &outcome {
            ForgeOutcome::Success { .. } => METRICS.inc_published(),
            ForgeOutcome::Exhausted { .. } => METRICS.inc_exhausted(),
            ForgeOutcome::Aborted { .. } => METRICS.inc_aborted(),
        }

        let finished_at = Utc::now();
        let run = ForgeRun {
            run_id,
            requirement: ctx.requirement,
            outcome,
            attempts: ctx.attempts,
            history: ctx.history,
            trace: ctx.trace,
            brief: ctx.brief,
            final_candidate: ctx.last_candidate,
            final_report: ctx.last_report,
            started_at,
            finished_at,
        };
        obs::emit_forge_finished(
            &ctx.run_id,
            run.outcome.tag(),
            run.attempts,
            run.duration_ms().max(0) as u64,
        );
        run
    }

    /// Record a failed attempt and either retry at `retry` or exhaust.
    fn fail(&self, ctx: &mut RunContext, record: AttemptRecord, retry: ForgeState) -> ForgeState {
        obs::emit_attempt_failed(
            &ctx.run_id,
            record.attempt,
            record.stage.as_str(),
            &record.summary,
        );
        let summary = record.summary.clone();
        ctx.history.push(record);
        if ctx.attempts >= self.policy.budget() {
            return ForgeState::Done(ForgeOutcome::Exhausted {
                attempts: ctx.attempts,
                last_failure: Some(summary),
            });
        }
        ctx.attempts += 1;
        retry
    }

    async fn step(&self, state: ForgeState, ctx: &mut RunContext) -> ForgeState {
        match state {
            ForgeState::AwaitingApproval => {
                if ctx.approval.is_granted() {
                    ctx.attempts = 1;
                    ForgeState::Researching
                } else {
                    ForgeState::Done(ForgeOutcome::Aborted {
                        reason: AbortReason::ApprovalMissing,
                    })
                }
            }

            ForgeState::Researching => {
                if ctx.brief.is_some() {
                    return ForgeState::Coding;
                }
                let result = self.stages.researcher.research(&ctx.requirement).await;
                match result {
                    Ok(brief) => {
                        ctx.brief = Some(brief);
                        ForgeState::Coding
                    }
                    Err(e) => {
                        let record = AttemptRecord::new(
                            ctx.attempts,
                            ForgeStage::Researching,
                            format!("research failed: {e}"),
                        );
                        self.fail(ctx, record, ForgeState::Researching)
                    }
                }
            }

            ForgeState::Coding => {
                let Some(brief) = ctx.brief.as_ref() else {
                    return ForgeState::Researching;
                };
                let result = self
                    .stages
                    .coder
                    .write(brief, &ctx.history, ctx.attempts)
                    .await;
                match result {
                    Ok(candidate) => {
                        METRICS.inc_candidates();
                        ForgeState::Testing(candidate)
                    }
                    Err(e) => {
                        let record = AttemptRecord::new(
                            ctx.attempts,
                            ForgeStage::Coding,
                            format!("code generation failed: {e}"),
                        );
                        self.fail(ctx, record, ForgeState::Coding)
                    }
                }
            }

            ForgeState::Testing(candidate) => {
                let Some(brief) = ctx.brief.as_ref() else {
                    return ForgeState::Researching;
                };
                let report = match self.stages.validator.validate(&candidate, brief).await {
                    Ok(report) => report,
                    Err(e) => {
                        obs::emit_sandbox_unavailable(&ctx.run_id, ctx.attempts, &e);
                        return ForgeState::Done(ForgeOutcome::Aborted {
                            reason: AbortReason::SandboxUnavailable {
                                detail: e.to_string(),
                            },
                        });
                    }
                };
                ctx.last_candidate = Some(candidate.clone());
                ctx.last_report = Some(report.clone());
                if report.is_pass() {
                    return ForgeState::Reviewing(candidate, report);
                }
                METRICS.inc_validation_failures();
                let record = AttemptRecord::new(ctx.attempts, ForgeStage::Testing, report.summary())
                    .with_report(report);
                self.fail(ctx, record, ForgeState::Coding)
            }

            ForgeState::Reviewing(candidate, report) => {
                let Some(brief) = ctx.brief.as_ref() else {
                    return ForgeState::Researching;
                };
                let result = self
                    .stages
                    .reviewer
                    .review(&ctx.requirement, &candidate, brief, &report)
                    .await;
                let summary = match result {
                    Ok(ReviewVerdict::Approved) => return ForgeState::Publishing(candidate),
                    Ok(ReviewVerdict::Rejected { feedback }) => {
                        METRICS.inc_review_rejections();
                        format!("reviewer rejected the module: {}", feedback.join("; "))
                    }
                    Err(e) => format!("review failed: {e}"),
                };
                let record = AttemptRecord::new(ctx.attempts, ForgeStage::Reviewing, summary)
                    .with_candidate(&candidate);
                self.fail(ctx, record, ForgeState::Coding)
            }

            ForgeState::Publishing(candidate) => {
                let outcome = match self.publisher.publish(&candidate).await {
                    Ok(receipt) => ForgeOutcome::Success {
                        capability: receipt.name,
                        location: receipt.location,
                        attempts: ctx.attempts,
                    },
                    Err(e) => ForgeOutcome::Aborted {
                        reason: publisher::abort_reason(&candidate.type_name, e),
                    },
                };
                ForgeState::Done(outcome)
            }

            ForgeState::Done(outcome) => ForgeState::Done(outcome),
        }
    }
}
