//! Forge Core Library
//!
//! Staged synthesis of capability modules: an approval-gated
//! research → code → test → review → publish loop with a bounded repair
//! budget, plus the decision router that proposes forge runs.

pub mod artifact;
pub mod capability;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod gateway;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod publisher;
pub mod router;
pub mod stages;
pub mod telemetry;
pub mod tester;

pub use domain::{
    AbortReason, Approval, AttemptRecord, Candidate, Expectation, ForgeError, ForgeOutcome,
    ForgeRequest, ForgeRun, ForgeStage, GenerationError, LevelResult, Requirement, ResearchBrief,
    Result, ReviewVerdict, Scenario, ValidationFailure, ValidationLevel, ValidationReport,
};

pub use artifact::{list_run_artifacts, read_run_artifact, write_run_artifact, RetentionPolicy};
pub use capability::{
    Capability, Command, CommandResponse, CommandStatus, ResourceInfo, REQUIRED_OPERATIONS,
};
pub use config::ForgeConfig;
pub use gateway::{GatewayConfig, LanguageModel, OllamaGateway, PromptRole, PromptVars};
pub use pipeline::{AbortHandle, Forge, ForgePolicy, ForgeStages, DEFAULT_MAX_ATTEMPTS};
pub use publisher::{derive_identifier, Publisher};
pub use router::{
    tools_from_registry, Decision, DecisionRouter, ForgeProposal, RouterError, ToolDescriptor,
};
pub use stages::{Coder, FeedbackWindow, Researcher, Reviewer};
pub use tester::{CargoSandbox, Sandbox, SandboxConfig, SandboxError, Tester, Validator};

pub use capability_registry::{
    CapabilityName, CapabilityRegistry, FsCapabilityRegistry, InstallReceipt, RegistryError,
};
