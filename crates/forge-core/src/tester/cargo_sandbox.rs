//! Sandbox that compiles and runs candidates as throwaway cargo packages.
//!
//! Each candidate gets a scaffold directory keyed by its digest:
//!
//! ```text
//! <root>/<digest12>/
//!   Cargo.toml          standalone package `forge-candidate`
//!   src/lib.rs          `pub mod capability; pub mod candidate;`
//!   src/capability.rs   the contract
//!   src/candidate.rs    the candidate source, verbatim
//!   src/instantiate.rs  `forge-instantiate-<digest12>` binary, needs only `Default`
//!   src/main.rs         `forge-harness-<digest12>` binary, drives the contract
//!   scenarios.json      written before each exercise
//! <root>/target/        shared by every scaffold so dependencies build once
//! ```
//!
//! Binary names carry the digest so scaffolds sharing one target dir never
//! overwrite each other's executables. A scaffold and its binaries are
//! removed when the last validation using it is released.
//!
//! Every cargo and harness invocation runs as a child process with a
//! timeout, so a hanging or crashing candidate cannot take the forge down.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::sandbox::{ExerciseReport, Sandbox, SandboxError};
use super::CONTRACT_SOURCE;
use crate::domain::{Candidate, Scenario};

const HARNESS_BIN: &str = "forge-harness";
const INSTANTIATE_BIN: &str = "forge-instantiate";
const RUN_STEP: &str = "running the harness";
const MAX_DIAGNOSTIC_LINES: usize = 20;
/// Exit code the harness uses when constructing the capability panics.
const PANIC_EXIT_CODE: i32 = 3;

const SCAFFOLD_MANIFEST: &str = r#"[package]
name = "forge-candidate"
version = "0.0.0"
edition = "2021"
publish = false

[lib]
path = "src/lib.rs"

[[bin]]
name = "__INSTANTIATE_BIN__"
path = "src/instantiate.rs"

[[bin]]
name = "__HARNESS_BIN__"
path = "src/main.rs"

[dependencies]
async-trait = "0.1"
serde = { version = "1", features = ["derive"] }
serde_json = "1"
tokio = { version = "1", features = ["rt"] }

[workspace]
"#;

const SCAFFOLD_LIB: &str = "#![allow(dead_code, unused_imports, unused_variables)]\n\npub mod capability;\npub mod candidate;\n";

const INSTANTIATE_TEMPLATE: &str = r####"use std::panic::catch_unwind;

use forge_candidate::candidate::__CAPABILITY_TYPE__ as Subject;

fn main() {
    std::panic::set_hook(Box::new(|_| {}));
    match catch_unwind(|| <Subject as Default>::default()) {
        Ok(_subject) => println!("{{\"constructed\":true}}"),
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            };
            eprintln!("{}", message);
            std::process::exit(__PANIC_EXIT_CODE__);
        }
    }
}
"####;

const HARNESS_TEMPLATE: &str = r####"use std::panic::{catch_unwind, AssertUnwindSafe};

use forge_candidate::candidate::__CAPABILITY_TYPE__ as Subject;
use forge_candidate::capability::{Capability, Command};

#[derive(serde::Deserialize)]
struct ScenarioInput {
    name: String,
    command: Command,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn construct() -> Subject {
    match catch_unwind(|| <Subject as Default>::default()) {
        Ok(subject) => subject,
        Err(payload) => {
            eprintln!("{}", panic_message(payload));
            std::process::exit(__PANIC_EXIT_CODE__);
        }
    }
}

fn exercise(path: &str) -> Result<serde_json::Value, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let scenarios: Vec<ScenarioInput> = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| e.to_string())?;
    let subject = construct();

    let healthy = catch_unwind(AssertUnwindSafe(|| runtime.block_on(subject.health_check())))
        .unwrap_or(false);
    let mut runs = Vec::new();
    for scenario in &scenarios {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            runtime.block_on(subject.execute_command(&scenario.command))
        }));
        runs.push(match outcome {
            Ok(response) => serde_json::json!({ "scenario": scenario.name, "response": response }),
            Err(payload) => {
                serde_json::json!({ "scenario": scenario.name, "panic": panic_message(payload) })
            }
        });
    }
    Ok(serde_json::json!({ "healthy": healthy, "runs": runs }))
}

fn main() {
    std::panic::set_hook(Box::new(|_| {}));
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("exercise") => {
            let Some(path) = args.get(2) else {
                eprintln!("missing scenario file");
                std::process::exit(2);
            };
            match exercise(path) {
                Ok(report) => println!("{}", report),
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(2);
                }
            }
        }
        _ => {
            eprintln!("usage: forge-harness exercise <scenarios.json>");
            std::process::exit(2);
        }
    }
}
"####;

/// Settings for [`CargoSandbox`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Scaffold root; a temp dir when unset.
    pub work_dir: Option<PathBuf>,
    /// Cargo executable.
    pub cargo: String,
    /// Target dir shared by all scaffolds; `<root>/target` when unset.
    pub shared_target_dir: Option<PathBuf>,
    /// Leave scaffolds on disk after validation, for debugging.
    pub keep_scaffolds: bool,
    pub offline: bool,
    pub build_timeout_secs: u64,
    pub run_timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            cargo: std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()),
            shared_target_dir: None,
            keep_scaffolds: false,
            offline: false,
            build_timeout_secs: 300,
            run_timeout_secs: 30,
        }
    }
}

/// Result of one child-process step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub step: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl StepOutput {
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Error and location lines from cargo output, falling back to its tail.
pub fn extract_diagnostics(stderr: &str) -> String {
    let picked: Vec<&str> = stderr
        .lines()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("error") || t.starts_with("-->") || l.contains(": error")
        })
        .take(MAX_DIAGNOSTIC_LINES)
        .collect();
    if !picked.is_empty() {
        return picked.join("\n");
    }
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(MAX_DIAGNOSTIC_LINES);
    lines[start..].join("\n")
}

/// [`Sandbox`] that builds candidates with cargo.
pub struct CargoSandbox {
    config: SandboxConfig,
    root: PathBuf,
    /// Validations in flight per scaffold, keyed by short digest.
    active: Mutex<HashMap<String, usize>>,
    _temp: Option<TempDir>,
}

fn bin_name(bin: &str, candidate: &Candidate) -> String {
    format!("{bin}-{}", candidate.short_digest())
}

impl CargoSandbox {
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        let (root, temp) = match &config.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    SandboxError::Unavailable(format!("cannot create {}: {e}", dir.display()))
                })?;
                (dir.clone(), None)
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("forge-sandbox-")
                    .tempdir()
                    .map_err(|e| SandboxError::Unavailable(format!("cannot create temp dir: {e}")))?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };
        Ok(Self {
            config,
            root,
            active: Mutex::new(HashMap::new()),
            _temp: temp,
        })
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scaffold directory for a candidate.
    pub fn scaffold_dir(&self, candidate: &Candidate) -> PathBuf {
        self.root.join(candidate.short_digest())
    }

    /// Cargo target dir used for every scaffold.
    pub fn target_dir(&self) -> PathBuf {
        self.config
            .shared_target_dir
            .clone()
            .unwrap_or_else(|| self.root.join("target"))
    }

    /// Path of a built scaffold binary.
    pub fn bin_path(&self, bin: &str, candidate: &Candidate) -> PathBuf {
        self.target_dir().join("debug").join(format!(
            "{}{}",
            bin_name(bin, candidate),
            std::env::consts::EXE_SUFFIX
        ))
    }

    /// Delete the scaffold and the candidate's binaries from the shared
    /// target dir. Dependencies stay cached.
    fn remove_scaffold(&self, candidate: &Candidate) {
        let dir = self.scaffold_dir(candidate);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => debug!(scaffold = %dir.display(), "scaffold removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(scaffold = %dir.display(), error = %e, "cannot remove scaffold"),
        }

        let prefixes: Vec<String> = [HARNESS_BIN, INSTANTIATE_BIN]
            .iter()
            .flat_map(|bin| {
                let name = bin_name(bin, candidate);
                let crate_name = name.replace('-', "_");
                [name, crate_name]
            })
            .collect();
        let debug_dir = self.target_dir().join("debug");
        for sub in ["", "deps", "incremental"] {
            let Ok(entries) = std::fs::read_dir(debug_dir.join(sub)) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if !prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                    continue;
                }
                let path = entry.path();
                let removed = if path.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                if let Err(e) = removed {
                    warn!(path = %path.display(), error = %e, "cannot remove build artifact");
                }
            }
        }
    }

    /// Write the scaffold for `candidate`. Rewriting is idempotent.
    pub fn prepare(&self, candidate: &Candidate) -> Result<PathBuf, SandboxError> {
        let dir = self.scaffold_dir(candidate);
        let src = dir.join("src");
        let io_err = |e: std::io::Error| {
            SandboxError::Unavailable(format!("cannot write scaffold {}: {e}", dir.display()))
        };
        std::fs::create_dir_all(&src).map_err(io_err)?;
        std::fs::write(dir.join("Cargo.toml"), render_manifest(candidate)).map_err(io_err)?;
        std::fs::write(src.join("lib.rs"), SCAFFOLD_LIB).map_err(io_err)?;
        std::fs::write(src.join("capability.rs"), CONTRACT_SOURCE).map_err(io_err)?;
        std::fs::write(src.join("candidate.rs"), &candidate.source).map_err(io_err)?;
        std::fs::write(
            src.join("instantiate.rs"),
            render_template(INSTANTIATE_TEMPLATE, &candidate.type_name),
        )
        .map_err(io_err)?;
        std::fs::write(
            src.join("main.rs"),
            render_template(HARNESS_TEMPLATE, &candidate.type_name),
        )
        .map_err(io_err)?;
        debug!(scaffold = %dir.display(), "scaffold prepared");
        Ok(dir)
    }

    async fn run_step(
        &self,
        step: &str,
        program: &Path,
        args: &[&str],
        cwd: &Path,
        timeout_secs: u64,
    ) -> Result<StepOutput, SandboxError> {
        let start = Instant::now();
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env("CARGO_TARGET_DIR", self.target_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SandboxError::Unavailable(format!("cannot run {}: {e}", program.display()))
            })?;

        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| SandboxError::Timeout {
                step: step.to_string(),
                seconds: timeout_secs,
            })?
            .map_err(|e| SandboxError::Unavailable(format!("{step}: {e}")))?;

        let result = StepOutput {
            step: step.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: output.status.success(),
        };
        debug!(
            step,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "sandbox step finished"
        );
        Ok(result)
    }

    async fn cargo(&self, step: &str, scaffold: &Path, args: &[&str]) -> Result<(), SandboxError> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["--quiet", "--message-format", "short"]);
        if self.config.offline {
            full.push("--offline");
        }
        let out = self
            .run_step(
                step,
                Path::new(&self.config.cargo),
                &full,
                scaffold,
                self.config.build_timeout_secs,
            )
            .await
            .map_err(|e| match e {
                SandboxError::Timeout { step, seconds } => SandboxError::BuildTimeout { step, seconds },
                other => other,
            })?;
        if out.passed() {
            Ok(())
        } else {
            Err(SandboxError::Build {
                step: step.to_string(),
                diagnostics: extract_diagnostics(&out.stderr),
            })
        }
    }

    async fn build_bin(
        &self,
        scaffold: &Path,
        bin: &str,
        candidate: &Candidate,
    ) -> Result<PathBuf, SandboxError> {
        let name = bin_name(bin, candidate);
        let step = format!("building {bin}");
        self.cargo(&step, scaffold, &["build", "--bin", &name]).await?;
        Ok(self.bin_path(bin, candidate))
    }

    async fn run_bin(
        &self,
        scaffold: &Path,
        bin: &Path,
        args: &[&str],
    ) -> Result<StepOutput, SandboxError> {
        let out = self
            .run_step(
                RUN_STEP,
                bin,
                args,
                scaffold,
                self.config.run_timeout_secs,
            )
            .await?;
        if out.passed() {
            return Ok(out);
        }
        let stderr = out.stderr.trim().to_string();
        if out.exit_code == PANIC_EXIT_CODE {
            Err(SandboxError::Panicked(stderr))
        } else {
            Err(SandboxError::Harness {
                code: out.exit_code,
                stderr,
            })
        }
    }
}

/// Scaffold manifest with digest-suffixed binary names.
fn render_manifest(candidate: &Candidate) -> String {
    SCAFFOLD_MANIFEST
        .replace("__INSTANTIATE_BIN__", &bin_name(INSTANTIATE_BIN, candidate))
        .replace("__HARNESS_BIN__", &bin_name(HARNESS_BIN, candidate))
}

/// Binary source for a capability type.
fn render_template(template: &str, type_name: &str) -> String {
    template
        .replace("__CAPABILITY_TYPE__", type_name)
        .replace("__PANIC_EXIT_CODE__", &PANIC_EXIT_CODE.to_string())
}

#[derive(Serialize)]
struct ScenarioInput<'a> {
    name: &'a str,
    command: &'a crate::capability::Command,
}

#[async_trait]
impl Sandbox for CargoSandbox {
    async fn load(&self, candidate: &Candidate) -> Result<(), SandboxError> {
        *self
            .active()
            .entry(candidate.short_digest().to_string())
            .or_insert(0) += 1;
        let scaffold = self.prepare(candidate)?;
        self.cargo("compiling the module", &scaffold, &["check", "--lib"])
            .await?;
        info!(candidate = %candidate.short_digest(), "module compiled in isolation");
        Ok(())
    }

    async fn instantiate(&self, candidate: &Candidate) -> Result<(), SandboxError> {
        let scaffold = self.prepare(candidate)?;
        let bin = self.build_bin(&scaffold, INSTANTIATE_BIN, candidate).await?;
        self.run_bin(&scaffold, &bin, &[]).await?;
        Ok(())
    }

    async fn exercise(
        &self,
        candidate: &Candidate,
        scenarios: &[Scenario],
    ) -> Result<ExerciseReport, SandboxError> {
        let scaffold = self.prepare(candidate)?;
        let harness = self.build_bin(&scaffold, HARNESS_BIN, candidate).await?;

        let inputs: Vec<ScenarioInput<'_>> = scenarios
            .iter()
            .map(|s| ScenarioInput {
                name: &s.name,
                command: &s.command,
            })
            .collect();
        let scenario_file = scaffold.join("scenarios.json");
        let json = serde_json::to_vec_pretty(&inputs)
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;
        std::fs::write(&scenario_file, json)
            .map_err(|e| SandboxError::Unavailable(format!("cannot write scenarios: {e}")))?;

        let file_arg = scenario_file.display().to_string();
        let out = self
            .run_bin(&scaffold, &harness, &["exercise", &file_arg])
            .await?;
        serde_json::from_str(out.stdout.trim()).map_err(|e| SandboxError::Protocol(e.to_string()))
    }

    async fn release(&self, candidate: &Candidate) {
        let key = candidate.short_digest().to_string();
        let remaining = {
            let mut active = self.active();
            let count = active.entry(key.clone()).or_insert(0);
            *count = count.saturating_sub(1);
            let remaining = *count;
            if remaining == 0 {
                active.remove(&key);
            }
            remaining
        };
        if remaining == 0 && !self.config.keep_scaffolds {
            self.remove_scaffold(candidate);
        }
    }
}
