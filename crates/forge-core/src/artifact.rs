//! Forge run artifact persistence and retention.
//!
//! A finished [`ForgeRun`] is written to `<dir>/<run_id>/forge-run.json` with
//! a companion `<dir>/<run_id>/forge-run.digest` holding the SHA-256 of the
//! JSON bytes. Reading recomputes the digest before deserializing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::{ForgeError, ForgeRun, Result};

const RUN_FILE: &str = "forge-run.json";
const DIGEST_FILE: &str = "forge-run.digest";

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `run` under `dir`. Returns the path to `forge-run.json`.
pub fn write_run_artifact(run: &ForgeRun, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(run.run_id.to_string());
    std::fs::create_dir_all(&run_dir)?;

    let run_path = run_dir.join(RUN_FILE);
    let json = serde_json::to_vec_pretty(run)?;
    std::fs::write(&run_path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), sha256_hex(&json))?;

    Ok(run_path)
}

/// Read and verify the artifact for `run_id`.
///
/// Returns [`ForgeError::DigestMismatch`] when the JSON no longer matches its
/// sidecar digest.
pub fn read_run_artifact(run_id: &str, dir: &Path) -> Result<ForgeRun> {
    let run_dir = dir.join(run_id);
    let json = std::fs::read(run_dir.join(RUN_FILE))?;
    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?
        .trim()
        .to_string();

    let actual = sha256_hex(&json);
    if actual != expected {
        return Err(ForgeError::DigestMismatch { expected, actual });
    }

    Ok(serde_json::from_slice(&json)?)
}

/// Run ids of every artifact under `dir`, newest first.
pub fn list_run_artifacts(dir: &Path) -> Result<Vec<(DateTime<Utc>, String)>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ForgeError::Io(e)),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let path = entry.path().join(RUN_FILE);
        if !path.exists() {
            continue;
        }
        let json = std::fs::read(&path)?;
        if let Ok(run) = serde_json::from_slice::<ForgeRun>(&json) {
            entries.push((run.started_at, run.run_id.to_string()));
        }
    }
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(entries)
}

/// Pruning rules for an artifact directory.
#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    /// Remove runs started more than this many days ago.
    pub max_age_days: Option<u64>,
    /// Keep at most this many runs, newest first.
    pub max_runs: Option<usize>,
}

impl RetentionPolicy {
    /// Apply age then count limits. Returns the number of runs removed.
    pub fn prune(&self, dir: &Path) -> Result<usize> {
        let mut entries = list_run_artifacts(dir)?;
        let mut pruned = 0usize;

        if let Some(max_days) = self.max_age_days {
            let cutoff = Utc::now() - chrono::Duration::days(max_days as i64);
            entries.retain(|(started_at, run_id)| {
                if *started_at < cutoff {
                    if std::fs::remove_dir_all(dir.join(run_id)).is_ok() {
                        pruned += 1;
                    }
                    false
                } else {
                    true
                }
            });
        }

        if let Some(max_runs) = self.max_runs {
            if entries.len() > max_runs {
                for (_, run_id) in entries.drain(max_runs..) {
                    if std::fs::remove_dir_all(dir.join(&run_id)).is_ok() {
                        pruned += 1;
                    }
                }
            }
        }

        Ok(pruned)
    }
}
