//! Publisher: derives the registry identifier for an approved candidate and
//! installs it.

use std::sync::Arc;

use capability_registry::{CapabilityName, CapabilityRegistry, InstallReceipt, RegistryError};
use tracing::info;

use crate::domain::{AbortReason, Candidate};

/// Derive a registry identifier from a declared type name.
///
/// `SquareRootCapability` becomes `square_root_capability`, `HTTPLamp`
/// becomes `http_lamp`. Characters outside `[A-Za-z0-9]` become
/// separators, so path components cannot survive. The result still has to
/// pass the registry name policy.
pub fn derive_identifier(declared: &str) -> Result<CapabilityName, RegistryError> {
    let chars: Vec<char> = declared.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '_' && (collapsed.is_empty() || collapsed.ends_with('_')) {
            continue;
        }
        collapsed.push(c);
    }
    let name = collapsed.trim_end_matches('_').to_string();
    CapabilityName::try_from(name)
}

/// Module text written to the registry: a provenance header plus the
/// candidate source.
pub fn render_module(name: &CapabilityName, candidate: &Candidate) -> String {
    format!(
        "// Capability `{}` ({}), published by forge.\n// Candidate digest: {}\n\n{}\n",
        name,
        candidate.type_name,
        candidate.digest,
        candidate.source.trim_end()
    )
}

/// Map a registry failure to the run's abort reason.
pub fn abort_reason(declared: &str, err: RegistryError) -> AbortReason {
    match err {
        RegistryError::Conflict { name } => AbortReason::RegistryConflict { name },
        RegistryError::InvalidName { reason, .. } => AbortReason::InvalidName {
            declared: declared.to_string(),
            detail: reason,
        },
        RegistryError::WriteFailed { name, reason } => AbortReason::RegistryWriteError {
            name,
            detail: reason,
        },
        other => AbortReason::RegistryWriteError {
            name: declared.to_string(),
            detail: other.to_string(),
        },
    }
}

/// Installs approved candidates into a [`CapabilityRegistry`].
#[derive(Clone)]
pub struct Publisher {
    registry: Arc<dyn CapabilityRegistry>,
}

impl Publisher {
    pub fn new(registry: Arc<dyn CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn CapabilityRegistry> {
        &self.registry
    }

    /// Publish `candidate` under its derived name. Never overwrites.
    pub async fn publish(&self, candidate: &Candidate) -> Result<InstallReceipt, RegistryError> {
        let name = derive_identifier(&candidate.type_name)?;
        let module = render_module(&name, candidate);
        let receipt = self.registry.install(&name, &module).await?;
        info!(
            capability = %receipt.name,
            location = %receipt.location,
            digest = %receipt.source_digest,
            "capability published"
        );
        Ok(receipt)
    }
}
