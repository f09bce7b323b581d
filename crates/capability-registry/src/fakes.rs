//! In-memory fakes for the registry trait (testing only)
//!
//! `MemoryCapabilityRegistry` satisfies the `CapabilityRegistry` contract and
//! additionally counts successful mutations, so tests can assert that a
//! rejected publish changed nothing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::registry_traits::*;

/// In-memory registry backed by a `BTreeMap<name, source>`.
#[derive(Debug, Default)]
pub struct MemoryCapabilityRegistry {
    modules: Mutex<BTreeMap<CapabilityName, String>>,
    mutations: AtomicU64,
    install_calls: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryCapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `(name, source)` entries. Seeding does not
    /// count as a mutation.
    pub fn with_modules<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let registry = Self::new();
        {
            let mut modules = registry.modules.lock().unwrap();
            for (name, source) in entries {
                let name = CapabilityName::try_from(name).expect("fake seed name must be valid");
                modules.insert(name, source.to_string());
            }
        }
        registry
    }

    /// Make every subsequent install fail with `WriteFailed`.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Number of successful installs.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Number of install calls, successful or not.
    pub fn install_calls(&self) -> u64 {
        self.install_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of the current contents.
    pub fn snapshot(&self) -> BTreeMap<CapabilityName, String> {
        self.modules.lock().unwrap().clone()
    }
}

#[async_trait]
impl CapabilityRegistry for MemoryCapabilityRegistry {
    async fn list(&self) -> RegistryResult<Vec<CapabilityName>> {
        let modules = self.modules.lock().unwrap();
        Ok(modules.keys().cloned().collect())
    }

    async fn contains(&self, name: &CapabilityName) -> RegistryResult<bool> {
        let modules = self.modules.lock().unwrap();
        Ok(modules.contains_key(name))
    }

    async fn install(&self, name: &CapabilityName, source: &str) -> RegistryResult<InstallReceipt> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        let mut modules = self.modules.lock().unwrap();
        if modules.contains_key(name) {
            return Err(RegistryError::Conflict {
                name: name.to_string(),
            });
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RegistryError::WriteFailed {
                name: name.to_string(),
                reason: "simulated write failure".to_string(),
            });
        }
        modules.insert(name.clone(), source.to_string());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(InstallReceipt::new(
            name.clone(),
            format!("memory://{}", name),
            source,
        ))
    }

    async fn source(&self, name: &CapabilityName) -> RegistryResult<String> {
        let modules = self.modules.lock().unwrap();
        modules
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }
}
