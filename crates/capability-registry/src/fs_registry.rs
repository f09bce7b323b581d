use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::registry_traits::{
    CapabilityName, CapabilityRegistry, InstallReceipt, RegistryResult, MODULE_EXTENSION,
};

/// Filesystem-backed registry: one `<root>/<name>.rs` per capability module.
///
/// Installs write to a temp file in `root` and are moved into place with a
/// no-clobber rename, so a concurrent publisher in another process still
/// cannot overwrite an existing module. The in-process mutex serializes the
/// exists-check with the rename for publishers sharing this handle.
pub struct FsCapabilityRegistry {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsCapabilityRegistry {
    /// Open (and create if needed) a registry rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> RegistryResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn module_path(&self, name: &CapabilityName) -> PathBuf {
        self.root.join(name.file_name())
    }

    fn write_failed(name: &CapabilityName, err: impl std::fmt::Display) -> RegistryError {
        RegistryError::WriteFailed {
            name: name.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl CapabilityRegistry for FsCapabilityRegistry {
    async fn list(&self) -> RegistryResult<Vec<CapabilityName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MODULE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match CapabilityName::try_from(stem) {
                Ok(name) => names.push(name),
                Err(e) => debug!("skipping registry entry {}: {}", path.display(), e),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn contains(&self, name: &CapabilityName) -> RegistryResult<bool> {
        Ok(self.module_path(name).exists())
    }

    async fn install(&self, name: &CapabilityName, source: &str) -> RegistryResult<InstallReceipt> {
        let _guard = self.write_lock.lock().await;
        let path = self.module_path(name);

        if path.exists() {
            warn!(capability = %name, "install rejected: name already present");
            return Err(RegistryError::Conflict {
                name: name.to_string(),
            });
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(".install-")
            .suffix(".partial")
            .tempfile_in(&self.root)
            .map_err(|e| Self::write_failed(name, e))?;
        tmp.write_all(source.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Self::write_failed(name, e))?;

        // Dropping the returned temp file on error removes the partial write.
        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                RegistryError::Conflict {
                    name: name.to_string(),
                }
            } else {
                Self::write_failed(name, e.error)
            }
        })?;

        info!(capability = %name, path = %path.display(), "capability installed");
        Ok(InstallReceipt::new(
            name.clone(),
            path.display().to_string(),
            source,
        ))
    }

    async fn source(&self, name: &CapabilityName) -> RegistryResult<String> {
        fs::read_to_string(self.module_path(name)).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                RegistryError::NotFound {
                    name: name.to_string(),
                }
            } else {
                RegistryError::Io(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_registry() -> (tempfile::TempDir, FsCapabilityRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsCapabilityRegistry::new(dir.path().join("plugins")).unwrap();
        (dir, registry)
    }

    fn name(s: &str) -> CapabilityName {
        CapabilityName::try_from(s).unwrap()
    }

    #[tokio::test]
    async fn install_then_list_and_read_back() {
        let (_dir, registry) = make_registry();
        let receipt = registry
            .install(&name("square_root"), "pub struct SquareRoot;")
            .await
            .unwrap();
        assert!(receipt.location.ends_with("square_root.rs"));

        let names = registry.list().await.unwrap();
        assert_eq!(names, vec![name("square_root")]);
        assert_eq!(
            registry.source(&name("square_root")).await.unwrap(),
            "pub struct SquareRoot;"
        );
    }

    #[tokio::test]
    async fn conflict_leaves_existing_module_untouched() {
        let (_dir, registry) = make_registry();
        registry.install(&name("lamp"), "// v1").await.unwrap();

        let err = registry.install(&name("lamp"), "// v2").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(registry.source(&name("lamp")).await.unwrap(), "// v1");
    }

    #[tokio::test]
    async fn list_ignores_foreign_and_partial_files() {
        let (_dir, registry) = make_registry();
        registry.install(&name("lamp"), "// lamp").await.unwrap();
        fs::write(registry.root().join("notes.txt"), "x").unwrap();
        fs::write(registry.root().join(".install-abc.partial"), "x").unwrap();
        fs::write(registry.root().join("Bad-Name.rs"), "x").unwrap();

        let names = registry.list().await.unwrap();
        assert_eq!(names, vec![name("lamp")]);
    }

    #[tokio::test]
    async fn no_partial_files_remain_after_install() {
        let (_dir, registry) = make_registry();
        registry.install(&name("lamp"), "// lamp").await.unwrap();
        let _ = registry.install(&name("lamp"), "// again").await;

        let leftovers: Vec<_> = fs::read_dir(registry.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn source_of_missing_module_is_not_found() {
        let (_dir, registry) = make_registry();
        let err = registry.source(&name("ghost")).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }
}
