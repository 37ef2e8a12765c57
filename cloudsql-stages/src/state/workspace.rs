//! Isolated copies of the Terraform module tree.
//!
//! Every scenario provisions from its own copy of the repository so parallel
//! scenarios never share `.terraform` folders, state files or saved test
//! data. When any `SKIP_*` toggle is set the original folder is used
//! instead, so values saved by an earlier invocation are found again.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};

use super::store::is_saved;
use crate::consts::keys;
use crate::errors::Result;
use crate::stages::SkipToggles;

/// A module tree a scenario provisions from.
#[derive(Debug)]
pub struct ModuleCopy {
    examples_dir: PathBuf,
    // Deleted on drop unless the run failed.
    temp: Option<TempDir>,
}

impl ModuleCopy {
    /// Path of the examples folder inside the copy.
    #[must_use]
    pub fn examples_dir(&self) -> &Path {
        &self.examples_dir
    }

    /// Path of one example module inside the copy.
    #[must_use]
    pub fn example(&self, name: &str) -> PathBuf {
        self.examples_dir.join(name)
    }

    fn has_deployments(&self) -> bool {
        std::fs::read_dir(&self.examples_dir).is_ok_and(|entries| {
            entries
                .flatten()
                .any(|entry| is_saved(&entry.path(), keys::PROVISION_OPTIONS))
        })
    }

    /// Returns true if this is a temporary copy rather than the source tree.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Passes `result` through, keeping the copy on disk if it is an error
    /// and some example in it was deployed.
    ///
    /// A failed run may leave live resources behind whose Terraform state and
    /// saved test data only exist in the copy.
    pub fn retain_on_failure<T>(self, result: Result<T>) -> Result<T> {
        if result.is_err() && !self.has_deployments() {
            return result;
        }
        if let (Err(e), Some(temp)) = (&result, self.temp) {
            let kept = temp.keep();
            warn!(
                path = %kept.display(),
                error = %e,
                "Run failed; keeping the working copy for manual cleanup"
            );
        }
        result
    }
}

/// Copies `root` into a fresh temp directory and returns its `examples_folder`.
///
/// The whole root is copied (not just the examples) because the examples
/// reference sibling modules through relative paths.
pub fn copy_module_to_temp(
    root: &Path,
    examples_folder: &str,
    toggles: &SkipToggles,
) -> Result<ModuleCopy> {
    if toggles.any_set() {
        info!(
            root = %root.display(),
            "A SKIP_* toggle is set; using the original folder so saved data survives between runs"
        );
        return Ok(ModuleCopy {
            examples_dir: root.join(examples_folder),
            temp: None,
        });
    }

    let temp = tempfile::Builder::new()
        .prefix("cloudsql-stages-")
        .tempdir()?;
    copy_tree(root, temp.path())?;
    let examples_dir = temp.path().join(examples_folder);
    info!(
        from = %root.display(),
        to = %examples_dir.display(),
        "Copied module tree to temp folder"
    );

    Ok(ModuleCopy {
        examples_dir,
        temp: Some(temp),
    })
}

/// Returns true for entries that must not be copied: hidden files and
/// folders (`.terraform`, `.test-data`, `.git`), local state and build output.
fn is_excluded(name: &str) -> bool {
    name.starts_with('.') || name.starts_with("terraform.tfstate") || name == "target"
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if is_excluded(&name.to_string_lossy()) {
            continue;
        }
        let target = to.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
        // Symlinks are skipped.
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapEnv;
    use crate::errors::HarnessError;
    use crate::provision::ProvisionOptions;
    use crate::state::save_options;
    use std::sync::Arc;

    fn module_tree() -> TempDir {
        let root = tempfile::tempdir().unwrap();
        let example = root.path().join("examples").join("mysql-public-ip");
        std::fs::create_dir_all(example.join(".terraform")).unwrap();
        std::fs::write(example.join("main.tf"), "module \"mysql\" {}").unwrap();
        std::fs::write(example.join("terraform.tfstate"), "{}").unwrap();
        std::fs::write(example.join(".terraform").join("plugin"), "bin").unwrap();
        std::fs::create_dir_all(root.path().join("modules").join("cloud-sql")).unwrap();
        std::fs::write(root.path().join("modules").join("cloud-sql").join("main.tf"), "").unwrap();
        root
    }

    #[test]
    fn test_copy_is_isolated_and_filtered() {
        let root = module_tree();
        let copy = copy_module_to_temp(root.path(), "examples", &SkipToggles::none()).unwrap();

        assert!(copy.is_temporary());
        let example = copy.example("mysql-public-ip");
        assert!(example.join("main.tf").is_file());
        assert!(!example.join("terraform.tfstate").exists());
        assert!(!example.join(".terraform").exists());
        // Sibling modules come along for relative module sources.
        assert!(copy
            .examples_dir()
            .parent()
            .unwrap()
            .join("modules/cloud-sql/main.tf")
            .is_file());
        assert_ne!(copy.examples_dir(), root.path().join("examples"));
    }

    #[test]
    fn test_two_copies_do_not_share_a_folder() {
        let root = module_tree();
        let a = copy_module_to_temp(root.path(), "examples", &SkipToggles::none()).unwrap();
        let b = copy_module_to_temp(root.path(), "examples", &SkipToggles::none()).unwrap();
        assert_ne!(a.examples_dir(), b.examples_dir());
    }

    #[test]
    fn test_skip_toggle_uses_original_folder() {
        let root = module_tree();
        let toggles = SkipToggles::new(Arc::new(MapEnv::new().with("SKIP_teardown", "true")));

        let copy = copy_module_to_temp(root.path(), "examples", &toggles).unwrap();
        assert!(!copy.is_temporary());
        assert_eq!(copy.examples_dir(), root.path().join("examples"));
    }

    #[test]
    fn test_failed_run_keeps_copy() {
        let root = module_tree();
        let copy = copy_module_to_temp(root.path(), "examples", &SkipToggles::none()).unwrap();
        let path = copy.examples_dir().to_path_buf();
        let options = ProvisionOptions::new(copy.example("mysql-public-ip"));
        save_options(&copy.example("mysql-public-ip"), &options).unwrap();

        let failed = Err(HarnessError::Config("teardown failed".to_string()));
        let result: Result<()> = copy.retain_on_failure(failed);

        assert!(result.is_err());
        assert!(path.join("mysql-public-ip").join("main.tf").is_file());
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_failure_before_deploy_removes_copy() {
        let root = module_tree();
        let copy = copy_module_to_temp(root.path(), "examples", &SkipToggles::none()).unwrap();
        let path = copy.examples_dir().to_path_buf();

        let failed = Err(HarnessError::Config("no project".to_string()));
        assert!(copy.retain_on_failure::<()>(failed).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_successful_run_removes_copy() {
        let root = module_tree();
        let copy = copy_module_to_temp(root.path(), "examples", &SkipToggles::none()).unwrap();
        let path = copy.examples_dir().to_path_buf();

        copy.retain_on_failure(Ok(())).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_copy_removed_on_drop() {
        let root = module_tree();
        let copy = copy_module_to_temp(root.path(), "examples", &SkipToggles::none()).unwrap();
        let path = copy.examples_dir().to_path_buf();
        drop(copy);
        assert!(!path.exists());
    }
}
