//! Values persisted between stages.
//!
//! Each value is a JSON document at `<work_dir>/.test-data/<key>.json`, so a
//! later invocation of the harness (with earlier stages skipped) reads what
//! an earlier invocation saved.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::consts::keys;
use crate::errors::{HarnessError, Result};
use crate::provision::ProvisionOptions;

/// Folder, relative to the work directory, holding saved values.
pub const TEST_DATA_DIR: &str = ".test-data";

/// Returns the file that stores `key` for `work_dir`.
#[must_use]
pub fn value_path(work_dir: &Path, key: &str) -> PathBuf {
    work_dir.join(TEST_DATA_DIR).join(format!("{key}.json"))
}

/// Saves `value` under `key`, overwriting any previous value.
pub fn save_value<T: Serialize + ?Sized>(work_dir: &Path, key: &str, value: &T) -> Result<()> {
    let path = value_path(work_dir, key);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(&path, bytes)?;
    debug!(key = %key, path = %path.display(), "Saved test data");
    Ok(())
}

/// Loads the value saved under `key`.
///
/// Fails with [`HarnessError::MissingValue`] if nothing was saved, which
/// usually means an earlier stage was skipped before it ever ran.
pub fn load_value<T: DeserializeOwned>(work_dir: &Path, key: &str) -> Result<T> {
    let path = value_path(work_dir, key);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HarnessError::MissingValue {
                key: key.to_string(),
                path,
            })
        }
        Err(e) => return Err(e.into()),
    };
    let value = serde_json::from_slice(&bytes)?;
    debug!(key = %key, path = %path.display(), "Loaded test data");
    Ok(value)
}

/// Returns true if a value exists for `key`.
#[must_use]
pub fn is_saved(work_dir: &Path, key: &str) -> bool {
    value_path(work_dir, key).is_file()
}

/// Saves a string value.
pub fn save_string(work_dir: &Path, key: &str, value: &str) -> Result<()> {
    save_value(work_dir, key, value)
}

/// Loads a string value.
pub fn load_string(work_dir: &Path, key: &str) -> Result<String> {
    load_value(work_dir, key)
}

/// Saves the provisioning options used by `deploy`.
pub fn save_options(work_dir: &Path, options: &ProvisionOptions) -> Result<()> {
    save_value(work_dir, keys::PROVISION_OPTIONS, options)
}

/// Loads the provisioning options saved by `deploy`.
pub fn load_options(work_dir: &Path) -> Result<ProvisionOptions> {
    load_value(work_dir, keys::PROVISION_OPTIONS)
}

/// Removes every value saved for `work_dir`.
pub fn clean_up_saved(work_dir: &Path) -> Result<()> {
    let dir = work_dir.join(TEST_DATA_DIR);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
