//! Provisioning options: a module directory plus its input variables.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Options passed opaquely to the provisioning tool.
///
/// Saved by `deploy` and reloaded by every later stage so they all target
/// the same module with the same variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionOptions {
    /// Directory of the module to apply.
    pub dir: PathBuf,
    /// Input variables, sorted by name.
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

impl ProvisionOptions {
    /// Creates options for `dir` with no variables.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            vars: BTreeMap::new(),
        }
    }

    /// Adds a variable.
    #[must_use]
    pub fn with_var(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.set_var(name, value);
        self
    }

    /// Sets a variable in place.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Returns a variable.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<&serde_json::Value> {
        self.vars.get(name)
    }

    /// Returns a string variable.
    #[must_use]
    pub fn var_str(&self, name: &str) -> Option<&str> {
        self.vars.get(name).and_then(serde_json::Value::as_str)
    }

    /// Returns the module directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Renders the variables as `-var name=value` arguments.
    #[must_use]
    pub fn var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .flat_map(|(name, value)| ["-var".to_string(), format!("{name}={}", to_hcl(value))])
            .collect()
    }

    /// Stable hash of the directory and variables.
    ///
    /// Logged by the stages that reload options so a re-run can be checked
    /// against the configuration that was deployed.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dir.to_string_lossy().as_bytes());
        for (name, value) in &self.vars {
            hasher.update([0]);
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(to_hcl(value).as_bytes());
        }
        hex::encode(&hasher.finalize()[..8])
    }
}

/// Formats a JSON value the way Terraform parses `-var` values.
///
/// Top-level strings are passed raw; nested strings are quoted.
#[must_use]
pub fn to_hcl(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => to_hcl_nested(other),
    }
}

fn to_hcl_nested(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        // JSON string escaping is valid HCL string escaping.
        serde_json::Value::String(s) => serde_json::Value::String(s.clone()).to_string(),
        serde_json::Value::Array(items) => {
            let items: Vec<String> = items.iter().map(to_hcl_nested).collect();
            format!("[{}]", items.join(", "))
        }
        serde_json::Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k} = {}", to_hcl_nested(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}
