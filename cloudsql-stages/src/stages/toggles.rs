//! Per-stage skip toggles.
//!
//! A stage named `deploy` is skipped when `SKIP_deploy` is set to a truthy
//! value. This lets a developer re-run only the failing stage of a run while
//! earlier stages' state stays on disk.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::config::{EnvSource, MapEnv, ProcessEnv};

/// Prefix of skip toggle variables.
pub const SKIP_PREFIX: &str = "SKIP_";

/// Returns true if a toggle value counts as "set".
///
/// Empty strings and the usual negatives (`0`, `false`, `no`, `off`) do not.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && !matches!(
            value.to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
}

/// Name-to-bool lookup evaluated before each stage.
#[derive(Clone)]
pub struct SkipToggles {
    env: Arc<dyn EnvSource>,
    forced: BTreeSet<String>,
}

impl SkipToggles {
    /// Creates toggles backed by the given environment.
    #[must_use]
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            env,
            forced: BTreeSet::new(),
        }
    }

    /// Creates toggles backed by the process environment.
    #[must_use]
    pub fn from_process_env() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }

    /// Creates toggles with nothing skipped.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Arc::new(MapEnv::new()))
    }

    /// Forces a stage to be skipped regardless of the environment.
    #[must_use]
    pub fn with_skip(mut self, stage: impl Into<String>) -> Self {
        self.forced.insert(stage.into());
        self
    }

    /// Returns the variable name that controls `stage`.
    #[must_use]
    pub fn variable_for(stage: &str) -> String {
        format!("{SKIP_PREFIX}{stage}")
    }

    /// Returns why `stage` is skipped, or `None` if it should run.
    #[must_use]
    pub fn skip_reason(&self, stage: &str) -> Option<String> {
        if self.forced.contains(stage) {
            return Some("skipped programmatically".to_string());
        }
        let var = Self::variable_for(stage);
        match self.env.var(&var) {
            Some(value) if is_truthy(&value) => Some(format!("{var}={value}")),
            _ => None,
        }
    }

    /// Returns true if `stage` should be skipped.
    #[must_use]
    pub fn is_skipped(&self, stage: &str) -> bool {
        self.skip_reason(stage).is_some()
    }

    /// Returns true if any stage toggle is set.
    #[must_use]
    pub fn any_set(&self) -> bool {
        !self.forced.is_empty()
            || self
                .env
                .keys_with_prefix(SKIP_PREFIX)
                .iter()
                .any(|key| self.env.var(key).is_some_and(|v| is_truthy(&v)))
    }
}

impl fmt::Debug for SkipToggles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipToggles")
            .field("forced", &self.forced)
            .field("env_toggles", &self.env.keys_with_prefix(SKIP_PREFIX))
            .finish()
    }
}
