//! Staged test runner.
//!
//! A test case is a fixed sequence of named stages (`bootstrap`, `deploy`,
//! `validate_outputs`, ..., `teardown`). Each stage can be skipped through a
//! `SKIP_<name>` toggle, and teardown stages are deferred so they run even
//! when a forward stage fails.

mod runner;
mod toggles;

pub use runner::{RunReport, StageRunner};
pub use toggles::{is_truthy, SkipToggles, SKIP_PREFIX};
