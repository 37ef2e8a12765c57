//! Stage status and execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed successfully.
    Ok,
    /// Stage was skipped through its `SKIP_<name>` toggle.
    Skip,
    /// Stage failed.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Whether a stage belongs to the forward sequence or runs deferred at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePhase {
    /// Runs in registration order as part of the test body.
    Forward,
    /// Runs at the end of the run, LIFO, even after a forward failure.
    Deferred,
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Forward or deferred.
    pub phase: StagePhase,
    /// Final status.
    pub status: StageStatus,
    /// When the stage was dispatched.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds (zero for skipped stages).
    pub duration_ms: f64,
    /// Error message for failed stages.
    pub error: Option<String>,
}

impl StageRecord {
    /// Creates a record for a skipped stage.
    #[must_use]
    pub fn skipped(name: impl Into<String>, phase: StagePhase) -> Self {
        Self {
            name: name.into(),
            phase,
            status: StageStatus::Skip,
            started_at: Utc::now(),
            duration_ms: 0.0,
            error: None,
        }
    }

    /// Creates a record for a stage that ran to completion or failure.
    #[must_use]
    pub fn finished(
        name: impl Into<String>,
        phase: StagePhase,
        started_at: DateTime<Utc>,
        duration_ms: f64,
        error: Option<String>,
    ) -> Self {
        let status = if error.is_some() {
            StageStatus::Fail
        } else {
            StageStatus::Ok
        };
        Self {
            name: name.into(),
            phase,
            status,
            started_at,
            duration_ms,
            error,
        }
    }
}
