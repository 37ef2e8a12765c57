//! Stage lifecycle events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An event emitted by the stage runner.
///
/// Events are consumed by event sinks for logging or, in tests, collected
/// and inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// The event type (e.g., "stage.started", "stage.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (RFC 3339).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl StageEvent {
    /// Creates a new stage event.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the event payload as a JSON value.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let data: serde_json::Map<String, serde_json::Value> =
            self.data.clone().into_iter().collect();
        serde_json::json!({
            "timestamp": self.timestamp,
            "data": data,
        })
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn started(run: &str, stage: &str) -> Self {
        Self::new("stage.started")
            .add_data("run", serde_json::json!(run))
            .add_data("stage", serde_json::json!(stage))
    }

    /// Creates a "stage.completed" event.
    #[must_use]
    pub fn completed(run: &str, stage: &str, duration_ms: f64) -> Self {
        Self::new("stage.completed")
            .add_data("run", serde_json::json!(run))
            .add_data("stage", serde_json::json!(stage))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn failed(run: &str, stage: &str, error: &str) -> Self {
        Self::new("stage.failed")
            .add_data("run", serde_json::json!(run))
            .add_data("stage", serde_json::json!(stage))
            .add_data("error", serde_json::json!(error))
    }

    /// Creates a "stage.skipped" event.
    #[must_use]
    pub fn skipped(run: &str, stage: &str, reason: &str) -> Self {
        Self::new("stage.skipped")
            .add_data("run", serde_json::json!(run))
            .add_data("stage", serde_json::json!(stage))
            .add_data("reason", serde_json::json!(reason))
    }
}
