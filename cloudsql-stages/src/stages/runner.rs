//! Sequential stage runner with deferred teardown.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::toggles::SkipToggles;
use crate::core::{StageEvent, StagePhase, StageRecord, StageStatus};
use crate::errors::{HarnessError, Result};
use crate::events::{EventSink, LoggingEventSink};

type DeferredAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

struct DeferredStage {
    name: String,
    action: DeferredAction,
}

/// Runs the named stages of one test case.
///
/// Forward stages run in the order they are invoked through
/// [`run_stage`](Self::run_stage). Teardown stages are registered with
/// [`defer_stage`](Self::defer_stage) and run by [`finish`](Self::finish)
/// in reverse order of registration, whether or not a forward stage failed.
///
/// ```rust,ignore
/// let runner = StageRunner::new("mysql-test", SkipToggles::from_process_env());
/// let forward = async {
///     runner.run_stage("bootstrap", || bootstrap(&dir)).await?;
///     runner.defer_stage("teardown", move || teardown(dir));
///     runner.run_stage("deploy", || deploy(&dir)).await?;
///     Ok(())
/// }
/// .await;
/// let report = runner.finish(forward).await?;
/// ```
pub struct StageRunner {
    run_name: String,
    run_id: Uuid,
    toggles: SkipToggles,
    sink: Arc<dyn EventSink>,
    records: Mutex<Vec<StageRecord>>,
    deferred: Mutex<Vec<DeferredStage>>,
}

impl StageRunner {
    /// Creates a runner that logs its events through `tracing`.
    #[must_use]
    pub fn new(run_name: impl Into<String>, toggles: SkipToggles) -> Self {
        Self::with_sink(run_name, toggles, Arc::new(LoggingEventSink::default()))
    }

    /// Creates a runner with an explicit event sink.
    #[must_use]
    pub fn with_sink(
        run_name: impl Into<String>,
        toggles: SkipToggles,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            run_id: Uuid::new_v4(),
            toggles,
            sink,
            records: Mutex::new(Vec::new()),
            deferred: Mutex::new(Vec::new()),
        }
    }

    /// Returns the run name.
    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Returns the unique id of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the skip toggles used by this runner.
    #[must_use]
    pub fn toggles(&self) -> &SkipToggles {
        &self.toggles
    }

    /// Runs a forward stage unless its skip toggle is set.
    ///
    /// A failure is returned wrapped in [`HarnessError::StageFailed`]; callers
    /// propagate it with `?` to abort the remaining forward stages.
    pub async fn run_stage<F, Fut>(&self, name: &str, action: F) -> Result<StageStatus>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.dispatch(name, StagePhase::Forward, action).await
    }

    /// Registers a teardown stage to run when the run finishes.
    pub fn defer_stage<F, Fut>(&self, name: &str, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.deferred.lock().push(DeferredStage {
            name: name.to_string(),
            action: Box::new(move || action().boxed()),
        });
    }

    /// Returns the number of registered teardown stages that have not run.
    #[must_use]
    pub fn pending_deferred(&self) -> usize {
        self.deferred.lock().len()
    }

    /// Returns the records of all stages dispatched so far.
    #[must_use]
    pub fn records(&self) -> Vec<StageRecord> {
        self.records.lock().clone()
    }

    /// Runs every deferred stage (LIFO) and closes the run.
    ///
    /// A failing teardown stage does not prevent the remaining ones from
    /// running. The forward error wins over teardown errors.
    pub async fn finish(self, forward: Result<()>) -> Result<RunReport> {
        if let Err(err) = &forward {
            error!(
                run = %self.run_name,
                error = %err,
                "Forward stages aborted, running deferred stages"
            );
        }

        let deferred = std::mem::take(&mut *self.deferred.lock());
        let mut teardown_error: Option<HarnessError> = None;

        for DeferredStage { name, action } in deferred.into_iter().rev() {
            if let Err(err) = self.dispatch(&name, StagePhase::Deferred, action).await {
                warn!(run = %self.run_name, stage = %name, error = %err, "Deferred stage failed");
                teardown_error.get_or_insert(err);
            }
        }

        let report = RunReport {
            run_name: self.run_name.clone(),
            run_id: self.run_id,
            records: std::mem::take(&mut *self.records.lock()),
        };
        info!(run = %report.run_name, summary = %report.summary(), "Run finished");

        forward?;
        match teardown_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    async fn dispatch<F, Fut>(
        &self,
        name: &str,
        phase: StagePhase,
        action: F,
    ) -> Result<StageStatus>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if let Some(reason) = self.toggles.skip_reason(name) {
            info!(run = %self.run_name, stage = %name, %reason, "Skipping stage");
            self.sink
                .emit(StageEvent::skipped(&self.run_name, name, &reason))
                .await;
            self.records.lock().push(StageRecord::skipped(name, phase));
            return Ok(StageStatus::Skip);
        }

        self.sink.emit(StageEvent::started(&self.run_name, name)).await;
        info!(run = %self.run_name, stage = %name, %phase, "Running stage");

        let span = info_span!(
            "stage",
            run = %self.run_name,
            run_id = %self.run_id,
            stage = %name,
            %phase
        );
        let started_at = Utc::now();
        let clock = Instant::now();
        let outcome = AssertUnwindSafe(action())
            .catch_unwind()
            .instrument(span)
            .await
            .unwrap_or_else(|panic| Err(HarnessError::Panicked(panic_message(&*panic))));
        let duration_ms = clock.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(()) => {
                self.records
                    .lock()
                    .push(StageRecord::finished(name, phase, started_at, duration_ms, None));
                self.sink
                    .emit(StageEvent::completed(&self.run_name, name, duration_ms))
                    .await;
                Ok(StageStatus::Ok)
            }
            Err(err) => {
                let message = err.to_string();
                self.records.lock().push(StageRecord::finished(
                    name,
                    phase,
                    started_at,
                    duration_ms,
                    Some(message.clone()),
                ));
                self.sink
                    .emit(StageEvent::failed(&self.run_name, name, &message))
                    .await;
                Err(err.in_stage(name))
            }
        }
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("run_name", &self.run_name)
            .field("run_id", &self.run_id)
            .field("toggles", &self.toggles)
            .field("pending_deferred", &self.pending_deferred())
            .finish()
    }
}

impl Drop for StageRunner {
    fn drop(&mut self) {
        let pending = self.deferred.get_mut();
        if !pending.is_empty() {
            let names: Vec<&str> = pending.iter().map(|d| d.name.as_str()).collect();
            warn!(
                run = %self.run_name,
                ?names,
                "Runner dropped without finish(); deferred stages did not run"
            );
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run name.
    pub run_name: String,
    /// Run id.
    pub run_id: Uuid,
    /// Every dispatched stage, in dispatch order.
    pub records: Vec<StageRecord>,
}

impl RunReport {
    /// Returns the status of the last dispatch of `stage`.
    #[must_use]
    pub fn status_of(&self, stage: &str) -> Option<StageStatus> {
        self.records
            .iter()
            .rev()
            .find(|r| r.name == stage)
            .map(|r| r.status)
    }

    /// Names of stages with the given status, in dispatch order.
    #[must_use]
    pub fn stages_with(&self, status: StageStatus) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Names of all dispatched stages, in dispatch order.
    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    /// One-line summary, e.g. `bootstrap=ok deploy=skip teardown=ok`.
    #[must_use]
    pub fn summary(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{}={}", r.name, r.status))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
