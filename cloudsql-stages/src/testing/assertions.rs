//! Assertions over finished runs.

use crate::core::StageStatus;
use crate::errors::HarnessError;
use crate::stages::RunReport;

/// Asserts that every dispatched stage succeeded or was skipped.
pub fn assert_run_succeeded(report: &RunReport) {
    let failed = report.stages_with(StageStatus::Fail);
    assert!(
        failed.is_empty(),
        "Expected a clean run, failed stages: {failed:?} ({})",
        report.summary()
    );
}

/// Asserts the final status of one stage.
pub fn assert_stage_status(report: &RunReport, stage: &str, expected: StageStatus) {
    assert_eq!(
        report.status_of(stage),
        Some(expected),
        "Unexpected status for stage '{stage}' ({})",
        report.summary()
    );
}

/// Asserts the exact dispatch order of a run.
pub fn assert_stage_order(report: &RunReport, expected: &[&str]) {
    assert_eq!(
        report.order(),
        expected,
        "Unexpected stage order ({})",
        report.summary()
    );
}

/// Asserts that a run failed in `stage` and returns the root cause.
pub fn assert_failed_in<'a>(error: &'a HarnessError, stage: &str) -> &'a HarnessError {
    assert_eq!(
        error.stage(),
        Some(stage),
        "Expected a failure in stage '{stage}', got: {error}"
    );
    error.root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StagePhase, StageRecord};
    use uuid::Uuid;

    fn report(records: Vec<StageRecord>) -> RunReport {
        RunReport {
            run_name: "mysql-test".to_string(),
            run_id: Uuid::new_v4(),
            records,
        }
    }

    #[test]
    fn test_skipped_stages_count_as_success() {
        let report = report(vec![
            StageRecord::skipped("bootstrap", StagePhase::Forward),
            StageRecord::skipped("teardown", StagePhase::Deferred),
        ]);

        assert_run_succeeded(&report);
        assert_stage_status(&report, "teardown", StageStatus::Skip);
        assert_stage_order(&report, &["bootstrap", "teardown"]);
    }

    #[test]
    fn test_failed_in_returns_root() {
        let err = HarnessError::Config("no project".to_string()).in_stage("bootstrap");
        let root = assert_failed_in(&err, "bootstrap");
        assert!(matches!(root, HarnessError::Config(_)));
    }

    #[test]
    #[should_panic(expected = "Unexpected status for stage 'deploy'")]
    fn test_missing_stage_panics() {
        assert_stage_status(&report(Vec::new()), "deploy", StageStatus::Ok);
    }
}
