//! Whole-scenario runs against the in-memory cloud.

use pretty_assertions::assert_eq;

use cloudsql_stages::consts::{examples, keys, prefixes, stages};
use cloudsql_stages::core::StageStatus;
use cloudsql_stages::errors::HarnessError;
use cloudsql_stages::observability::init_test_logging;
use cloudsql_stages::scenarios::{
    cloud_sql_mysql, mysql_public_ip, mysql_replicas, postgres_public_ip, postgres_replicas,
};
use cloudsql_stages::state::save_string;
use cloudsql_stages::testing::{
    assert_failed_in, assert_run_succeeded, assert_stage_order, assert_stage_status, FailPoint,
    TestHarness,
};

fn harness() -> TestHarness {
    init_test_logging();
    TestHarness::new().unwrap()
}

// Failed runs keep their working copy on disk; tests clean up after themselves.
fn remove_kept_copies(h: &TestHarness) {
    for dir in h.cloud.initialized_dirs() {
        if let Some(copy_root) = dir.parent().and_then(|examples| examples.parent()) {
            let _ = std::fs::remove_dir_all(copy_root);
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_cloud_sql_mysql_full_run() {
    let h = harness();

    let report = cloud_sql_mysql(&h.context()).await.unwrap();

    assert_run_succeeded(&report);
    assert_stage_order(
        &report,
        &[
            stages::BOOTSTRAP,
            stages::DEPLOY,
            stages::VALIDATE_OUTPUTS,
            stages::SQL_TESTS,
            stages::TEARDOWN,
        ],
    );
    assert_eq!(report.run_name, prefixes::MYSQL_TEST);
    assert_eq!(
        h.cloud.calls(),
        strings(&[
            "init cloud-sql-mysql",
            "apply cloud-sql-mysql",
            "connect 10.0.1.1",
            "close 10.0.1.1",
            "destroy cloud-sql-mysql",
        ])
    );
    assert!(h.cloud.deployed().is_empty());
    assert_eq!(h.cloud.open_connections(), 0);
    assert!(h.cloud.initialized_dirs().iter().all(|d| !d.exists()));
}

#[tokio::test]
async fn test_mysql_public_ip_runs_cert_teardown_first() {
    let h = harness();

    let report = mysql_public_ip(&h.context()).await.unwrap();

    assert_stage_order(
        &report,
        &[
            stages::BOOTSTRAP,
            stages::DEPLOY,
            stages::VALIDATE_OUTPUTS,
            stages::SQL_TESTS,
            stages::PROXY_TESTS,
            stages::DEPLOY_CERT,
            stages::REDEPLOY,
            stages::SSL_SQL_TESTS,
            stages::TEARDOWN_CERT,
            stages::TEARDOWN,
        ],
    );
    assert_eq!(
        h.cloud.calls_of("destroy"),
        strings(&["destroy client-certificate", "destroy mysql-public-ip"])
    );
    assert_eq!(
        h.cloud.calls_of("connect_tls"),
        strings(&["connect_tls 10.0.1.1"])
    );
    assert_eq!(
        h.cloud.calls_of("proxy"),
        strings(&["proxy test-project:europe-north1:mysql-public-0001"])
    );
    assert_eq!(h.cloud.open_connections(), 0);
}

#[tokio::test]
async fn test_postgres_public_ip_full_run() {
    let h = harness();

    let report = postgres_public_ip(&h.context()).await.unwrap();

    assert_run_succeeded(&report);
    assert_stage_status(&report, stages::SSL_SQL_TESTS, StageStatus::Ok);
    assert_eq!(report.run_name, prefixes::POSTGRES_PUBLIC);
    assert!(h.cloud.deployed().is_empty());
}

#[tokio::test]
async fn test_mysql_replicas_full_run() {
    let h = harness();
    let ctx = h.context();

    let report = mysql_replicas(&ctx).await.unwrap();

    assert_stage_order(
        &report,
        &[
            stages::BOOTSTRAP,
            stages::DEPLOY,
            stages::VALIDATE_OUTPUTS,
            stages::SQL_TESTS,
            stages::READ_REPLICA_TESTS,
            stages::TEARDOWN,
        ],
    );
    assert_eq!(
        h.cloud.calls_of("connect"),
        strings(&["connect 10.0.1.1", "connect 10.0.1.2"])
    );
    assert!(h.cloud.instance_names().is_empty());
}

#[tokio::test]
async fn test_postgres_replicas_cleans_up_before_teardown() {
    let h = harness();

    let report = postgres_replicas(&h.context()).await.unwrap();

    assert_stage_order(
        &report,
        &[
            stages::BOOTSTRAP,
            stages::DEPLOY,
            stages::VALIDATE_OUTPUTS,
            stages::SQL_TESTS,
            stages::READ_REPLICA_TESTS,
            stages::CLEANUP_POSTGRES_OBJECTS,
            stages::TEARDOWN,
        ],
    );
    let calls = h.cloud.calls();
    assert_eq!(calls.last().map(String::as_str), Some("destroy postgres-replicas"));
}

#[tokio::test]
async fn test_forward_failure_still_tears_down() {
    let h = harness();
    h.cloud.fail_at(FailPoint::Connect);

    let err = cloud_sql_mysql(&h.context()).await.unwrap_err();

    let root = assert_failed_in(&err, stages::SQL_TESTS);
    assert!(matches!(root, HarnessError::Connectivity { .. }));
    assert_eq!(
        h.cloud.calls_of("destroy"),
        strings(&["destroy cloud-sql-mysql"])
    );
    let timeline = h.sink.timeline();
    assert_eq!(
        timeline.last(),
        Some(&("stage.completed".to_string(), stages::TEARDOWN.to_string()))
    );
    remove_kept_copies(&h);
}

#[tokio::test]
async fn test_failed_apply_is_still_destroyed() {
    let h = harness();
    h.cloud.fail_at(FailPoint::Apply);

    let err = mysql_public_ip(&h.context()).await.unwrap_err();

    assert!(matches!(
        assert_failed_in(&err, stages::DEPLOY),
        HarnessError::Provision(_)
    ));
    // The certificate was never deployed, so its teardown has no saved options.
    assert_eq!(
        h.cloud.calls_of("destroy"),
        strings(&["destroy mysql-public-ip"])
    );
    remove_kept_copies(&h);
}

#[tokio::test]
async fn test_bootstrap_failure_registers_no_teardown() {
    let h = harness();
    let ctx = h.context_with_env(&[("GOOGLE_CLOUD_PROJECT", "")]);

    let err = cloud_sql_mysql(&ctx).await.unwrap_err();

    assert!(matches!(
        assert_failed_in(&err, stages::BOOTSTRAP),
        HarnessError::Config(_)
    ));
    assert!(h.cloud.calls().is_empty());
}

#[tokio::test]
async fn test_teardown_failure_fails_clean_run() {
    let h = harness();
    h.cloud.fail_at(FailPoint::Destroy);

    let err = cloud_sql_mysql(&h.context()).await.unwrap_err();

    assert_failed_in(&err, stages::TEARDOWN);
    assert_eq!(h.cloud.deployed(), strings(&[examples::CLOUD_SQL_MYSQL]));

    // The instance is still live, so its working copy and saved data stay.
    let dirs = h.cloud.initialized_dirs();
    assert_eq!(dirs.len(), 1);
    assert!(dirs[0].join(".test-data").join("TerraformOptions.json").is_file());
    remove_kept_copies(&h);
}

#[tokio::test]
async fn test_resume_with_skip_toggles() {
    let h = harness();

    // First invocation keeps the instance around.
    let first = cloud_sql_mysql(&h.context_with_env(&[("SKIP_teardown", "true")]))
        .await
        .unwrap();
    assert_stage_status(&first, stages::TEARDOWN, StageStatus::Skip);
    assert_eq!(h.cloud.deployed(), strings(&[examples::CLOUD_SQL_MYSQL]));

    // Second invocation only tears down, from the values saved by the first.
    let second = cloud_sql_mysql(&h.context_with_env(&[
        ("SKIP_bootstrap", "true"),
        ("SKIP_deploy", "true"),
        ("SKIP_validate_outputs", "true"),
        ("SKIP_sql_tests", "true"),
    ]))
    .await
    .unwrap();

    assert_eq!(
        second.stages_with(StageStatus::Ok),
        vec![stages::TEARDOWN]
    );
    assert!(h.cloud.deployed().is_empty());
    assert_eq!(h.cloud.calls_of("apply").len(), 1);
}

#[tokio::test]
async fn test_resume_without_saved_failover_zone_fails_deploy() {
    let h = harness();
    let dir = h.example(examples::MYSQL_REPLICAS);
    save_string(&dir, keys::REGION, "europe-north1").unwrap();
    save_string(&dir, keys::PROJECT, "test-project").unwrap();
    save_string(&dir, keys::MASTER_ZONE, "europe-north1-a").unwrap();
    save_string(&dir, keys::READ_REPLICA_ZONE, "europe-north1-c").unwrap();

    let err = mysql_replicas(&h.context_with_env(&[
        ("SKIP_bootstrap", "true"),
        ("SKIP_teardown", "true"),
    ]))
    .await
    .unwrap_err();

    match assert_failed_in(&err, stages::DEPLOY) {
        HarnessError::MissingValue { key, .. } => assert_eq!(key, keys::FAILOVER_REPLICA_ZONE),
        other => panic!("expected a missing value, got {other}"),
    }
    assert!(h.cloud.calls_of("apply").is_empty());
}
