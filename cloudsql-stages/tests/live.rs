//! Scenarios against a real project.
//!
//! Requires `terraform`, `gcloud` and `cloud-sql-proxy` on `PATH`, a project
//! id in `GOOGLE_CLOUD_PROJECT` and application default credentials. Run
//! with `cargo test --features live --test live -- --test-threads 5`.
//!
//! Set `SKIP_<stage>=true` to resume a failed run; any toggle makes the
//! scenarios work in the source tree instead of a scratch copy.

#![cfg(feature = "live")]

use anyhow::Context;
use tracing::info;

use cloudsql_stages::observability::init_logging;
use cloudsql_stages::scenarios::{
    cloud_sql_mysql, mysql_public_ip, mysql_replicas, postgres_public_ip, postgres_replicas,
    ScenarioContext,
};
use cloudsql_stages::testing::assert_run_succeeded;

fn context() -> anyhow::Result<ScenarioContext> {
    let ctx = ScenarioContext::from_process_env().context("resolving harness configuration")?;
    let _ = init_logging(ctx.config.log_format);
    Ok(ctx)
}

#[tokio::test]
async fn live_cloud_sql_mysql() -> anyhow::Result<()> {
    let report = cloud_sql_mysql(&context()?).await?;
    info!(summary = %report.summary(), "cloud-sql-mysql finished");
    assert_run_succeeded(&report);
    Ok(())
}

#[tokio::test]
async fn live_mysql_public_ip() -> anyhow::Result<()> {
    let report = mysql_public_ip(&context()?).await?;
    assert_run_succeeded(&report);
    Ok(())
}

#[tokio::test]
async fn live_postgres_public_ip() -> anyhow::Result<()> {
    let report = postgres_public_ip(&context()?).await?;
    assert_run_succeeded(&report);
    Ok(())
}

#[tokio::test]
async fn live_mysql_replicas() -> anyhow::Result<()> {
    let report = mysql_replicas(&context()?).await?;
    assert_run_succeeded(&report);
    Ok(())
}

#[tokio::test]
async fn live_postgres_replicas() -> anyhow::Result<()> {
    let report = postgres_replicas(&context()?).await?;
    assert_run_succeeded(&report);
    Ok(())
}
