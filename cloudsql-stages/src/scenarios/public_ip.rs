//! Public IP scenarios: plain, proxied and client-certificate connections.

use super::options::cloud_sql_options;
use super::steps::{self, IdCheck};
use super::ScenarioContext;
use crate::consts::{examples, outputs, prefixes, stages, AUTO_INCREMENT_STEP};
use crate::errors::{HarnessError, Result};
use crate::sql::Engine;
use crate::stages::RunReport;

struct PublicIp {
    engine: Engine,
    prefix: &'static str,
    example: &'static str,
    ids: IdCheck,
}

/// MySQL instance with a public IP, later locked down to TLS.
pub async fn mysql_public_ip(ctx: &ScenarioContext) -> Result<RunReport> {
    run(
        ctx,
        PublicIp {
            engine: Engine::MySql,
            prefix: prefixes::MYSQL_PUBLIC,
            example: examples::MYSQL_PUBLIC_IP,
            ids: IdCheck::AutoIncrement(AUTO_INCREMENT_STEP),
        },
    )
    .await
}

/// PostgreSQL instance with a public IP, later locked down to TLS.
pub async fn postgres_public_ip(ctx: &ScenarioContext) -> Result<RunReport> {
    run(
        ctx,
        PublicIp {
            engine: Engine::Postgres,
            prefix: prefixes::POSTGRES_PUBLIC,
            example: examples::POSTGRES_PUBLIC_IP,
            ids: IdCheck::Positive,
        },
    )
    .await
}

async fn run(ctx: &ScenarioContext, scenario: PublicIp) -> Result<RunReport> {
    let PublicIp {
        engine,
        prefix,
        example,
        ids,
    } = scenario;
    let copy = ctx.module_copy()?;
    let dir = copy.example(example);
    let cert_dir = copy.example(examples::CLIENT_CERTIFICATE);
    let runner = ctx.runner(prefix);

    let forward = async {
        runner
            .run_stage(stages::BOOTSTRAP, || steps::bootstrap(ctx, &dir))
            .await?;

        let (teardown_ctx, teardown_dir) = (ctx.clone(), dir.clone());
        runner.defer_stage(stages::TEARDOWN, move || async move {
            steps::teardown(&teardown_ctx, &teardown_dir).await
        });
        let (cert_ctx, cert_teardown_dir) = (ctx.clone(), cert_dir.clone());
        runner.defer_stage(stages::TEARDOWN_CERT, move || async move {
            steps::teardown(&cert_ctx, &cert_teardown_dir).await
        });

        runner
            .run_stage(stages::DEPLOY, || {
                steps::deploy(ctx, &dir, |project, region| {
                    Ok(cloud_sql_options(engine, project, region, &dir, prefix))
                })
            })
            .await?;

        runner
            .run_stage(stages::VALIDATE_OUTPUTS, || {
                steps::validate_outputs(
                    ctx,
                    &dir,
                    prefix,
                    outputs::MASTER_INSTANCE_NAME,
                    outputs::MASTER_PROXY_CONNECTION,
                )
            })
            .await?;

        runner
            .run_stage(stages::SQL_TESTS, || {
                steps::sql_tests(ctx, &dir, engine, outputs::MASTER_PUBLIC_IP, ids)
            })
            .await?;

        runner
            .run_stage(stages::PROXY_TESTS, || {
                steps::proxy_tests(ctx, &dir, engine, outputs::MASTER_PROXY_CONNECTION, ids)
            })
            .await?;

        runner
            .run_stage(stages::DEPLOY_CERT, || steps::deploy_cert(ctx, &dir, &cert_dir))
            .await?;

        runner
            .run_stage(stages::REDEPLOY, || steps::redeploy_with_ssl(ctx, &dir))
            .await?;

        runner
            .run_stage(stages::SSL_SQL_TESTS, || {
                steps::ssl_sql_tests(ctx, &dir, &cert_dir, engine)
            })
            .await?;

        Ok::<_, HarnessError>(())
    }
    .await;

    copy.retain_on_failure(runner.finish(forward).await)
}
