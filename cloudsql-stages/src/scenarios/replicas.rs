//! Replicas scenarios: a master with read replicas that must reject writes.

use super::options::replicas_options;
use super::steps::{self, IdCheck, ZonePlan};
use super::ScenarioContext;
use crate::consts::{examples, outputs, prefixes, stages, AUTO_INCREMENT_STEP_REPLICAS};
use crate::errors::{HarnessError, Result};
use crate::sql::Engine;
use crate::stages::RunReport;

const NUM_READ_REPLICAS: u32 = 1;

struct Replicas {
    engine: Engine,
    prefix: &'static str,
    example: &'static str,
    zones: ZonePlan,
    ids: IdCheck,
}

/// MySQL master with a failover replica and one read replica.
pub async fn mysql_replicas(ctx: &ScenarioContext) -> Result<RunReport> {
    run(
        ctx,
        Replicas {
            engine: Engine::MySql,
            prefix: prefixes::MYSQL_REPLICAS,
            example: examples::MYSQL_REPLICAS,
            zones: ZonePlan::MasterFailoverRead,
            ids: IdCheck::AutoIncrement(AUTO_INCREMENT_STEP_REPLICAS),
        },
    )
    .await
}

/// PostgreSQL master with one read replica.
///
/// The test table is dropped before teardown.
pub async fn postgres_replicas(ctx: &ScenarioContext) -> Result<RunReport> {
    run(
        ctx,
        Replicas {
            engine: Engine::Postgres,
            prefix: prefixes::POSTGRES_REPLICAS,
            example: examples::POSTGRES_REPLICAS,
            zones: ZonePlan::MasterRead,
            ids: IdCheck::Positive,
        },
    )
    .await
}

async fn run(ctx: &ScenarioContext, scenario: Replicas) -> Result<RunReport> {
    let Replicas {
        engine,
        prefix,
        example,
        zones,
        ids,
    } = scenario;
    let with_failover = zones == ZonePlan::MasterFailoverRead;
    let copy = ctx.module_copy()?;
    let dir = copy.example(example);
    let runner = ctx.runner(prefix);

    let forward = async {
        runner
            .run_stage(stages::BOOTSTRAP, || steps::bootstrap_with_zones(ctx, &dir, zones))
            .await?;

        let (teardown_ctx, teardown_dir) = (ctx.clone(), dir.clone());
        runner.defer_stage(stages::TEARDOWN, move || async move {
            steps::teardown(&teardown_ctx, &teardown_dir).await
        });
        if engine == Engine::Postgres {
            let (cleanup_ctx, cleanup_dir) = (ctx.clone(), dir.clone());
            runner.defer_stage(stages::CLEANUP_POSTGRES_OBJECTS, move || async move {
                steps::cleanup_postgres_objects(&cleanup_ctx, &cleanup_dir).await
            });
        }

        runner
            .run_stage(stages::DEPLOY, || {
                steps::deploy(ctx, &dir, |project, region| {
                    let placement = steps::load_placement(&dir, zones, NUM_READ_REPLICAS)?;
                    Ok(replicas_options(engine, project, region, &dir, prefix, &placement))
                })
            })
            .await?;

        runner
            .run_stage(stages::VALIDATE_OUTPUTS, || async {
                steps::validate_outputs(
                    ctx,
                    &dir,
                    prefix,
                    outputs::MASTER_INSTANCE_NAME,
                    outputs::MASTER_PROXY_CONNECTION,
                )
                .await?;
                steps::validate_replica_outputs(ctx, &dir, prefix, with_failover).await
            })
            .await?;

        runner
            .run_stage(stages::SQL_TESTS, || {
                steps::sql_tests(ctx, &dir, engine, outputs::MASTER_PUBLIC_IP, ids)
            })
            .await?;

        runner
            .run_stage(stages::READ_REPLICA_TESTS, || {
                steps::read_replica_tests(ctx, &dir, engine)
            })
            .await?;

        Ok::<_, HarnessError>(())
    }
    .await;

    copy.retain_on_failure(runner.finish(forward).await)
}
