use super::options::mysql_options;
use super::steps::{self, IdCheck};
use super::ScenarioContext;
use crate::consts::{examples, outputs, prefixes, stages, AUTO_INCREMENT_STEP};
use crate::errors::{HarnessError, Result};
use crate::sql::Engine;
use crate::stages::RunReport;

/// Deploys the single-instance MySQL example, checks its outputs and an
/// auto-increment insert, then destroys it.
pub async fn cloud_sql_mysql(ctx: &ScenarioContext) -> Result<RunReport> {
    let copy = ctx.module_copy()?;
    let dir = copy.example(examples::CLOUD_SQL_MYSQL);
    let runner = ctx.runner(prefixes::MYSQL_TEST);

    let forward = async {
        runner
            .run_stage(stages::BOOTSTRAP, || steps::bootstrap(ctx, &dir))
            .await?;

        let (teardown_ctx, teardown_dir) = (ctx.clone(), dir.clone());
        runner.defer_stage(stages::TEARDOWN, move || async move {
            steps::teardown(&teardown_ctx, &teardown_dir).await
        });

        runner
            .run_stage(stages::DEPLOY, || {
                steps::deploy(ctx, &dir, |project, region| {
                    Ok(mysql_options(project, region, &dir, prefixes::MYSQL_TEST))
                })
            })
            .await?;

        runner
            .run_stage(stages::VALIDATE_OUTPUTS, || {
                steps::validate_outputs(
                    ctx,
                    &dir,
                    prefixes::MYSQL_TEST,
                    outputs::INSTANCE_NAME,
                    outputs::PROXY_CONNECTION,
                )
            })
            .await?;

        runner
            .run_stage(stages::SQL_TESTS, || {
                steps::sql_tests(
                    ctx,
                    &dir,
                    Engine::MySql,
                    outputs::PUBLIC_IP,
                    IdCheck::AutoIncrement(AUTO_INCREMENT_STEP),
                )
            })
            .await?;

        Ok::<_, HarnessError>(())
    }
    .await;

    copy.retain_on_failure(runner.finish(forward).await)
}
