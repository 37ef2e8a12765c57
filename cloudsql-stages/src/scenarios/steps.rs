//! Stage bodies shared by the scenarios.

use std::path::Path;
use tracing::{info, warn};

use super::options::{client_cert_options, require_ssl, ReplicaPlacement};
use super::ScenarioContext;
use crate::consts::{keys, outputs, postgres, rows, sql, CLIENT_CERT_SUFFIX};
use crate::errors::{HarnessError, Result};
use crate::gcp::{project_id_from_env, random_region, random_zone, two_distinct_zones};
use crate::provision::ProvisionOptions;
use crate::sql::{Engine, SqlConnection, SqlEndpoint, TlsMaterial};
use crate::state::{load_options, load_string, save_options, save_string};
use crate::validate::{
    expect_auto_increment, expect_denied, expect_positive_id, expect_proxy_connection,
    expect_prefix, expect_read_only_rejection, validate_instance_outputs, InstanceOutputs,
};

/// How an inserted id is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdCheck {
    /// MySQL auto-increment with the given step.
    AutoIncrement(i64),
    /// PostgreSQL serial.
    Positive,
}

impl IdCheck {
    fn check(self, id: i64) -> Result<()> {
        match self {
            Self::AutoIncrement(step) => expect_auto_increment(id, step),
            Self::Positive => expect_positive_id(id),
        }
    }
}

/// How the replicas scenarios place their instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonePlan {
    /// Master and failover in distinct zones, read replica anywhere.
    MasterFailoverRead,
    /// Master and read replica in distinct zones, no failover.
    MasterRead,
}

fn create_test_table(engine: Engine) -> &'static str {
    match engine {
        Engine::MySql => crate::consts::mysql::CREATE_TEST_TABLE_WITH_AUTO_INCREMENT,
        Engine::Postgres => postgres::CREATE_TEST_TABLE_WITH_SERIAL,
    }
}

async fn close_quietly(conn: Box<dyn SqlConnection>) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close connection");
    }
}

/// Resolves the project and picks a region.
pub async fn bootstrap(ctx: &ScenarioContext, dir: &Path) -> Result<()> {
    let project = project_id_from_env(ctx.env.as_ref())?;
    let region = random_region(&ctx.config.approved_regions, &ctx.config.forbidden_regions)?;
    save_string(dir, keys::REGION, &region)?;
    save_string(dir, keys::PROJECT, &project)?;
    info!(project = %project, region = %region, "Bootstrapped");
    Ok(())
}

/// [`bootstrap`] plus the zones of a master and its replicas.
pub async fn bootstrap_with_zones(
    ctx: &ScenarioContext,
    dir: &Path,
    plan: ZonePlan,
) -> Result<()> {
    bootstrap(ctx, dir).await?;
    let project = load_string(dir, keys::PROJECT)?;
    let region = load_string(dir, keys::REGION)?;
    let zones = ctx.zones.as_ref();

    match plan {
        ZonePlan::MasterFailoverRead => {
            let (master, failover) = two_distinct_zones(zones, &project, &region).await?;
            let read = random_zone(zones, &project, &region).await?;
            save_string(dir, keys::MASTER_ZONE, &master)?;
            save_string(dir, keys::FAILOVER_REPLICA_ZONE, &failover)?;
            save_string(dir, keys::READ_REPLICA_ZONE, &read)?;
        }
        ZonePlan::MasterRead => {
            let (master, read) = two_distinct_zones(zones, &project, &region).await?;
            save_string(dir, keys::MASTER_ZONE, &master)?;
            save_string(dir, keys::READ_REPLICA_ZONE, &read)?;
        }
    }
    Ok(())
}

/// Loads the zones [`bootstrap_with_zones`] saved for `plan`.
pub fn load_placement(
    dir: &Path,
    plan: ZonePlan,
    num_read_replicas: u32,
) -> Result<ReplicaPlacement> {
    let failover_zone = match plan {
        ZonePlan::MasterFailoverRead => Some(load_string(dir, keys::FAILOVER_REPLICA_ZONE)?),
        ZonePlan::MasterRead => None,
    };
    Ok(ReplicaPlacement {
        master_zone: load_string(dir, keys::MASTER_ZONE)?,
        failover_zone,
        read_replica_zone: load_string(dir, keys::READ_REPLICA_ZONE)?,
        num_read_replicas,
    })
}

/// Builds options from the saved project and region, saves them and applies.
pub async fn deploy<F>(ctx: &ScenarioContext, dir: &Path, build: F) -> Result<()>
where
    F: FnOnce(&str, &str) -> Result<ProvisionOptions>,
{
    let region = load_string(dir, keys::REGION)?;
    let project = load_string(dir, keys::PROJECT)?;
    let options = build(&project, &region)?;
    save_options(dir, &options)?;
    ctx.provisioner.init_and_apply(&options).await
}

/// Destroys whatever the saved options describe.
pub async fn teardown(ctx: &ScenarioContext, dir: &Path) -> Result<()> {
    let options = load_options(dir)?;
    ctx.provisioner.destroy(&options).await
}

/// Checks the master outputs of a deployment.
pub async fn validate_outputs(
    ctx: &ScenarioContext,
    dir: &Path,
    prefix: &str,
    instance_name_output: &str,
    proxy_connection_output: &str,
) -> Result<()> {
    let options = load_options(dir)?;
    let region = load_string(dir, keys::REGION)?;
    let project = load_string(dir, keys::PROJECT)?;

    let master = InstanceOutputs::read(
        ctx.provisioner.as_ref(),
        &options,
        instance_name_output,
        proxy_connection_output,
        Some(outputs::DB_NAME),
    )
    .await?;
    validate_instance_outputs(&master, prefix, &project, &region)
}

/// Checks the failover and first read replica outputs.
pub async fn validate_replica_outputs(
    ctx: &ScenarioContext,
    dir: &Path,
    prefix: &str,
    with_failover: bool,
) -> Result<()> {
    let options = load_options(dir)?;
    let region = load_string(dir, keys::REGION)?;
    let project = load_string(dir, keys::PROJECT)?;
    let provisioner = ctx.provisioner.as_ref();

    if with_failover {
        let failover = InstanceOutputs::read(
            provisioner,
            &options,
            outputs::FAILOVER_INSTANCE_NAME,
            outputs::FAILOVER_PROXY_CONNECTION,
            None,
        )
        .await?;
        validate_instance_outputs(&failover, prefix, &project, &region)?;
    }

    let names = provisioner
        .output_list(&options, outputs::READ_REPLICA_INSTANCE_NAMES)
        .await?;
    let connections = provisioner
        .output_list(&options, outputs::READ_REPLICA_PROXY_CONNECTIONS)
        .await?;
    let (Some(name), Some(connection)) = (names.first(), connections.first()) else {
        return Err(HarnessError::assertion(
            "read replica outputs",
            "at least one read replica",
            format!("{} names, {} connections", names.len(), connections.len()),
        ));
    };
    expect_prefix("read replica instance name", name, prefix)?;
    expect_proxy_connection("read replica proxy connection", &project, &region, name, connection)
}

/// Connects to the master over its public IP and checks an insert.
pub async fn sql_tests(
    ctx: &ScenarioContext,
    dir: &Path,
    engine: Engine,
    public_ip_output: &str,
    ids: IdCheck,
) -> Result<()> {
    let options = load_options(dir)?;
    let public_ip = ctx.provisioner.output(&options, public_ip_output).await?;
    info!(host = %public_ip, "Connecting");

    let mut conn = ctx
        .connector
        .connect(&SqlEndpoint::new(engine, public_ip), None)
        .await?;
    let outcome = insert_fresh_row(conn.as_mut(), ids).await;
    close_quietly(conn).await;
    outcome
}

async fn insert_fresh_row(conn: &mut dyn SqlConnection, ids: IdCheck) -> Result<()> {
    conn.ping().await?;
    conn.execute(create_test_table(conn.engine())).await?;
    conn.execute(sql::EMPTY_TEST_TABLE).await?;
    let id = conn.insert_returning_id(rows::SQL_TEST).await?;
    info!(id, "Inserted row");
    ids.check(id)
}

/// Connects through the Cloud SQL proxy and checks an insert.
pub async fn proxy_tests(
    ctx: &ScenarioContext,
    dir: &Path,
    engine: Engine,
    proxy_connection_output: &str,
    ids: IdCheck,
) -> Result<()> {
    let options = load_options(dir)?;
    let connection_name = ctx.provisioner.output(&options, proxy_connection_output).await?;
    info!(connection = %connection_name, "Connecting via Cloud SQL proxy");

    let mut conn = ctx.connector.connect_via_proxy(engine, &connection_name).await?;
    let outcome = async {
        conn.ping().await?;
        let id = conn.insert_returning_id(rows::PROXY_TEST).await?;
        info!(id, "Inserted row via proxy");
        ids.check(id)
    }
    .await;
    close_quietly(conn).await;
    outcome
}

/// Issues a client certificate for the master instance.
pub async fn deploy_cert(ctx: &ScenarioContext, dir: &Path, cert_dir: &Path) -> Result<()> {
    let region = load_string(dir, keys::REGION)?;
    let project = load_string(dir, keys::PROJECT)?;
    let options = load_options(dir)?;
    let instance_name = ctx
        .provisioner
        .output(&options, outputs::MASTER_INSTANCE_NAME)
        .await?;
    let common_name = format!("{instance_name}{CLIENT_CERT_SUFFIX}");

    let cert_options =
        client_cert_options(&project, &region, cert_dir, &common_name, &instance_name);
    save_options(cert_dir, &cert_options)?;
    ctx.provisioner.init_and_apply(&cert_options).await
}

/// Re-applies the saved options with TLS enforced.
pub async fn redeploy_with_ssl(ctx: &ScenarioContext, dir: &Path) -> Result<()> {
    let mut options = load_options(dir)?;
    require_ssl(&mut options);
    ctx.provisioner.init_and_apply(&options).await
}

/// Checks that a plain connection is refused and a client-certificate one works.
///
/// On PostgreSQL the test table is dropped over the TLS connection.
pub async fn ssl_sql_tests(
    ctx: &ScenarioContext,
    dir: &Path,
    cert_dir: &Path,
    engine: Engine,
) -> Result<()> {
    let options = load_options(dir)?;
    let cert_options = load_options(cert_dir)?;
    let public_ip = ctx
        .provisioner
        .output(&options, outputs::MASTER_PUBLIC_IP)
        .await?;
    let endpoint = SqlEndpoint::new(engine, public_ip);

    info!(host = %endpoint.host, "Pinging without TLS");
    let plain = match ctx.connector.connect(&endpoint, None).await {
        Ok(mut conn) => {
            let pinged = conn.ping().await;
            // Closed before the TLS connection is opened.
            close_quietly(conn).await;
            pinged
        }
        Err(e) => Err(e),
    };
    expect_denied("unencrypted ping", plain)?;

    let provisioner = ctx.provisioner.as_ref();
    let tls = TlsMaterial::new(
        provisioner.output(&options, outputs::MASTER_CA_CERT).await?,
        provisioner.output(&cert_options, outputs::CLIENT_CA_CERT).await?,
        provisioner.output(&cert_options, outputs::CLIENT_PRIVATE_KEY).await?,
    );

    info!(host = %endpoint.host, "Pinging with client certificate");
    let mut conn = ctx.connector.connect(&endpoint, Some(&tls)).await?;
    let outcome = async {
        conn.ping().await?;
        if engine == Engine::Postgres {
            conn.execute(postgres::DROP_TEST_TABLE).await?;
        }
        Ok::<_, HarnessError>(())
    }
    .await;
    close_quietly(conn).await;
    outcome
}

/// Checks that the first read replica rejects writes and serves reads.
pub async fn read_replica_tests(ctx: &ScenarioContext, dir: &Path, engine: Engine) -> Result<()> {
    let options = load_options(dir)?;
    let ips = ctx
        .provisioner
        .output_list(&options, outputs::READ_REPLICA_PUBLIC_IPS)
        .await?;
    let replica_ip = ips.first().cloned().ok_or_else(|| {
        HarnessError::assertion("read replica public IPs", "at least one", "none")
    })?;
    info!(host = %replica_ip, "Connecting to read replica");

    let mut conn = ctx
        .connector
        .connect(&SqlEndpoint::new(engine, replica_ip), None)
        .await?;
    let outcome = async {
        conn.ping().await?;
        let write = conn.insert_returning_id(rows::READ_ONLY_TEST).await;
        expect_read_only_rejection("insert on read replica", write)?;
        let count = conn.count_rows().await?;
        info!(count, "Read replica serves reads");
        Ok::<_, HarnessError>(())
    }
    .await;
    close_quietly(conn).await;
    outcome
}

/// Drops the test table on the master.
pub async fn cleanup_postgres_objects(ctx: &ScenarioContext, dir: &Path) -> Result<()> {
    let options = load_options(dir)?;
    let public_ip = ctx
        .provisioner
        .output(&options, outputs::MASTER_PUBLIC_IP)
        .await?;
    let mut conn = ctx
        .connector
        .connect(&SqlEndpoint::new(Engine::Postgres, public_ip), None)
        .await?;
    let outcome = conn.execute(postgres::DROP_TEST_TABLE).await;
    close_quietly(conn).await;
    outcome
}

