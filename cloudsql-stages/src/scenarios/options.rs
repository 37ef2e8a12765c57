//! Variable bundles passed to the example modules.

use serde_json::json;
use std::path::Path;

use crate::consts::{vars, versions, DB_NAME, DB_PASS, DB_USER};
use crate::provision::ProvisionOptions;
use crate::sql::Engine;

/// Zones of a master and its replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaPlacement {
    /// Zone of the master instance.
    pub master_zone: String,
    /// Zone of the failover replica, if there is one.
    pub failover_zone: Option<String>,
    /// Zone of every read replica.
    pub read_replica_zone: String,
    /// Number of read replicas.
    pub num_read_replicas: u32,
}

/// Options for the single-instance MySQL example.
#[must_use]
pub fn mysql_options(project: &str, region: &str, dir: &Path, prefix: &str) -> ProvisionOptions {
    cloud_sql_options(Engine::MySql, project, region, dir, prefix)
}

/// Options shared by every Cloud SQL example of `engine`.
#[must_use]
pub fn cloud_sql_options(
    engine: Engine,
    project: &str,
    region: &str,
    dir: &Path,
    prefix: &str,
) -> ProvisionOptions {
    let (version_var, version) = match engine {
        Engine::MySql => (vars::MYSQL_VERSION, versions::MYSQL),
        Engine::Postgres => (vars::POSTGRES_VERSION, versions::POSTGRES),
    };
    ProvisionOptions::new(dir)
        .with_var(vars::REGION, region)
        .with_var(vars::PROJECT, project)
        .with_var(vars::NAME_PREFIX, prefix)
        .with_var(version_var, version)
        .with_var(vars::DB_NAME, DB_NAME)
        .with_var(vars::MASTER_USER_NAME, DB_USER)
        .with_var(vars::MASTER_USER_PASSWORD, DB_PASS)
}

/// Options for the replicas examples.
#[must_use]
pub fn replicas_options(
    engine: Engine,
    project: &str,
    region: &str,
    dir: &Path,
    prefix: &str,
    placement: &ReplicaPlacement,
) -> ProvisionOptions {
    let mut options = cloud_sql_options(engine, project, region, dir, prefix)
        .with_var(vars::MASTER_ZONE, placement.master_zone.as_str())
        .with_var(vars::NUM_READ_REPLICAS, placement.num_read_replicas)
        .with_var(vars::READ_REPLICA_ZONES, json!([placement.read_replica_zone]));
    if let Some(zone) = &placement.failover_zone {
        options.set_var(vars::ENABLE_FAILOVER_REPLICA, true);
        options.set_var(vars::FAILOVER_REPLICA_ZONE, zone.as_str());
    }
    options
}

/// Options for the client certificate example.
#[must_use]
pub fn client_cert_options(
    project: &str,
    region: &str,
    dir: &Path,
    common_name: &str,
    instance_name: &str,
) -> ProvisionOptions {
    ProvisionOptions::new(dir)
        .with_var(vars::REGION, region)
        .with_var(vars::PROJECT, project)
        .with_var(vars::COMMON_NAME, common_name)
        .with_var(vars::DATABASE_INSTANCE_NAME, instance_name)
}

/// Forces TLS on the instance.
pub fn require_ssl(options: &mut ProvisionOptions) {
    options.set_var(vars::REQUIRE_SSL, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mysql_options() {
        let options = mysql_options(
            "proj",
            "europe-north1",
            Path::new("/tmp/cloud-sql-mysql"),
            "mysql-test",
        );
        assert_eq!(options.var_str("name_prefix"), Some("mysql-test"));
        assert_eq!(options.var_str("mysql_version"), Some("MYSQL_5_7"));
        assert_eq!(options.var_str("master_user_name"), Some("testuser"));
        assert_eq!(options.var_str("master_user_password"), Some("testpassword"));
        assert_eq!(options.var_str("db_name"), Some("testdb"));
        assert_eq!(options.vars.len(), 7);
    }

    #[test]
    fn test_postgres_version_var() {
        let options = cloud_sql_options(
            Engine::Postgres,
            "proj",
            "europe-north1",
            Path::new("/tmp/pg"),
            "postgres-public",
        );
        assert_eq!(options.var_str("postgres_version"), Some("POSTGRES_9_6"));
        assert!(options.var("mysql_version").is_none());
    }

    #[test]
    fn test_replicas_with_failover() {
        let placement = ReplicaPlacement {
            master_zone: "europe-north1-a".to_string(),
            failover_zone: Some("europe-north1-b".to_string()),
            read_replica_zone: "europe-north1-c".to_string(),
            num_read_replicas: 1,
        };
        let options = replicas_options(
            Engine::MySql,
            "proj",
            "europe-north1",
            Path::new("/tmp/r"),
            "mysql-replicas",
            &placement,
        );

        assert_eq!(options.var("enable_failover_replica"), Some(&json!(true)));
        assert_eq!(options.var_str("failover_replica_zone"), Some("europe-north1-b"));
        assert_eq!(options.var("num_read_replicas"), Some(&json!(1)));
        assert_eq!(options.var("read_replica_zones"), Some(&json!(["europe-north1-c"])));
    }

    #[test]
    fn test_replicas_without_failover() {
        let placement = ReplicaPlacement {
            master_zone: "europe-north1-a".to_string(),
            failover_zone: None,
            read_replica_zone: "europe-north1-b".to_string(),
            num_read_replicas: 1,
        };
        let options = replicas_options(
            Engine::Postgres,
            "proj",
            "europe-north1",
            Path::new("/tmp/r"),
            "postgres-replicas",
            &placement,
        );

        assert!(options.var("enable_failover_replica").is_none());
        assert!(options.var("failover_replica_zone").is_none());
        assert_eq!(options.var_str("master_zone"), Some("europe-north1-a"));
    }

    #[test]
    fn test_client_cert_and_require_ssl() {
        let mut options = client_cert_options(
            "proj",
            "europe-north1",
            Path::new("/tmp/cert"),
            "db-1-client",
            "db-1",
        );
        assert_eq!(options.var_str("common_name"), Some("db-1-client"));
        assert_eq!(options.var_str("database_instance_name"), Some("db-1"));

        require_ssl(&mut options);
        assert_eq!(options.var("require_ssl"), Some(&json!(true)));
    }
}
