//! Shared names and values used by every scenario.
//!
//! Credentials, state keys, Terraform output names and SQL statements live
//! here once instead of being redefined per scenario.

#![allow(missing_docs)]

/// Database created by every example module.
pub const DB_NAME: &str = "testdb";
/// Master user created by every example module.
pub const DB_USER: &str = "testuser";
/// Master user password.
pub const DB_PASS: &str = "testpassword";

/// Engine versions passed to the modules.
pub mod versions {
    /// MySQL engine version.
    pub const MYSQL: &str = "MYSQL_5_7";
    /// PostgreSQL engine version.
    pub const POSTGRES: &str = "POSTGRES_9_6";
}

/// Keys of values persisted between stages.
pub mod keys {
    /// Region chosen at bootstrap.
    pub const REGION: &str = "region";
    /// Project id resolved at bootstrap.
    pub const PROJECT: &str = "project";
    /// Zone of the master instance.
    pub const MASTER_ZONE: &str = "master_zone";
    /// Zone of the failover replica.
    pub const FAILOVER_REPLICA_ZONE: &str = "failover_replica_zone";
    /// Zone of the read replica.
    pub const READ_REPLICA_ZONE: &str = "read_replica_zone";
    /// Provisioning options saved by `deploy`.
    pub const PROVISION_OPTIONS: &str = "TerraformOptions";
}

/// Terraform output names.
pub mod outputs {
    /// Instance name of the single-instance example.
    pub const INSTANCE_NAME: &str = "instance_name";
    /// Proxy connection of the single-instance example.
    pub const PROXY_CONNECTION: &str = "proxy_connection";
    /// Public IP of the single-instance example.
    pub const PUBLIC_IP: &str = "public_ip";
    /// Database name.
    pub const DB_NAME: &str = "db_name";

    pub const MASTER_INSTANCE_NAME: &str = "master_instance_name";
    pub const MASTER_PROXY_CONNECTION: &str = "master_proxy_connection";
    pub const MASTER_PUBLIC_IP: &str = "master_public_ip_address";
    pub const MASTER_CA_CERT: &str = "master_ca_cert";

    pub const FAILOVER_INSTANCE_NAME: &str = "failover_instance_name";
    pub const FAILOVER_PROXY_CONNECTION: &str = "failover_proxy_connection";

    pub const READ_REPLICA_INSTANCE_NAMES: &str = "read_replica_instance_names";
    pub const READ_REPLICA_PROXY_CONNECTIONS: &str = "read_replica_proxy_connections";
    pub const READ_REPLICA_PUBLIC_IPS: &str = "read_replica_public_ip_addresses";

    /// Client certificate issued by the `client-certificate` module.
    pub const CLIENT_CA_CERT: &str = "client_ca_cert";
    /// Private key of the client certificate.
    pub const CLIENT_PRIVATE_KEY: &str = "client_private_key";
}

/// Terraform variable names.
pub mod vars {
    pub const REGION: &str = "region";
    pub const PROJECT: &str = "project";
    pub const NAME_PREFIX: &str = "name_prefix";
    pub const MYSQL_VERSION: &str = "mysql_version";
    pub const POSTGRES_VERSION: &str = "postgres_version";
    pub const DB_NAME: &str = "db_name";
    pub const MASTER_USER_NAME: &str = "master_user_name";
    pub const MASTER_USER_PASSWORD: &str = "master_user_password";
    pub const MASTER_ZONE: &str = "master_zone";
    pub const ENABLE_FAILOVER_REPLICA: &str = "enable_failover_replica";
    pub const FAILOVER_REPLICA_ZONE: &str = "failover_replica_zone";
    pub const NUM_READ_REPLICAS: &str = "num_read_replicas";
    pub const READ_REPLICA_ZONES: &str = "read_replica_zones";
    pub const COMMON_NAME: &str = "common_name";
    pub const DATABASE_INSTANCE_NAME: &str = "database_instance_name";
    pub const REQUIRE_SSL: &str = "require_ssl";
}

/// Example module folders under the examples root.
pub mod examples {
    pub const CLOUD_SQL_MYSQL: &str = "cloud-sql-mysql";
    pub const MYSQL_PUBLIC_IP: &str = "mysql-public-ip";
    pub const MYSQL_REPLICAS: &str = "mysql-replicas";
    pub const POSTGRES_PUBLIC_IP: &str = "postgres-public-ip";
    pub const POSTGRES_REPLICAS: &str = "postgres-replicas";
    pub const CLIENT_CERTIFICATE: &str = "client-certificate";
}

/// Instance name prefixes per scenario.
pub mod prefixes {
    pub const MYSQL_TEST: &str = "mysql-test";
    pub const MYSQL_PUBLIC: &str = "mysql-public";
    pub const MYSQL_REPLICAS: &str = "mysql-replicas";
    pub const POSTGRES_PUBLIC: &str = "postgres-public";
    pub const POSTGRES_REPLICAS: &str = "postgres-replicas";
}

/// Stage names. A stage is skipped when `SKIP_<name>` is set.
pub mod stages {
    pub const BOOTSTRAP: &str = "bootstrap";
    pub const DEPLOY: &str = "deploy";
    pub const VALIDATE_OUTPUTS: &str = "validate_outputs";
    pub const SQL_TESTS: &str = "sql_tests";
    pub const PROXY_TESTS: &str = "proxy_tests";
    pub const READ_REPLICA_TESTS: &str = "read_replica_tests";
    pub const DEPLOY_CERT: &str = "deploy_cert";
    pub const REDEPLOY: &str = "redeploy";
    pub const SSL_SQL_TESTS: &str = "ssl_sql_tests";
    pub const CLEANUP_POSTGRES_OBJECTS: &str = "cleanup_postgres_objects";
    pub const TEARDOWN_CERT: &str = "teardown_cert";
    pub const TEARDOWN: &str = "teardown";
}

/// SQL statements shared by both engines.
pub mod sql {
    pub const EMPTY_TEST_TABLE: &str = "DELETE FROM test";
    pub const QUERY_ROW_COUNT: &str = "SELECT count(*) FROM test";
}

/// MySQL statements.
pub mod mysql {
    pub const CREATE_TEST_TABLE_WITH_AUTO_INCREMENT: &str = concat!(
        "CREATE TABLE IF NOT EXISTS test ",
        "(id int NOT NULL AUTO_INCREMENT, name varchar(10) NOT NULL, PRIMARY KEY (ID))"
    );
    pub const INSERT_TEST_ROW: &str = "INSERT INTO test(name) VALUES(?)";
}

/// PostgreSQL statements.
pub mod postgres {
    pub const CREATE_TEST_TABLE_WITH_SERIAL: &str =
        "CREATE TABLE IF NOT EXISTS test (id SERIAL, name varchar(10) NOT NULL, PRIMARY KEY (ID))";
    pub const INSERT_TEST_ROW: &str = "INSERT INTO test(name) VALUES($1) RETURNING id";
    pub const DROP_TEST_TABLE: &str = "DROP TABLE IF EXISTS test";
}

/// Auto-increment step configured on the single-instance and public-IP MySQL examples.
pub const AUTO_INCREMENT_STEP: i64 = 5;
/// Auto-increment step configured on the MySQL replicas example.
pub const AUTO_INCREMENT_STEP_REPLICAS: i64 = 7;

/// Suffix appended to the master instance name to form the client certificate common name.
pub const CLIENT_CERT_SUFFIX: &str = "-client";

/// Names written into the test table.
pub mod rows {
    pub const SQL_TEST: &str = "Grunt";
    pub const PROXY_TEST: &str = "Grunt2";
    pub const READ_ONLY_TEST: &str = "ReadOnlyGrunt";
}
