//! In-memory stand-ins for the cloud, the provisioning tool and the SQL drivers.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::consts::{
    outputs, prefixes, vars, AUTO_INCREMENT_STEP, AUTO_INCREMENT_STEP_REPLICAS, DB_PASS, DB_USER,
};
use crate::errors::{DbError, HarnessError, ProvisionError, Result};
use crate::gcp::ZoneLister;
use crate::provision::{ProvisionOptions, Provisioner};
use crate::proxy::parse_connection_name;
use crate::sql::{Engine, SqlConnection, SqlConnector, SqlEndpoint, TlsMaterial};

/// An operation of [`FakeCloud`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `init` of any module.
    Init,
    /// `apply` of any module.
    Apply,
    /// `destroy` of any module.
    Destroy,
    /// Direct connections.
    Connect,
    /// Connections through the proxy.
    ProxyConnect,
}

#[derive(Debug)]
struct Table {
    exists: bool,
    rows: Vec<(i64, String)>,
    last_id: i64,
    step: i64,
}

#[derive(Debug)]
struct Instance {
    engine: Engine,
    dir: PathBuf,
    host: Option<String>,
    require_ssl: bool,
    read_only: bool,
    // Name of the master whose table this instance serves.
    master: String,
}

#[derive(Debug)]
struct Deployment {
    outputs: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct CloudState {
    initialized: HashSet<PathBuf>,
    deployments: BTreeMap<PathBuf, Deployment>,
    instances: BTreeMap<String, Instance>,
    tables: HashMap<String, Table>,
    next_ordinal: u32,
    steps: HashMap<String, i64>,
    failures: HashSet<FailPoint>,
    calls: Vec<String>,
    open_connections: usize,
}

impl CloudState {
    fn record(&mut self, call: String) {
        tracing::debug!(%call, "Fake cloud call");
        self.calls.push(call);
    }

    fn check(&self, point: FailPoint, command: &str, dir: &Path) -> Result<()> {
        if self.failures.contains(&point) {
            return Err(ProvisionError::new(
                command,
                dir.display().to_string(),
                Some(1),
                format!("injected failure at {point:?}"),
            )
            .into());
        }
        Ok(())
    }

    fn instance(&self, name: &str) -> Result<&Instance> {
        self.instances
            .get(name)
            .ok_or_else(|| HarnessError::connectivity(name, "server has gone away"))
    }

    fn instance_by_host(&self, host: &str) -> Option<(&String, &Instance)> {
        self.instances
            .iter()
            .find(|(_, i)| i.host.as_deref() == Some(host))
    }
}

fn label(dir: &Path) -> String {
    dir.file_name()
        .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn is_true(options: &ProvisionOptions, name: &str) -> bool {
    options.var(name).and_then(Value::as_bool).unwrap_or(false)
}

fn fake_pem(kind: &str, subject: &str) -> String {
    format!("-----BEGIN {kind}-----\n{subject}\n-----END {kind}-----\n")
}

/// A simulated Cloud SQL project.
///
/// Implements [`Provisioner`] by deriving module outputs from the variables
/// of each apply, and [`SqlConnector`] by serving the instances those
/// applies created. Read replicas share their master's table and reject
/// writes; instances applied with `require_ssl` refuse plain connections.
#[derive(Debug, Clone)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    /// Creates an empty project with the auto-increment steps of the example modules.
    #[must_use]
    pub fn new() -> Self {
        let mut state = CloudState {
            next_ordinal: 1,
            ..CloudState::default()
        };
        state.steps.insert(prefixes::MYSQL_TEST.to_string(), AUTO_INCREMENT_STEP);
        state.steps.insert(prefixes::MYSQL_PUBLIC.to_string(), AUTO_INCREMENT_STEP);
        state
            .steps
            .insert(prefixes::MYSQL_REPLICAS.to_string(), AUTO_INCREMENT_STEP_REPLICAS);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Overrides the MySQL auto-increment step for instances named `prefix-*`.
    #[must_use]
    pub fn with_auto_increment_step(self, prefix: &str, step: i64) -> Self {
        self.state.lock().steps.insert(prefix.to_string(), step);
        self
    }

    /// Makes every later call of `point` fail.
    pub fn fail_at(&self, point: FailPoint) {
        self.state.lock().failures.insert(point);
    }

    /// Removes an injected failure.
    pub fn clear_failure(&self, point: FailPoint) {
        self.state.lock().failures.remove(&point);
    }

    /// Every call so far, e.g. `apply mysql-public-ip` or `connect 10.0.1.1`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Calls starting with `verb`, e.g. `destroy`.
    #[must_use]
    pub fn calls_of(&self, verb: &str) -> Vec<String> {
        let prefix = format!("{verb} ");
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Folder names of modules that are currently applied.
    #[must_use]
    pub fn deployed(&self) -> Vec<String> {
        self.state.lock().deployments.keys().map(|d| label(d)).collect()
    }

    /// Folders `init` ran in, sorted.
    #[must_use]
    pub fn initialized_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.state.lock().initialized.iter().cloned().collect();
        dirs.sort();
        dirs
    }

    /// Names of all live instances.
    #[must_use]
    pub fn instance_names(&self) -> Vec<String> {
        self.state.lock().instances.keys().cloned().collect()
    }

    /// Number of connections opened and not yet closed.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state.lock().open_connections
    }

    /// Rows of the table served by `instance`.
    #[must_use]
    pub fn rows(&self, instance: &str) -> Vec<(i64, String)> {
        let state = self.state.lock();
        state
            .instances
            .get(instance)
            .and_then(|i| state.tables.get(&i.master))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn apply_instances(state: &mut CloudState, options: &ProvisionOptions) -> Result<()> {
        let dir = options.dir().to_path_buf();
        let prefix = options.var_str(vars::NAME_PREFIX).ok_or_else(|| {
            ProvisionError::new(
                "terraform apply",
                dir.display().to_string(),
                Some(1),
                "No value for required variable name_prefix",
            )
        })?;
        let project = options.var_str(vars::PROJECT).unwrap_or_default();
        let region = options.var_str(vars::REGION).unwrap_or_default();
        let engine = if options.var(vars::POSTGRES_VERSION).is_some() {
            Engine::Postgres
        } else {
            Engine::MySql
        };
        let require_ssl = is_true(options, vars::REQUIRE_SSL);

        if state.deployments.contains_key(&dir) {
            for instance in state.instances.values_mut().filter(|i| i.dir == dir) {
                instance.require_ssl = require_ssl;
            }
            state.record(format!("apply {}", label(&dir)));
            return Ok(());
        }

        let ordinal = state.next_ordinal;
        state.next_ordinal += 1;
        let master = format!("{prefix}-{ordinal:04}");
        let master_ip = format!("10.0.{ordinal}.1");
        let connection = |name: &str| format!("{project}:{region}:{name}");

        let mut values = BTreeMap::new();
        values.insert(outputs::INSTANCE_NAME.to_string(), json!(master));
        values.insert(outputs::MASTER_INSTANCE_NAME.to_string(), json!(master));
        values.insert(outputs::PROXY_CONNECTION.to_string(), json!(connection(&master)));
        values.insert(outputs::MASTER_PROXY_CONNECTION.to_string(), json!(connection(&master)));
        values.insert(outputs::PUBLIC_IP.to_string(), json!(master_ip));
        values.insert(outputs::MASTER_PUBLIC_IP.to_string(), json!(master_ip));
        values.insert(outputs::MASTER_CA_CERT.to_string(), json!(fake_pem("CERTIFICATE", &master)));
        if let Some(db_name) = options.var(vars::DB_NAME) {
            values.insert(outputs::DB_NAME.to_string(), db_name.clone());
        }

        let replica = |host: Option<String>| Instance {
            engine,
            dir: dir.clone(),
            host,
            require_ssl,
            read_only: true,
            master: master.clone(),
        };
        let mut created = vec![(
            master.clone(),
            Instance {
                read_only: false,
                ..replica(Some(master_ip.clone()))
            },
        )];

        if is_true(options, vars::ENABLE_FAILOVER_REPLICA) {
            let failover = format!("{master}-failover");
            values.insert(outputs::FAILOVER_INSTANCE_NAME.to_string(), json!(failover));
            values.insert(
                outputs::FAILOVER_PROXY_CONNECTION.to_string(),
                json!(connection(&failover)),
            );
            created.push((failover, replica(None)));
        }

        let replicas = options
            .var(vars::NUM_READ_REPLICAS)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let (mut names, mut connections, mut ips) = (Vec::new(), Vec::new(), Vec::new());
        for i in 0..replicas {
            let name = format!("{master}-replica-{i}");
            let ip = format!("10.0.{ordinal}.{}", i + 2);
            connections.push(connection(&name));
            names.push(name.clone());
            ips.push(ip.clone());
            created.push((name, replica(Some(ip))));
        }
        values.insert(outputs::READ_REPLICA_INSTANCE_NAMES.to_string(), json!(names));
        values.insert(outputs::READ_REPLICA_PROXY_CONNECTIONS.to_string(), json!(connections));
        values.insert(outputs::READ_REPLICA_PUBLIC_IPS.to_string(), json!(ips));

        let step = match engine {
            Engine::MySql => state.steps.get(prefix).copied().unwrap_or(1),
            Engine::Postgres => 1,
        };
        state.tables.insert(
            master.clone(),
            Table {
                exists: false,
                rows: Vec::new(),
                last_id: 0,
                step,
            },
        );
        state.instances.extend(created);
        state.deployments.insert(dir.clone(), Deployment { outputs: values });
        state.record(format!("apply {}", label(&dir)));
        Ok(())
    }

    fn apply_certificate(state: &mut CloudState, options: &ProvisionOptions) -> Result<()> {
        let dir = options.dir().to_path_buf();
        let common_name = options.var_str(vars::COMMON_NAME).unwrap_or_default();
        let instance = options.var_str(vars::DATABASE_INSTANCE_NAME).unwrap_or_default();
        if !state.instances.contains_key(instance) {
            return Err(ProvisionError::new(
                "terraform apply",
                dir.display().to_string(),
                Some(1),
                format!("instance '{instance}' does not exist"),
            )
            .into());
        }

        let mut values = BTreeMap::new();
        values.insert(
            outputs::CLIENT_CA_CERT.to_string(),
            json!(fake_pem("CERTIFICATE", common_name)),
        );
        values.insert(
            outputs::CLIENT_PRIVATE_KEY.to_string(),
            json!(fake_pem("PRIVATE KEY", common_name)),
        );
        state.deployments.insert(dir.clone(), Deployment { outputs: values });
        state.record(format!("apply {}", label(&dir)));
        Ok(())
    }
}

#[async_trait]
impl Provisioner for FakeCloud {
    async fn init(&self, options: &ProvisionOptions) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::Init, "terraform init", options.dir())?;
        state.initialized.insert(options.dir().to_path_buf());
        state.record(format!("init {}", label(options.dir())));
        Ok(())
    }

    async fn apply(&self, options: &ProvisionOptions) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::Apply, "terraform apply", options.dir())?;
        if !state.initialized.contains(options.dir()) {
            return Err(ProvisionError::new(
                "terraform apply",
                options.dir().display().to_string(),
                Some(1),
                "Module not installed; run terraform init",
            )
            .into());
        }
        if options.var(vars::COMMON_NAME).is_some() {
            Self::apply_certificate(&mut state, options)
        } else {
            Self::apply_instances(&mut state, options)
        }
    }

    async fn destroy(&self, options: &ProvisionOptions) -> Result<()> {
        let mut state = self.state.lock();
        let dir = options.dir();
        state.check(FailPoint::Destroy, "terraform destroy", dir)?;
        state.deployments.remove(dir);
        let doomed: Vec<String> = state
            .instances
            .iter()
            .filter(|(_, i)| i.dir == dir)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &doomed {
            state.instances.remove(name);
            state.tables.remove(name);
        }
        state.record(format!("destroy {}", label(dir)));
        Ok(())
    }

    async fn output_json(&self, options: &ProvisionOptions, name: &str) -> Result<Value> {
        let state = self.state.lock();
        state
            .deployments
            .get(options.dir())
            .and_then(|d| d.outputs.get(name))
            .cloned()
            .ok_or_else(|| {
                ProvisionError::new(
                    "terraform output",
                    options.dir().display().to_string(),
                    Some(1),
                    format!("Output \"{name}\" not found"),
                )
                .into()
            })
    }
}

#[async_trait]
impl SqlConnector for FakeCloud {
    async fn connect(
        &self,
        endpoint: &SqlEndpoint,
        tls: Option<&TlsMaterial>,
    ) -> Result<Box<dyn SqlConnection>> {
        let mut state = self.state.lock();
        let verb = if tls.is_some() { "connect_tls" } else { "connect" };
        state.record(format!("{verb} {}", endpoint.host));
        if state.failures.contains(&FailPoint::Connect) {
            return Err(HarnessError::connectivity(endpoint.target(), "injected failure"));
        }

        let (name, instance) = state
            .instance_by_host(&endpoint.host)
            .ok_or_else(|| HarnessError::connectivity(endpoint.target(), "connection refused"))?;
        let (name, engine) = (name.clone(), instance.engine);
        if engine != endpoint.engine {
            return Err(HarnessError::connectivity(endpoint.target(), "protocol mismatch"));
        }
        if instance.require_ssl && tls.is_none() {
            let code = match engine {
                Engine::MySql => "3159",
                Engine::Postgres => "28000",
            };
            return Err(DbError::new(
                engine,
                Some(code.to_string()),
                "Connections using insecure transport are prohibited",
            )
            .into());
        }
        if endpoint.user != DB_USER || endpoint.password != DB_PASS {
            let code = match engine {
                Engine::MySql => "1045",
                Engine::Postgres => "28P01",
            };
            return Err(DbError::new(engine, Some(code.to_string()), "Access denied").into());
        }

        state.open_connections += 1;
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
            instance: name,
            engine,
            target: endpoint.host.clone(),
        }))
    }

    async fn connect_via_proxy(
        &self,
        engine: Engine,
        connection_name: &str,
    ) -> Result<Box<dyn SqlConnection>> {
        let parsed = parse_connection_name(connection_name)?;
        let mut state = self.state.lock();
        state.record(format!("proxy {connection_name}"));
        if state.failures.contains(&FailPoint::ProxyConnect) {
            return Err(HarnessError::connectivity(connection_name, "injected failure"));
        }
        let instance = state.instances.get(&parsed.instance).ok_or_else(|| {
            HarnessError::connectivity(connection_name, "proxy did not start listening")
        })?;
        if instance.engine != engine {
            return Err(HarnessError::connectivity(connection_name, "protocol mismatch"));
        }

        state.open_connections += 1;
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
            instance: parsed.instance,
            engine,
            target: connection_name.to_string(),
        }))
    }
}

/// A connection handed out by [`FakeCloud`].
#[derive(Debug)]
pub struct FakeConnection {
    state: Arc<Mutex<CloudState>>,
    instance: String,
    engine: Engine,
    target: String,
}

impl FakeConnection {
    fn error(&self, mysql: &str, postgres: &str, message: &str) -> HarnessError {
        let code = match self.engine {
            Engine::MySql => mysql,
            Engine::Postgres => postgres,
        };
        DbError::new(self.engine, Some(code.to_string()), message).into()
    }

    fn read_only(&self) -> HarnessError {
        match self.engine {
            Engine::MySql => self.error(
                crate::errors::MYSQL_OPTION_PREVENTS_STATEMENT,
                "",
                "The MySQL server is running with the --read-only option",
            ),
            Engine::Postgres => self.error(
                "",
                crate::errors::PG_READ_ONLY_SQL_TRANSACTION,
                "cannot execute statement in a read-only transaction",
            ),
        }
    }

    fn missing_table(&self) -> HarnessError {
        self.error("1146", "42P01", "relation \"test\" does not exist")
    }

    fn with_table<T>(&self, write: bool, f: impl FnOnce(&mut Table) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let instance = state.instance(&self.instance)?;
        if write && instance.read_only {
            return Err(self.read_only());
        }
        let master = instance.master.clone();
        let table = state
            .tables
            .get_mut(&master)
            .ok_or_else(|| HarnessError::connectivity(&self.target, "server has gone away"))?;
        f(table)
    }
}

#[async_trait]
impl SqlConnection for FakeConnection {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn ping(&mut self) -> Result<()> {
        self.state.lock().instance(&self.instance).map(|_| ())
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        let upper = statement.trim_start().to_ascii_uppercase();
        if upper.starts_with("SELECT") {
            return self.with_table(false, |_| Ok(()));
        }
        let missing = self.missing_table();
        self.with_table(true, |table| {
            if upper.starts_with("CREATE TABLE") {
                table.exists = true;
            } else if upper.starts_with("DROP TABLE") {
                table.exists = false;
                table.rows.clear();
                table.last_id = 0;
            } else if upper.starts_with("DELETE FROM") {
                if !table.exists {
                    return Err(missing);
                }
                table.rows.clear();
            }
            Ok(())
        })
    }

    async fn insert_returning_id(&mut self, name: &str) -> Result<i64> {
        let missing = self.missing_table();
        self.with_table(true, |table| {
            if !table.exists {
                return Err(missing);
            }
            table.last_id += table.step;
            table.rows.push((table.last_id, name.to_string()));
            Ok(table.last_id)
        })
    }

    async fn count_rows(&mut self) -> Result<i64> {
        let missing = self.missing_table();
        self.with_table(false, |table| {
            if table.exists {
                i64::try_from(table.rows.len())
                    .map_err(|e| HarnessError::connectivity("fake", e))
            } else {
                Err(missing)
            }
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock();
        state.open_connections = state.open_connections.saturating_sub(1);
        state.record(format!("close {}", self.target));
        Ok(())
    }
}

/// A [`ZoneLister`] returning a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticZones(pub Vec<String>);

impl StaticZones {
    /// Zones `a`, `b` and `c` of `region`.
    #[must_use]
    pub fn abc(region: &str) -> Self {
        Self(["a", "b", "c"].iter().map(|z| format!("{region}-{z}")).collect())
    }
}

#[async_trait]
impl ZoneLister for StaticZones {
    async fn zones(&self, _project: &str, _region: &str) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{mysql, postgres, sql};
    use crate::scenarios::{cloud_sql_options, mysql_options, require_ssl};
    use pretty_assertions::assert_eq;

    fn options(dir: &str) -> ProvisionOptions {
        mysql_options("test-project", "europe-north1", Path::new(dir), prefixes::MYSQL_TEST)
    }

    #[tokio::test]
    async fn test_apply_requires_init() {
        let cloud = FakeCloud::new();
        let err = cloud.apply(&options("/m/cloud-sql-mysql")).await.unwrap_err();
        assert!(matches!(err, HarnessError::Provision(_)));
    }

    #[tokio::test]
    async fn test_outputs_follow_variables() {
        let cloud = FakeCloud::new();
        let opts = options("/m/cloud-sql-mysql");
        cloud.init_and_apply(&opts).await.unwrap();

        let name = cloud.output(&opts, outputs::INSTANCE_NAME).await.unwrap();
        assert_eq!(name, "mysql-test-0001");
        assert_eq!(
            cloud.output(&opts, outputs::PROXY_CONNECTION).await.unwrap(),
            "test-project:europe-north1:mysql-test-0001"
        );
        assert_eq!(cloud.output(&opts, outputs::DB_NAME).await.unwrap(), "testdb");
        assert!(cloud.output(&opts, "nope").await.is_err());
        assert_eq!(cloud.deployed(), vec!["cloud-sql-mysql".to_string()]);
    }

    #[tokio::test]
    async fn test_mysql_ids_follow_step() {
        let cloud = FakeCloud::new();
        let opts = options("/m/cloud-sql-mysql");
        cloud.init_and_apply(&opts).await.unwrap();
        let ip = cloud.output(&opts, outputs::PUBLIC_IP).await.unwrap();

        let mut conn = cloud
            .connect(&SqlEndpoint::new(Engine::MySql, ip), None)
            .await
            .unwrap();
        conn.execute(mysql::CREATE_TEST_TABLE_WITH_AUTO_INCREMENT).await.unwrap();
        conn.execute(sql::EMPTY_TEST_TABLE).await.unwrap();
        assert_eq!(conn.insert_returning_id("a").await.unwrap(), 5);
        assert_eq!(conn.insert_returning_id("b").await.unwrap(), 10);
        assert_eq!(conn.count_rows().await.unwrap(), 2);
        assert_eq!(cloud.open_connections(), 1);
        conn.close().await.unwrap();
        assert_eq!(cloud.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_require_ssl_rejects_plain_connections() {
        let cloud = FakeCloud::new();
        let mut opts = cloud_sql_options(
            Engine::Postgres,
            "test-project",
            "europe-north1",
            Path::new("/m/postgres-public-ip"),
            prefixes::POSTGRES_PUBLIC,
        );
        cloud.init_and_apply(&opts).await.unwrap();
        require_ssl(&mut opts);
        cloud.init_and_apply(&opts).await.unwrap();
        let ip = cloud.output(&opts, outputs::MASTER_PUBLIC_IP).await.unwrap();
        let endpoint = SqlEndpoint::new(Engine::Postgres, ip);

        let err = cloud.connect(&endpoint, None).await.err();
        assert!(matches!(err, Some(HarnessError::Database(_))));

        let tls = TlsMaterial::new("ca", "cert", "key");
        let mut conn = cloud.connect(&endpoint, Some(&tls)).await.unwrap();
        conn.execute(postgres::DROP_TEST_TABLE).await.unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_drops_instances() {
        let cloud = FakeCloud::new();
        let opts = options("/m/cloud-sql-mysql");
        cloud.init_and_apply(&opts).await.unwrap();
        let ip = cloud.output(&opts, outputs::PUBLIC_IP).await.unwrap();
        cloud.destroy(&opts).await.unwrap();

        assert!(cloud.instance_names().is_empty());
        assert!(cloud
            .connect(&SqlEndpoint::new(Engine::MySql, ip), None)
            .await
            .is_err());
        assert_eq!(cloud.calls_of("destroy"), vec!["destroy cloud-sql-mysql".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let cloud = FakeCloud::new();
        cloud.fail_at(FailPoint::Init);
        assert!(cloud.init(&options("/m/x")).await.is_err());
        cloud.clear_failure(FailPoint::Init);
        assert!(cloud.init(&options("/m/x")).await.is_ok());
    }
}
