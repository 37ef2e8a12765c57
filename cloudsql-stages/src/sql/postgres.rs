//! PostgreSQL connection over `tokio-postgres`.

use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use super::{Engine, SqlConnection, SqlEndpoint, TlsMaterial};
use crate::consts::{postgres, sql};
use crate::errors::{DbError, HarnessError, Result};

/// A single PostgreSQL connection.
pub struct PgConnection {
    client: Client,
    driver: JoinHandle<()>,
    target: String,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl PgConnection {
    /// Connects and authenticates.
    ///
    /// Without `tls` the connection runs with `sslmode=disable`, which the
    /// server refuses once it requires SSL.
    pub async fn connect(
        endpoint: &SqlEndpoint,
        tls: Option<&TlsMaterial>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let target = endpoint.redacted_dsn();
        let mut config = tokio_postgres::Config::new();
        config
            .host(&endpoint.host)
            .port(endpoint.port)
            .user(&endpoint.user)
            .password(&endpoint.password)
            .dbname(&endpoint.database);
        if let Some(limit) = timeout {
            config.connect_timeout(limit);
        }

        let (client, driver) = match tls {
            Some(tls) => {
                config.ssl_mode(SslMode::Require);
                let (client, connection) = config
                    .connect(tls.pg_connector()?)
                    .await
                    .map_err(|e| HarnessError::connectivity(&target, e))?;
                (client, spawn_driver(connection, target.clone()))
            }
            None => {
                config.ssl_mode(SslMode::Disable);
                let (client, connection) = config
                    .connect(NoTls)
                    .await
                    .map_err(|e| HarnessError::connectivity(&target, e))?;
                (client, spawn_driver(connection, target.clone()))
            }
        };

        debug!(endpoint = %target, "PostgreSQL connection established");
        Ok(Self {
            client,
            driver,
            target,
        })
    }

    fn statement_error(&self, err: &tokio_postgres::Error) -> HarnessError {
        match err.code() {
            Some(code) => {
                let message = err
                    .as_db_error()
                    .map_or_else(|| err.to_string(), |db| db.message().to_string());
                DbError::new(Engine::Postgres, Some(code.code().to_string()), message).into()
            }
            None => HarnessError::connectivity(&self.target, err),
        }
    }
}

fn spawn_driver<F>(connection: F, target: String) -> JoinHandle<()>
where
    F: std::future::Future<Output = std::result::Result<(), tokio_postgres::Error>>
        + Send
        + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!(endpoint = %target, "postgres connection error: {e}");
        }
    })
}

#[async_trait]
impl SqlConnection for PgConnection {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    async fn ping(&mut self) -> Result<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map(drop)
            .map_err(|e| self.statement_error(&e))
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        self.client
            .batch_execute(statement)
            .await
            .map_err(|e| self.statement_error(&e))
    }

    async fn insert_returning_id(&mut self, name: &str) -> Result<i64> {
        let row = self
            .client
            .query_one(postgres::INSERT_TEST_ROW, &[&name])
            .await
            .map_err(|e| self.statement_error(&e))?;
        let id: i32 = row.try_get(0).map_err(|e| self.statement_error(&e))?;
        Ok(i64::from(id))
    }

    async fn count_rows(&mut self) -> Result<i64> {
        let row = self
            .client
            .query_one(sql::QUERY_ROW_COUNT, &[])
            .await
            .map_err(|e| self.statement_error(&e))?;
        row.try_get(0).map_err(|e| self.statement_error(&e))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self { client, driver, .. } = *self;
        // Dropping the client ends the connection task.
        drop(client);
        driver
            .await
            .map_err(|e| HarnessError::Panicked(format!("postgres connection task: {e}")))
    }
}
