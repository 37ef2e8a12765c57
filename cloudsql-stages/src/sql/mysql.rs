//! MySQL connection over `mysql_async`.

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder};
use std::time::Duration;
use tracing::debug;

use super::{Engine, SqlConnection, SqlEndpoint, TlsMaterial};
use crate::consts::{mysql, sql};
use crate::errors::{DbError, HarnessError, Result};

/// A single MySQL connection.
pub struct MySqlConnection {
    conn: Conn,
    target: String,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl MySqlConnection {
    /// Connects and authenticates.
    pub async fn connect(
        endpoint: &SqlEndpoint,
        tls: Option<&TlsMaterial>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let target = endpoint.redacted_dsn();
        let mut opts = OptsBuilder::default()
            .ip_or_hostname(endpoint.host.clone())
            .tcp_port(endpoint.port)
            .user(Some(endpoint.user.clone()))
            .pass(Some(endpoint.password.clone()))
            .db_name(Some(endpoint.database.clone()));
        if let Some(tls) = tls {
            opts = opts.ssl_opts(Some(tls.mysql_ssl_opts()?));
        }

        let connecting = Conn::new(opts);
        let conn = match timeout {
            Some(limit) => tokio::time::timeout(limit, connecting).await.map_err(|_| {
                HarnessError::connectivity(&target, format!("timed out after {limit:?}"))
            })?,
            None => connecting.await,
        }
        .map_err(|e| HarnessError::connectivity(&target, e))?;

        debug!(endpoint = %target, "MySQL connection established");
        Ok(Self { conn, target })
    }

    fn statement_error(&self, err: mysql_async::Error) -> HarnessError {
        match err {
            mysql_async::Error::Server(e) => {
                DbError::new(Engine::MySql, Some(e.code.to_string()), e.message).into()
            }
            other => HarnessError::connectivity(&self.target, other),
        }
    }
}

#[async_trait]
impl SqlConnection for MySqlConnection {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    async fn ping(&mut self) -> Result<()> {
        self.conn
            .ping()
            .await
            .map_err(|e| HarnessError::connectivity(&self.target, e))
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        match self.conn.query_drop(statement).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.statement_error(e)),
        }
    }

    async fn insert_returning_id(&mut self, name: &str) -> Result<i64> {
        if let Err(e) = self.conn.exec_drop(mysql::INSERT_TEST_ROW, (name,)).await {
            return Err(self.statement_error(e));
        }
        let id = self.conn.last_insert_id().ok_or_else(|| {
            HarnessError::assertion("last insert id", "an id", "none reported by the server")
        })?;
        i64::try_from(id).map_err(|_| {
            HarnessError::assertion("last insert id", "a value within i64", id.to_string())
        })
    }

    async fn count_rows(&mut self) -> Result<i64> {
        match self.conn.query_first::<i64, _>(sql::QUERY_ROW_COUNT).await {
            Ok(count) => Ok(count.unwrap_or_default()),
            Err(e) => Err(self.statement_error(e)),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let target = self.target;
        self.conn
            .disconnect()
            .await
            .map_err(|e| HarnessError::connectivity(target, e))
    }
}
