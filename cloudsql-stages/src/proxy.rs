//! Cloud SQL proxy tunnels.
//!
//! The proxy binary authenticates with the ambient Google credentials and
//! forwards a local TCP port to the instance named by its connection
//! identifier (`project:region:instance`). A tunnel lives as long as the
//! connection made through it.

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::errors::{HarnessError, Result};
use crate::sql::{Engine, SqlConnection, SqlEndpoint};

const LOCAL_ADDRESS: &str = "127.0.0.1";
const CONNECTION_NAME_PATTERN: &str = concat!(
    r"^(?P<project>[a-z0-9][a-z0-9.:-]*[a-z0-9])",
    r":(?P<region>[a-z]+-[a-z]+[0-9]+)",
    r":(?P<instance>[a-z][a-z0-9-]*)$"
);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A parsed proxy connection identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionName {
    /// Project id, possibly domain-scoped (`example.com:project`).
    pub project: String,
    /// Region of the instance.
    pub region: String,
    /// Instance name.
    pub instance: String,
}

impl fmt::Display for ConnectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.region, self.instance)
    }
}

/// Parses `project:region:instance`.
pub fn parse_connection_name(raw: &str) -> Result<ConnectionName> {
    let pattern = Regex::new(CONNECTION_NAME_PATTERN)
        .map_err(|e| HarnessError::Config(format!("connection name pattern: {e}")))?;
    let caps = pattern.captures(raw).ok_or_else(|| {
        HarnessError::assertion("proxy connection name", "project:region:instance", raw)
    })?;
    Ok(ConnectionName {
        project: caps["project"].to_string(),
        region: caps["region"].to_string(),
        instance: caps["instance"].to_string(),
    })
}

/// A running proxy process listening on a local port.
#[derive(Debug)]
pub struct ProxyTunnel {
    child: Child,
    port: u16,
    connection_name: ConnectionName,
}

impl ProxyTunnel {
    /// Starts the proxy and waits until its local port accepts TCP connections.
    pub async fn start(proxy_bin: &str, connection_name: &str, timeout: Duration) -> Result<Self> {
        let name = parse_connection_name(connection_name)?;
        let port = free_local_port()?;

        info!(connection = %name, port, "Starting Cloud SQL proxy");
        let child = Command::new(proxy_bin)
            .args(proxy_args(&name, port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::connectivity(
                    name.to_string(),
                    format!("failed to start {proxy_bin}: {e}"),
                )
            })?;

        let mut tunnel = Self {
            child,
            port,
            connection_name: name,
        };
        tunnel.wait_until_listening(timeout).await?;
        Ok(tunnel)
    }

    async fn wait_until_listening(&mut self, timeout: Duration) -> Result<()> {
        let target = self.connection_name.to_string();
        let port = self.port;
        let child = &mut self.child;
        let polling = async {
            loop {
                if TcpStream::connect((LOCAL_ADDRESS, port)).await.is_ok() {
                    return Ok::<(), HarnessError>(());
                }
                if let Some(status) = child.try_wait()? {
                    return Err(HarnessError::connectivity(
                        &target,
                        format!("proxy exited before listening: {status}"),
                    ));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(timeout, polling).await {
            Ok(result) => {
                if result.is_ok() {
                    debug!(connection = %target, port, "Proxy is listening");
                }
                result
            }
            Err(_) => Err(HarnessError::connectivity(
                target,
                format!("proxy did not listen on port {port} within {timeout:?}"),
            )),
        }
    }

    /// Local port the proxy listens on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Instance the proxy forwards to.
    #[must_use]
    pub fn connection_name(&self) -> &ConnectionName {
        &self.connection_name
    }

    /// Endpoint for a connection through this tunnel.
    #[must_use]
    pub fn endpoint(&self, engine: Engine) -> SqlEndpoint {
        SqlEndpoint::new(engine, LOCAL_ADDRESS).with_port(self.port)
    }

    /// Stops the proxy process.
    pub async fn shutdown(mut self) -> Result<()> {
        if self.child.try_wait()?.is_none() {
            self.child.kill().await?;
        }
        debug!(connection = %self.connection_name, "Proxy stopped");
        Ok(())
    }
}

fn proxy_args(name: &ConnectionName, port: u16) -> Vec<String> {
    vec![
        "--address".to_string(),
        LOCAL_ADDRESS.to_string(),
        "--port".to_string(),
        port.to_string(),
        name.to_string(),
    ]
}

fn free_local_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind((LOCAL_ADDRESS, 0))?;
    Ok(listener.local_addr()?.port())
}

/// A connection that keeps its proxy tunnel alive.
pub struct ProxiedConnection {
    inner: Box<dyn SqlConnection>,
    tunnel: ProxyTunnel,
}

impl fmt::Debug for ProxiedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxiedConnection")
            .field("engine", &self.inner.engine())
            .field("tunnel", &self.tunnel)
            .finish()
    }
}

impl ProxiedConnection {
    /// Binds a connection to the tunnel it was opened through.
    #[must_use]
    pub fn new(inner: Box<dyn SqlConnection>, tunnel: ProxyTunnel) -> Self {
        Self { inner, tunnel }
    }
}

#[async_trait]
impl SqlConnection for ProxiedConnection {
    fn engine(&self) -> Engine {
        self.inner.engine()
    }

    async fn ping(&mut self) -> Result<()> {
        self.inner.ping().await
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        self.inner.execute(statement).await
    }

    async fn insert_returning_id(&mut self, name: &str) -> Result<i64> {
        self.inner.insert_returning_id(name).await
    }

    async fn count_rows(&mut self) -> Result<i64> {
        self.inner.count_rows().await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self { inner, tunnel } = *self;
        let closed = inner.close().await;
        if let Err(e) = tunnel.shutdown().await {
            warn!(error = %e, "Failed to stop Cloud SQL proxy");
        }
        closed
    }
}
