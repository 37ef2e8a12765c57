//! Error types for the staged Cloud SQL harness.
//!
//! Every fatal condition of a run maps to one variant of [`HarnessError`]:
//! provisioning failures, connectivity failures, assertion mismatches and
//! expected-error scenarios that unexpectedly succeeded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::sql::Engine;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// The main error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The provisioning tool exited with a non-zero status.
    #[error("{0}")]
    Provision(#[from] ProvisionError),

    /// A connection could not be established where one was expected.
    #[error("Connectivity error to {target}: {message}")]
    Connectivity {
        /// Host, proxy identifier or DSN that was dialed.
        target: String,
        /// Driver or transport message.
        message: String,
    },

    /// The database server rejected a statement.
    #[error("{0}")]
    Database(#[from] DbError),

    /// A value did not match its expectation.
    #[error("Assertion failed for {what}: expected {expected:?}, got {actual:?}")]
    Assertion {
        /// What was being checked.
        what: String,
        /// Expected value.
        expected: String,
        /// Actual value.
        actual: String,
    },

    /// An operation expected to fail succeeded instead.
    #[error("Expected {what} to fail, but it succeeded")]
    UnexpectedSuccess {
        /// The operation that should have been rejected.
        what: String,
    },

    /// A persisted value was requested before any stage saved it.
    #[error("No value saved for key '{key}' at {path} (was an earlier stage skipped?)")]
    MissingValue {
        /// The state key.
        key: String,
        /// Where the value was expected on disk.
        path: PathBuf,
    },

    /// A stage action failed.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        /// The failing stage.
        stage: String,
        /// The underlying failure.
        #[source]
        source: Box<HarnessError>,
    },

    /// A stage action panicked.
    #[error("Stage panicked: {0}")]
    Panicked(String),

    /// Configuration could not be resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS material could not be turned into a client configuration.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Creates a connectivity error.
    pub fn connectivity(target: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Connectivity {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Creates an assertion error with expected and actual values.
    pub fn assertion(
        what: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Assertion {
            what: what.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Wraps an error with the name of the stage it came from.
    #[must_use]
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, unwrapping stage wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns the name of the stage that failed, if known.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Returns true if the root cause is a server-side read-only rejection.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self.root(), Self::Database(db) if db.is_read_only())
    }
}

impl From<openssl::error::ErrorStack> for HarnessError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Tls(err.to_string())
    }
}

/// Error raised when a provisioning tool command fails.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("`{command}` in {dir} exited with {code:?}: {stderr}")]
pub struct ProvisionError {
    /// The rendered command (without variable values).
    pub command: String,
    /// Working directory of the command.
    pub dir: String,
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured standard error, trimmed.
    pub stderr: String,
}

impl ProvisionError {
    /// Creates a new provisioning error.
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        dir: impl Into<String>,
        code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            dir: dir.into(),
            code,
            stderr: stderr.into(),
        }
    }
}

/// MySQL error raised when the server runs with `--read-only`.
pub const MYSQL_OPTION_PREVENTS_STATEMENT: &str = "1290";
/// MySQL error raised when `super_read_only`/`read_only` mode rejects a write.
pub const MYSQL_READ_ONLY_MODE: &str = "1836";
/// `SQLSTATE` for `read_only_sql_transaction`.
pub const PG_READ_ONLY_SQL_TRANSACTION: &str = "25006";

/// A statement error reported by a database server or driver.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{engine} error{}: {message}", .code.as_deref().map(|c| format!(" {c}")).unwrap_or_default())]
pub struct DbError {
    /// Engine that produced the error.
    pub engine: Engine,
    /// Server error code (MySQL error number or Postgres `SQLSTATE`).
    pub code: Option<String>,
    /// Error message.
    pub message: String,
}

impl DbError {
    /// Creates a new database error.
    #[must_use]
    pub fn new(engine: Engine, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            engine,
            code,
            message: message.into(),
        }
    }

    /// Returns true if the server rejected the statement because it is read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        match (self.engine, self.code.as_deref()) {
            (Engine::MySql, Some(MYSQL_OPTION_PREVENTS_STATEMENT | MYSQL_READ_ONLY_MODE)) => true,
            (Engine::Postgres, Some(PG_READ_ONLY_SQL_TRANSACTION)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapper_keeps_root() {
        let err =
            HarnessError::assertion("db_name", "testdb", "other").in_stage("validate_outputs");

        assert_eq!(err.stage(), Some("validate_outputs"));
        assert!(matches!(err.root(), HarnessError::Assertion { .. }));
        assert!(err.to_string().contains("validate_outputs"));
        assert!(err.to_string().contains("testdb"));
    }

    #[test]
    fn test_mysql_read_only_codes() {
        let err = DbError::new(
            Engine::MySql,
            Some("1290".to_string()),
            "The MySQL server is running with the --read-only option",
        );
        assert!(err.is_read_only());

        let other = DbError::new(Engine::MySql, Some("1062".to_string()), "Duplicate entry");
        assert!(!other.is_read_only());
    }

    #[test]
    fn test_postgres_read_only_code() {
        let err = DbError::new(
            Engine::Postgres,
            Some("25006".to_string()),
            "cannot execute INSERT in a read-only transaction",
        );
        assert!(err.is_read_only());

        // The Postgres code means nothing to MySQL.
        let mismatched = DbError::new(Engine::MySql, Some("25006".to_string()), "x");
        assert!(!mismatched.is_read_only());
    }

    #[test]
    fn test_is_read_only_through_stage_wrapper() {
        let err = HarnessError::from(DbError::new(
            Engine::Postgres,
            Some(PG_READ_ONLY_SQL_TRANSACTION.to_string()),
            "read-only",
        ))
        .in_stage("read_replica_tests");

        assert!(err.is_read_only());
    }

    #[test]
    fn test_provision_error_display() {
        let err = ProvisionError::new("terraform apply", "/tmp/mysql", Some(1), "boom");
        let msg = HarnessError::from(err).to_string();
        assert!(msg.contains("terraform apply"));
        assert!(msg.contains("boom"));
    }
}
