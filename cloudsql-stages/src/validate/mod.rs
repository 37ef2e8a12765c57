//! Assertions over module outputs and SQL results.
//!
//! Every check returns `Ok(())` or a [`HarnessError::Assertion`] carrying
//! the expected and actual values, so a failing stage reports exactly what
//! did not match.

mod outputs;

pub use outputs::{validate_instance_outputs, InstanceOutputs};

use std::fmt::Display;
use tracing::info;

use crate::errors::{HarnessError, Result};

/// Checks that `actual` starts with `prefix`.
pub fn expect_prefix(what: &str, actual: &str, prefix: &str) -> Result<()> {
    if actual.starts_with(prefix) {
        Ok(())
    } else {
        Err(HarnessError::assertion(what, format!("{prefix}*"), actual))
    }
}

/// Checks that `actual == expected`.
pub fn expect_eq<T>(what: &str, expected: &T, actual: &T) -> Result<()>
where
    T: PartialEq + Display + ?Sized,
{
    if expected == actual {
        Ok(())
    } else {
        Err(HarnessError::assertion(what, expected.to_string(), actual.to_string()))
    }
}

/// The connection identifier the proxy uses for an instance.
#[must_use]
pub fn expected_proxy_connection(project: &str, region: &str, instance: &str) -> String {
    format!("{project}:{region}:{instance}")
}

/// Checks that a proxy connection output is `project:region:instance`.
pub fn expect_proxy_connection(
    what: &str,
    project: &str,
    region: &str,
    instance: &str,
    actual: &str,
) -> Result<()> {
    expect_eq(
        what,
        expected_proxy_connection(project, region, instance).as_str(),
        actual,
    )
}

/// Checks that an auto-increment id is a multiple of the configured step.
///
/// The table is emptied before the insert, so the first id handed out is a
/// multiple of `auto_increment_increment` whatever the offset history.
pub fn expect_auto_increment(last_id: i64, step: i64) -> Result<()> {
    if step > 0 && last_id % step == 0 {
        Ok(())
    } else {
        Err(HarnessError::assertion(
            format!("last insert id {last_id} modulo {step}"),
            "0",
            (last_id % step.max(1)).to_string(),
        ))
    }
}

/// Checks that a serial id was handed out.
pub fn expect_positive_id(id: i64) -> Result<()> {
    if id > 0 {
        Ok(())
    } else {
        Err(HarnessError::assertion("inserted row id", "> 0", id.to_string()))
    }
}

/// Checks that an operation was rejected.
///
/// Success is the failure here; the rejection is returned for logging.
pub fn expect_denied<T>(what: &str, result: Result<T>) -> Result<HarnessError> {
    match result {
        Ok(_) => Err(HarnessError::UnexpectedSuccess {
            what: what.to_string(),
        }),
        Err(err) => {
            info!(what = %what, error = %err, "Rejected as expected");
            Ok(err)
        }
    }
}

/// Checks that a write was rejected because the server is read-only.
pub fn expect_read_only_rejection<T>(what: &str, result: Result<T>) -> Result<()> {
    let err = expect_denied(what, result)?;
    if err.is_read_only() {
        Ok(())
    } else {
        Err(HarnessError::assertion(what, "a read-only rejection", err.to_string()))
    }
}
