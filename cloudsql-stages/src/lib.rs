//! # cloudsql-stages
//!
//! A staged, resumable integration harness for the Cloud SQL Terraform
//! example modules.
//!
//! Each scenario deploys one example module into a real project, checks its
//! outputs, talks to the resulting MySQL or PostgreSQL instances (directly,
//! through the Cloud SQL proxy and over client-certificate TLS) and destroys
//! everything again:
//!
//! - **Stages**: named steps run in order, any of which can be skipped with
//!   `SKIP_<stage>=true` to resume a failed run from saved state
//! - **Deferred teardown**: cleanup stages run in reverse registration order
//!   even when a forward stage failed
//! - **Provisioning**: `terraform init/apply/destroy/output` behind the
//!   [`provision::Provisioner`] trait
//! - **SQL checks**: engine-neutral connections behind [`sql::SqlConnector`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cloudsql_stages::prelude::*;
//!
//! init_logging(LogFormat::Pretty)?;
//! let ctx = ScenarioContext::from_process_env()?;
//! let report = mysql_public_ip(&ctx).await?;
//! println!("{}", report.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod consts;
pub mod core;
pub mod errors;
pub mod events;
pub mod gcp;
pub mod observability;
pub mod provision;
pub mod proxy;
pub mod scenarios;
pub mod sql;
pub mod stages;
pub mod state;
pub mod testing;
pub mod validate;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EnvSource, HarnessConfig, LogFormat, MapEnv, ProcessEnv};
    pub use crate::core::{StageEvent, StagePhase, StageRecord, StageStatus};
    pub use crate::errors::{DbError, HarnessError, ProvisionError, Result};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_logging, init_test_logging};
    pub use crate::provision::{ProvisionOptions, Provisioner, TerraformCli};
    pub use crate::scenarios::{
        cloud_sql_mysql, mysql_public_ip, mysql_replicas, postgres_public_ip, postgres_replicas,
        ScenarioContext,
    };
    pub use crate::sql::{Engine, SqlConnection, SqlConnector, SqlEndpoint, TlsMaterial};
    pub use crate::stages::{RunReport, SkipToggles, StageRunner};
}
