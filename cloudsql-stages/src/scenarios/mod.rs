//! End-to-end scenarios over the Cloud SQL example modules.
//!
//! Each scenario copies the module tree to a scratch directory, runs its
//! forward stages in order and then its deferred cleanup stages in reverse
//! registration order. Any stage can be skipped with `SKIP_<stage>=true`,
//! which lets a failed run be resumed from the saved state.

mod cloud_sql_mysql;
mod context;
mod options;
mod public_ip;
mod replicas;
pub mod steps;

pub use cloud_sql_mysql::cloud_sql_mysql;
pub use context::ScenarioContext;
pub use options::{
    client_cert_options, cloud_sql_options, mysql_options, replicas_options, require_ssl,
    ReplicaPlacement,
};
pub use public_ip::{mysql_public_ip, postgres_public_ip};
pub use replicas::{mysql_replicas, postgres_replicas};
pub use steps::{IdCheck, ZonePlan};
