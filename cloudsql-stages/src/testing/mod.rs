//! Test doubles and fixtures for running scenarios without a cloud project.
//!
//! [`FakeCloud`] stands in for both the provisioning tool and the SQL
//! drivers, so a whole scenario (including its deferred teardown) runs in
//! memory against a scratch copy of a module tree.

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_failed_in, assert_run_succeeded, assert_stage_order, assert_stage_status,
};
pub use fixtures::{write_module_tree, TestHarness, TEST_PROJECT, TEST_REGION};
pub use mocks::{FailPoint, FakeCloud, FakeConnection, StaticZones};
