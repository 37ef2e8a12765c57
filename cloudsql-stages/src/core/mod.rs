//! Core domain model types.
//!
//! This module contains the types shared by the runner and the sinks:
//! - Stage status, phase and per-stage records
//! - Stage lifecycle events

mod event;
mod status;

pub use event::StageEvent;
pub use status::{StagePhase, StageRecord, StageStatus};
