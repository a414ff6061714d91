//! Automation job tracker.
//!
//! - [`registry::JobRegistry`] owns job entities, polls the backend and
//!   applies the retention policy.
//! - [`indicator::IndicatorController`] renders one visible job.
//! - [`orchestrator::StartOrchestrator`] runs the prepare/initiate start
//!   sequence.

pub mod config;
pub mod indicator;
pub mod orchestrator;
pub mod registry;
