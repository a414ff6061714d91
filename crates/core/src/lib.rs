//! Domain model and pure decision logic for firmware-upgrade job tracking.
//!
//! Nothing in this crate performs I/O.

pub mod error;
pub mod firmware;
pub mod job;
pub mod types;
pub mod upgrade;
