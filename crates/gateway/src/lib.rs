//! Remote job gateway: the contract the tracker uses to reach the backend
//! job store, its wire types, and a REST implementation.
//!
//! The tracker only depends on the [`JobGateway`] trait; [`HttpJobGateway`]
//! is the production implementation over the backend's automation API.

pub mod api;
pub mod gateway;
pub mod messages;

pub use api::HttpJobGateway;
pub use gateway::{GatewayError, JobGateway};
