//! fwtrack event bus: the surface the UI shell subscribes to.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`TrackerEvent`]: notifications, indicator mount/update/unmount,
//!   detail-view and form-close signals.

pub mod bus;

pub use bus::{
    EventBus, IndicatorState, IndicatorView, JobAction, JobDetail, Notification, Severity,
    TrackerEvent,
};
