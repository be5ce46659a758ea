//! BLE communication module.
//!
//! The monitor streams every frame over a single notify characteristic.
//! This module subscribes to it and feeds the values into a [`FrameSink`].

pub mod notifications;

pub use crate::orchestrator::FrameSink;
pub use notifications::{forward_notifications, NotificationPump};
