//! # sleep-protocol-ble
//!
//! Routing, reassembly and upload of the frame stream produced by a BLE
//! sleep-monitoring wearable.
//!
//! The monitor pushes short frames over a notify characteristic. The first
//! byte of each frame is a protocol tag. Sleep start/end markers bracket a
//! session; in between, three measurement protocols arrive in fragments and
//! are buffered until a frame of a different protocol closes the batch. The
//! HR/SpO2 frame closes the P07 batch and carries its own reading, and those
//! two uploads are always reported P07 first.
//!
//! ## Features
//!
//! - **Protocol routing**: Classify frames by tag and strip their headers
//! - **Batch reassembly**: Per-protocol accumulators flushed on cross-trigger
//! - **Ordered uploads**: Parallel network calls with deterministic result order
//! - **Session lifecycle**: Start/end handling with force-flush on end
//! - **BLE integration**: Subscribe to a btleplug peripheral and pump frames
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use sleep_protocol_ble::{
//!     Result, SessionConfig, SessionEvent, SessionOrchestrator, SleepApi, TransportError,
//! };
//!
//! struct Backend;
//!
//! #[async_trait]
//! impl SleepApi for Backend {
//!     async fn post(&self, endpoint: &str, body: Value) -> std::result::Result<String, TransportError> {
//!         // Hand the request to your HTTP client here.
//!         println!("POST {} {}", endpoint, body);
//!         Ok(r#"{"retCd":"0000"}"#.to_string())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let orchestrator = SessionOrchestrator::new(Arc::new(Backend), SessionConfig::new(1001))?;
//!
//!     let _events = orchestrator.on_event(|event| {
//!         if let SessionEvent::Upload { protocol, result, .. } = event {
//!             println!("{} -> {:?}", protocol, result);
//!         }
//!     });
//!
//!     orchestrator.on_frame(vec![0x04]);
//!     orchestrator.on_frame(vec![0x06, 0x00, 0xAA, 0xBB]);
//!     orchestrator.on_frame(vec![0x08, 0x00, 0x01]);
//!     orchestrator.on_frame(vec![0x05]);
//!
//!     orchestrator.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! [`NotificationPump`] works with any btleplug peripheral. On Linux this
//! requires BlueZ; on macOS the host app needs Bluetooth permission.

// Public modules
pub mod api;
pub mod ble;
pub mod config;
pub mod data;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod utils;

// Re-exports for convenience
pub use api::{SleepApi, TransportError, UploadDispatcher, UploadResult};
pub use ble::{FrameSink, NotificationPump};
pub use config::{Endpoints, RetryPolicy, SessionConfig};
pub use error::{Error, ProtocolError, Result, UploadError};
pub use orchestrator::{CallbackHandle, SessionEvent, SessionOrchestrator};

// Re-export commonly used types from submodules
pub use data::{
    FrameAccumulator, HrSpO2Request, ProtocolUploadRequest, SleepCommResponse,
    SleepResultResponse, SleepSession, SleepSessionRequest,
};
pub use protocol::{HrSpO2Reading, ProtocolId, ProtocolRouter, RoutedFrame};
