//! Data structures for session state and backend messages.
//!
//! This module contains the per-protocol accumulators, the sleep session that
//! owns them, and the request/response bodies exchanged with the backend.

pub mod accumulator;
pub mod requests;
pub mod responses;
pub mod session;

pub use accumulator::FrameAccumulator;
pub use requests::{HrSpO2Data, HrSpO2Request, ProtocolUploadRequest, SleepSessionRequest};
pub use responses::{SleepCommResponse, SleepResultResponse};
pub use session::SleepSession;
