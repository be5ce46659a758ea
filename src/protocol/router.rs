//! Frame routing.
//!
//! Reads the tag byte of each notification frame, strips the tag's header and
//! applies the payload to the session's accumulators. Routing is synchronous:
//! any flush a tag triggers happens here, before the next frame is routed, and
//! the flushed batch is handed back for the caller to upload.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::data::session::SleepSession;
use crate::error::{ProtocolError, UploadError};
use crate::protocol::hr_spo2::HrSpO2Reading;
use crate::protocol::tags::ProtocolId;

/// Outcome of routing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedFrame {
    /// SLEEP_START marker. No accumulator was touched.
    SleepStart,
    /// SLEEP_END marker. No accumulator was touched.
    SleepEnd,
    /// Payload appended to the protocol's accumulator; nothing to upload.
    Buffered {
        /// Protocol that received the payload.
        protocol: ProtocolId,
        /// Number of payload bytes appended.
        len: usize,
    },
    /// Payload seeded one channel and completed another.
    CrossTrigger {
        /// Channel whose batch was flushed.
        completed: ProtocolId,
        /// The flushed batch, `None` if that channel was empty.
        batch: Option<Bytes>,
        /// Channel that received the payload.
        seeded: ProtocolId,
    },
    /// HR/SpO2 reading that also completed the P07 batch.
    Composite {
        /// The flushed P07 batch, `None` if it was empty.
        previous: Option<Bytes>,
        /// The decoded reading, or why it could not be decoded.
        reading: Result<HrSpO2Reading, UploadError>,
    },
}

impl RoutedFrame {
    /// Whether this outcome requires at least one network call.
    pub fn needs_upload(&self) -> bool {
        match self {
            Self::CrossTrigger { batch, .. } => batch.is_some(),
            Self::Composite { previous, reading } => previous.is_some() || reading.is_ok(),
            _ => false,
        }
    }
}

/// Routes frames to per-protocol accumulators.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRouter;

impl ProtocolRouter {
    /// Create a router.
    pub fn new() -> Self {
        Self
    }

    /// Identify a frame's protocol and check it is long enough for its header.
    pub fn classify(&self, frame: &[u8]) -> Result<ProtocolId, ProtocolError> {
        let tag = *frame.first().ok_or(ProtocolError::FrameTooShort {
            len: 0,
            required: 1,
        })?;
        let protocol = ProtocolId::try_from(tag)?;

        let required = protocol.min_frame_len();
        if frame.len() < required {
            return Err(ProtocolError::FrameTooShort {
                len: frame.len(),
                required,
            });
        }

        Ok(protocol)
    }

    /// Route one frame against a session's accumulators.
    ///
    /// On error the session is left untouched.
    pub fn route(&self, frame: Bytes, session: &SleepSession) -> Result<RoutedFrame, ProtocolError> {
        let protocol = self.classify(&frame)?;
        let payload = frame.slice(protocol.header_width()..);

        trace!("Routing {} frame with {} payload bytes", protocol, payload.len());

        let routed = match protocol {
            ProtocolId::SleepStart => RoutedFrame::SleepStart,
            ProtocolId::SleepEnd => RoutedFrame::SleepEnd,
            ProtocolId::Protocol09HrSpO2 => {
                let previous = flush(session, ProtocolId::Protocol07);
                RoutedFrame::Composite {
                    previous,
                    reading: HrSpO2Reading::parse(&payload),
                }
            }
            seeded => match seeded.completes() {
                Some(completed) => {
                    let batch = flush(session, completed);
                    append(session, seeded, &payload);
                    RoutedFrame::CrossTrigger {
                        completed,
                        batch,
                        seeded,
                    }
                }
                None => {
                    append(session, seeded, &payload);
                    RoutedFrame::Buffered {
                        protocol: seeded,
                        len: payload.len(),
                    }
                }
            },
        };

        debug!("Routed {}: {:?}", protocol, summarize(&routed));

        Ok(routed)
    }
}

fn flush(session: &SleepSession, protocol: ProtocolId) -> Option<Bytes> {
    session.accumulator(protocol).and_then(|acc| acc.flush())
}

fn append(session: &SleepSession, protocol: ProtocolId, payload: &[u8]) {
    if let Some(acc) = session.accumulator(protocol) {
        acc.append(payload);
    }
}

fn summarize(routed: &RoutedFrame) -> String {
    match routed {
        RoutedFrame::SleepStart => "sleep start".to_string(),
        RoutedFrame::SleepEnd => "sleep end".to_string(),
        RoutedFrame::Buffered { protocol, len } => format!("buffered {} bytes for {}", len, protocol),
        RoutedFrame::CrossTrigger {
            completed,
            batch,
            seeded,
        } => format!(
            "completed {} ({} bytes), seeded {}",
            completed,
            batch.as_ref().map(Bytes::len).unwrap_or(0),
            seeded
        ),
        RoutedFrame::Composite { previous, reading } => format!(
            "completed PROTOCOL_7 ({} bytes), reading {:?}",
            previous.as_ref().map(Bytes::len).unwrap_or(0),
            reading
        ),
    }
}
