//! Per-protocol frame accumulation.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::protocol::tags::ProtocolId;

/// Buffers payload fragments for a single protocol channel.
///
/// Appends and flushes share one lock, so a flush can never interleave with a
/// concurrent append: every byte ends up in exactly one flushed batch.
#[derive(Debug)]
pub struct FrameAccumulator {
    protocol: ProtocolId,
    buffer: Mutex<BytesMut>,
}

impl FrameAccumulator {
    /// Create an empty accumulator for a protocol.
    pub fn new(protocol: ProtocolId) -> Self {
        Self {
            protocol,
            buffer: Mutex::new(BytesMut::new()),
        }
    }

    /// Protocol this accumulator collects.
    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    /// Append payload bytes.
    pub fn append(&self, bytes: &[u8]) {
        self.buffer.lock().extend_from_slice(bytes);
    }

    /// Drain the buffer.
    ///
    /// Returns `None` when there is nothing to send, so callers never issue an
    /// upload for an empty payload.
    pub fn flush(&self) -> Option<Bytes> {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return None;
        }
        Some(buffer.split().freeze())
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}
