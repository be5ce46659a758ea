//! Sleep session state.
//!
//! A session spans one SLEEP_START / SLEEP_END pair and owns the accumulators
//! for every buffered protocol. Dropping a session discards its buffers.

use bytes::Bytes;
use chrono::{DateTime, Local};
use tracing::warn;
use uuid::Uuid;

use crate::data::accumulator::FrameAccumulator;
use crate::protocol::tags::ProtocolId;

/// State for one sleep-monitoring session.
#[derive(Debug)]
pub struct SleepSession {
    id: Uuid,
    started_at: DateTime<Local>,
    protocol06: FrameAccumulator,
    protocol07: FrameAccumulator,
    protocol08: FrameAccumulator,
}

impl SleepSession {
    /// Create a session with a fresh random id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            protocol06: FrameAccumulator::new(ProtocolId::Protocol06),
            protocol07: FrameAccumulator::new(ProtocolId::Protocol07),
            protocol08: FrameAccumulator::new(ProtocolId::Protocol08),
        }
    }

    /// Unique id of this session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Local time the session was opened.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Accumulator for a buffered protocol.
    ///
    /// Returns `None` for session markers and the HR/SpO2 channel, which are
    /// never buffered.
    pub fn accumulator(&self, protocol: ProtocolId) -> Option<&FrameAccumulator> {
        match protocol {
            ProtocolId::Protocol06 => Some(&self.protocol06),
            ProtocolId::Protocol07 => Some(&self.protocol07),
            ProtocolId::Protocol08 => Some(&self.protocol08),
            _ => None,
        }
    }

    /// Iterate over all accumulators in tag order.
    pub fn accumulators(&self) -> impl Iterator<Item = &FrameAccumulator> {
        [&self.protocol06, &self.protocol07, &self.protocol08].into_iter()
    }

    /// Flush every accumulator, returning the non-empty batches in tag order.
    pub fn flush_all(&self) -> Vec<(ProtocolId, Bytes)> {
        self.accumulators()
            .filter_map(|acc| acc.flush().map(|bytes| (acc.protocol(), bytes)))
            .collect()
    }

    /// Total bytes buffered across all accumulators.
    pub fn buffered_len(&self) -> usize {
        self.accumulators().map(FrameAccumulator::len).sum()
    }
}

impl Default for SleepSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SleepSession {
    fn drop(&mut self) {
        for acc in self.accumulators() {
            let len = acc.len();
            if len > 0 {
                warn!(
                    "Session {} dropped with {} unsent bytes for {}",
                    self.id,
                    len,
                    acc.protocol()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let session = SleepSession::new();
        assert_eq!(session.buffered_len(), 0);
        assert!(session.flush_all().is_empty());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SleepSession::new();
        let b = SleepSession::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_accumulator_lookup() {
        let session = SleepSession::new();
        for protocol in [
            ProtocolId::Protocol06,
            ProtocolId::Protocol07,
            ProtocolId::Protocol08,
        ] {
            assert_eq!(session.accumulator(protocol).unwrap().protocol(), protocol);
        }
        assert!(session.accumulator(ProtocolId::SleepStart).is_none());
        assert!(session.accumulator(ProtocolId::Protocol09HrSpO2).is_none());
    }

    #[test]
    fn test_flush_all_skips_empty_buffers() {
        let session = SleepSession::new();
        session.accumulator(ProtocolId::Protocol08).unwrap().append(&[9, 8]);
        session.accumulator(ProtocolId::Protocol06).unwrap().append(&[6]);

        let batches = session.flush_all();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0, ProtocolId::Protocol06);
        assert_eq!(&batches[0].1[..], &[6]);
        assert_eq!(batches[1].0, ProtocolId::Protocol08);
        assert_eq!(&batches[1].1[..], &[9, 8]);
        assert_eq!(session.buffered_len(), 0);
    }
}
