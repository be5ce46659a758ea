//! Protocol tag definitions.
//!
//! Every notification frame from the sleep characteristic starts with a single
//! tag byte identifying the protocol channel it belongs to. The tag also fixes
//! how many header bytes precede the payload.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Protocol channel identified by the leading byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtocolId {
    /// Sleep session started (0x04).
    SleepStart = 0x04,
    /// Sleep session ended (0x05).
    SleepEnd = 0x05,
    /// Protocol 06 binary data (0x06).
    Protocol06 = 0x06,
    /// Protocol 07 binary data (0x07).
    Protocol07 = 0x07,
    /// Protocol 08 binary data (0x08).
    Protocol08 = 0x08,
    /// Protocol 09, ASCII heart-rate / SpO2 reading (0x09).
    Protocol09HrSpO2 = 0x09,
}

impl ProtocolId {
    /// All protocol ids, in tag order.
    pub const ALL: [ProtocolId; 6] = [
        Self::SleepStart,
        Self::SleepEnd,
        Self::Protocol06,
        Self::Protocol07,
        Self::Protocol08,
        Self::Protocol09HrSpO2,
    ];

    /// Create from raw tag byte. Returns `None` for unknown tags.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0x04 => Some(Self::SleepStart),
            0x05 => Some(Self::SleepEnd),
            0x06 => Some(Self::Protocol06),
            0x07 => Some(Self::Protocol07),
            0x08 => Some(Self::Protocol08),
            0x09 => Some(Self::Protocol09HrSpO2),
            _ => None,
        }
    }

    /// Convert to raw tag byte.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Number of leading bytes stripped before the payload.
    ///
    /// Binary channels carry the tag plus one reserved byte. The HR/SpO2
    /// channel carries only the tag. Session markers have no payload.
    pub fn header_width(&self) -> usize {
        match self {
            Self::SleepStart | Self::SleepEnd => 0,
            Self::Protocol06 | Self::Protocol07 | Self::Protocol08 => 2,
            Self::Protocol09HrSpO2 => 1,
        }
    }

    /// Minimum frame length for this tag.
    pub fn min_frame_len(&self) -> usize {
        match self {
            Self::SleepStart | Self::SleepEnd => 1,
            // HR/SpO2 needs at least one ASCII byte after its 1-byte header
            _ => 2,
        }
    }

    /// The channel whose batch is completed by the arrival of this tag.
    ///
    /// The device streams channels back to back: a P07 frame closes the P08
    /// batch, a P08 frame closes the P06 batch, and an HR/SpO2 frame closes
    /// the P07 batch.
    pub fn completes(&self) -> Option<ProtocolId> {
        match self {
            Self::Protocol07 => Some(Self::Protocol08),
            Self::Protocol08 => Some(Self::Protocol06),
            Self::Protocol09HrSpO2 => Some(Self::Protocol07),
            _ => None,
        }
    }

    /// Whether this tag marks a session boundary.
    pub fn is_session_marker(&self) -> bool {
        matches!(self, Self::SleepStart | Self::SleepEnd)
    }
}

impl TryFrom<u8> for ProtocolId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_raw(value).ok_or(ProtocolError::UnknownTag { tag: value })
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SleepStart => write!(f, "SLEEP_START"),
            Self::SleepEnd => write!(f, "SLEEP_END"),
            Self::Protocol06 => write!(f, "PROTOCOL_6"),
            Self::Protocol07 => write!(f, "PROTOCOL_7"),
            Self::Protocol08 => write!(f, "PROTOCOL_8"),
            Self::Protocol09HrSpO2 => write!(f, "PROTOCOL_9_HR_SPO2"),
        }
    }
}
