//! ASCII heart-rate / SpO2 payload decoding.
//!
//! Protocol 09 frames carry a human-readable reading rather than binary
//! samples, e.g. `"72,98"`. The first decimal number is the heart rate in
//! beats per minute and the second is the oxygen saturation in percent.
//! Any run of non-digit ASCII bytes separates the two values.

use serde::{Deserialize, Serialize};

use crate::error::UploadError;
use crate::protocol::tags::ProtocolId;

/// A decoded heart-rate / SpO2 reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrSpO2Reading {
    /// Heart rate in beats per minute.
    pub heart_rate: u16,
    /// Oxygen saturation in percent.
    pub spo2: u16,
}

impl HrSpO2Reading {
    /// Create a reading from its two values.
    pub fn new(heart_rate: u16, spo2: u16) -> Self {
        Self { heart_rate, spo2 }
    }

    /// Decode a reading from the ASCII payload of a Protocol 09 frame.
    ///
    /// The payload must already have its 1-byte header stripped.
    pub fn parse(payload: &[u8]) -> Result<Self, UploadError> {
        if let Some(pos) = payload.iter().position(|b| !b.is_ascii()) {
            return Err(decode_failure(format!(
                "non-ASCII byte {:#04x} at offset {}",
                payload[pos], pos
            )));
        }

        let mut values = payload
            .split(|b| !b.is_ascii_digit())
            .filter(|run| !run.is_empty())
            .map(parse_decimal);

        let heart_rate = match values.next() {
            Some(value) => value?,
            None => return Err(decode_failure("missing heart rate".to_string())),
        };
        let spo2 = match values.next() {
            Some(value) => value?,
            None => return Err(decode_failure("missing SpO2".to_string())),
        };

        Ok(Self { heart_rate, spo2 })
    }
}

fn parse_decimal(digits: &[u8]) -> Result<u16, UploadError> {
    digits.iter().try_fold(0u16, |acc, &digit| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(u16::from(digit - b'0')))
            .ok_or_else(|| {
                decode_failure(format!(
                    "value {} out of range",
                    String::from_utf8_lossy(digits)
                ))
            })
    })
}

fn decode_failure(reason: String) -> UploadError {
    UploadError::DecodeFailure {
        protocol: ProtocolId::Protocol09HrSpO2,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_separated() {
        let reading = HrSpO2Reading::parse(b"72,98").unwrap();
        assert_eq!(reading, HrSpO2Reading::new(72, 98));
    }

    #[test]
    fn test_parse_tolerates_padding_and_separators() {
        assert_eq!(
            HrSpO2Reading::parse(b" 065 / 097\0\0").unwrap(),
            HrSpO2Reading::new(65, 97)
        );
        assert_eq!(
            HrSpO2Reading::parse(b"HR:110 OX:93").unwrap(),
            HrSpO2Reading::new(110, 93)
        );
    }

    #[test]
    fn test_parse_ignores_extra_values() {
        let reading = HrSpO2Reading::parse(b"60,99,12").unwrap();
        assert_eq!(reading, HrSpO2Reading::new(60, 99));
    }

    #[test]
    fn test_parse_missing_spo2() {
        let err = HrSpO2Reading::parse(b"72").unwrap_err();
        assert!(matches!(
            err,
            UploadError::DecodeFailure {
                protocol: ProtocolId::Protocol09HrSpO2,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_empty() {
        assert!(HrSpO2Reading::parse(b"").is_err());
        assert!(HrSpO2Reading::parse(b" , ").is_err());
    }

    #[test]
    fn test_parse_rejects_non_ascii() {
        let err = HrSpO2Reading::parse(&[b'7', b'2', 0xC8, b'9', b'8']).unwrap_err();
        assert!(err.to_string().contains("non-ASCII"));
    }

    #[test]
    fn test_parse_rejects_overflow() {
        let err = HrSpO2Reading::parse(b"70000,98").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
