//! Utility functions for the sleep-protocol-ble crate.

use chrono::{DateTime, Local, TimeZone};

/// Timestamp format the backend expects, e.g. `20240704054513`.
pub const REQUEST_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Current local time formatted as `yyyyMMddHHmmss`.
pub fn request_timestamp() -> String {
    format_request_timestamp(&Local::now())
}

/// Format a time as `yyyyMMddHHmmss`.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use sleep_protocol_ble::utils::format_request_timestamp;
///
/// let t = Utc.with_ymd_and_hms(2024, 7, 4, 5, 45, 13).unwrap();
/// assert_eq!(format_request_timestamp(&t), "20240704054513");
/// ```
pub fn format_request_timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(REQUEST_TIMESTAMP_FORMAT).to_string()
}

/// Format bytes as space-separated lowercase hex, for logging.
#[inline]
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_request_timestamp_shape() {
        let stamp = request_timestamp();
        assert_eq!(stamp.len(), 14);
        assert!(stamp.bytes().all(|b| b.is_ascii_digit()));
        assert!(NaiveDateTime::parse_from_str(&stamp, REQUEST_TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x06, 0x00, 0xAA]), "06 00 aa");
        assert_eq!(format_hex(&[]), "");
    }
}
