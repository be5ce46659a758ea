//! Upload request bodies.

use serde::{Deserialize, Serialize};

use crate::protocol::hr_spo2::HrSpO2Reading;

/// Body for a binary protocol batch (Protocol 06/07/08).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolUploadRequest {
    /// Request time, `yyyyMMddHHmmss`.
    pub req_date: String,
    /// Backend user serial number.
    pub user_sno: i64,
    /// Raw accumulated payload.
    pub data: Vec<u8>,
}

impl ProtocolUploadRequest {
    /// Create a request body for a flushed batch.
    pub fn new(req_date: impl Into<String>, user_sno: i64, data: &[u8]) -> Self {
        Self {
            req_date: req_date.into(),
            user_sno,
            data: data.to_vec(),
        }
    }
}

/// Body for a heart-rate / SpO2 reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrSpO2Request {
    /// Request time, `yyyyMMddHHmmss`.
    pub req_date: String,
    /// Backend user serial number.
    pub user_sno: i64,
    /// The reading.
    pub data: HrSpO2Data,
}

/// Reading values as the backend names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrSpO2Data {
    /// Oxygen saturation in percent.
    pub oxygen_val: u16,
    /// Heart rate in beats per minute.
    pub heart_rate_val: u16,
}

impl HrSpO2Request {
    /// Create a request body for a decoded reading.
    pub fn new(req_date: impl Into<String>, user_sno: i64, reading: HrSpO2Reading) -> Self {
        Self {
            req_date: req_date.into(),
            user_sno,
            data: HrSpO2Data {
                oxygen_val: reading.spo2,
                heart_rate_val: reading.heart_rate,
            },
        }
    }
}

/// Body for the session start / end calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSessionRequest {
    /// Request time, `yyyyMMddHHmmss`.
    pub req_date: String,
    /// Backend user serial number.
    pub user_sno: i64,
}
