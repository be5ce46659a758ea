//! Session configuration.
//!
//! Everything the orchestrator needs besides the HTTP collaborator: the user
//! identifier sent with every request, endpoint paths, retry policy and event
//! channel sizing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::tags::ProtocolId;

/// Endpoint paths, relative to the backend base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Protocol 06 batch upload.
    pub protocol06: String,
    /// Protocol 07 batch upload.
    pub protocol07: String,
    /// Protocol 08 batch upload.
    pub protocol08: String,
    /// Protocol 09 heart-rate / SpO2 upload.
    pub protocol09: String,
    /// Sleep session start.
    pub sleep_start: String,
    /// Sleep session end.
    pub sleep_end: String,
    /// Daily-mode heart-rate / SpO2 upload.
    pub daily_hr_spo2: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            protocol06: "poli/sleep/protocol6".to_string(),
            protocol07: "poli/sleep/protocol7".to_string(),
            protocol08: "poli/sleep/protocol8".to_string(),
            protocol09: "poli/sleep/protocol9".to_string(),
            sleep_start: "poli/sleep/start".to_string(),
            sleep_end: "poli/sleep/end".to_string(),
            daily_hr_spo2: "poli/day/protocol3".to_string(),
        }
    }
}

impl Endpoints {
    /// Endpoint for a protocol's upload.
    pub fn for_protocol(&self, protocol: ProtocolId) -> &str {
        match protocol {
            ProtocolId::SleepStart => &self.sleep_start,
            ProtocolId::SleepEnd => &self.sleep_end,
            ProtocolId::Protocol06 => &self.protocol06,
            ProtocolId::Protocol07 => &self.protocol07,
            ProtocolId::Protocol08 => &self.protocol08,
            ProtocolId::Protocol09HrSpO2 => &self.protocol09,
        }
    }

    fn all(&self) -> [(&'static str, &str); 7] {
        [
            ("protocol06", self.protocol06.as_str()),
            ("protocol07", self.protocol07.as_str()),
            ("protocol08", self.protocol08.as_str()),
            ("protocol09", self.protocol09.as_str()),
            ("sleep_start", self.sleep_start.as_str()),
            ("sleep_end", self.sleep_end.as_str()),
            ("daily_hr_spo2", self.daily_hr_spo2.as_str()),
        ]
    }
}

/// Retry policy for uploads that fail at the network level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retry.
    pub max_retries: u32,
    /// Delay between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl RetryPolicy {
    /// No retries.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        delay_ms: 0,
    };

    /// Delay between attempts.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

/// Configuration for a [`SessionOrchestrator`](crate::SessionOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backend user serial number sent with every request.
    pub user_sno: i64,
    /// Endpoint paths.
    pub endpoints: Endpoints,
    /// Retry policy for network failures.
    pub retry: RetryPolicy,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl SessionConfig {
    /// Default event channel capacity.
    pub const DEFAULT_EVENT_CAPACITY: usize = 256;

    /// Create a config for a user with default endpoints.
    pub fn new(user_sno: i64) -> Self {
        Self {
            user_sno,
            ..Self::default()
        }
    }

    /// Load a config from JSON. Missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, max_retries: u32, delay: Duration) -> Self {
        self.retry = RetryPolicy {
            max_retries,
            delay_ms: delay.as_millis() as u64,
        };
        self
    }

    /// Set the endpoint paths.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Check the config for values that would break uploads.
    pub fn validate(&self) -> Result<()> {
        for (name, path) in self.endpoints.all() {
            if path.trim().is_empty() {
                return Err(Error::InvalidParameter {
                    name: format!("endpoints.{}", name),
                    value: path.to_string(),
                });
            }
        }

        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter {
                name: "event_capacity".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_sno: 0,
            endpoints: Endpoints::default(),
            retry: RetryPolicy::default(),
            event_capacity: Self::DEFAULT_EVENT_CAPACITY,
        }
    }
}
