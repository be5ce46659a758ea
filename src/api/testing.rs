//! In-memory `SleepApi` for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::{SleepApi, TransportError};

/// Records every request and answers with a success envelope whose `retMsg`
/// echoes the endpoint. Per-endpoint delays and failures are configurable.
#[derive(Default)]
pub(crate) struct FakeSleepApi {
    delays: HashMap<String, Duration>,
    failures: Mutex<HashMap<String, u32>>,
    malformed: HashSet<String>,
    requests: Mutex<Vec<(String, Value)>>,
    completed: Mutex<Vec<String>>,
}

impl FakeSleepApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, endpoint: &str, delay: Duration) -> Self {
        self.delays.insert(endpoint.to_string(), delay);
        self
    }

    /// Fail the next `times` calls to `endpoint`.
    pub(crate) fn with_failures(self, endpoint: &str, times: u32) -> Self {
        self.failures.lock().insert(endpoint.to_string(), times);
        self
    }

    pub(crate) fn with_malformed_response(mut self, endpoint: &str) -> Self {
        self.malformed.insert(endpoint.to_string());
        self
    }

    pub(crate) fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }

    pub(crate) fn requests_to(&self, endpoint: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Endpoints in the order their responses completed.
    pub(crate) fn completion_order(&self) -> Vec<String> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl SleepApi for FakeSleepApi {
    async fn post(&self, endpoint: &str, body: Value) -> Result<String, TransportError> {
        self.requests.lock().push((endpoint.to_string(), body));

        if let Some(delay) = self.delays.get(endpoint) {
            tokio::time::sleep(*delay).await;
        }

        self.completed.lock().push(endpoint.to_string());

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(endpoint) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TransportError::with_status(503, "service unavailable"));
                }
            }
        }

        if self.malformed.contains(endpoint) {
            return Ok("<html>bad gateway</html>".to_string());
        }

        Ok(format!(r#"{{"retCd":"0000","retMsg":"{}"}}"#, endpoint))
    }
}
