//! Upload dispatching.
//!
//! Turns flushed batches and decoded readings into backend requests and owns
//! the ordering rule for the composite HR/SpO2 path: both uploads start
//! together, results come back P07 first.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

use crate::api::SleepApi;
use crate::config::SessionConfig;
use crate::data::accumulator::FrameAccumulator;
use crate::data::requests::{HrSpO2Request, ProtocolUploadRequest, SleepSessionRequest};
use crate::data::responses::{SleepCommResponse, SleepResultResponse};
use crate::error::UploadError;
use crate::protocol::hr_spo2::HrSpO2Reading;
use crate::protocol::tags::ProtocolId;
use crate::utils::request_timestamp;

/// Outcome of one upload.
pub type UploadResult = Result<SleepCommResponse, UploadError>;

/// Builds and sends upload requests.
pub struct UploadDispatcher {
    api: Arc<dyn SleepApi>,
    config: Arc<SessionConfig>,
}

impl UploadDispatcher {
    /// Create a dispatcher over an API client.
    pub fn new(api: Arc<dyn SleepApi>, config: SessionConfig) -> Self {
        Self {
            api,
            config: Arc::new(config),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Flush an accumulator and upload its contents.
    ///
    /// Returns `None` without touching the network when the accumulator was
    /// empty.
    pub async fn upload_if_ready(&self, accumulator: &FrameAccumulator) -> Option<UploadResult> {
        let batch = accumulator.flush()?;
        Some(self.upload_batch(accumulator.protocol(), batch).await)
    }

    /// Upload an already-flushed batch for a binary protocol.
    pub async fn upload_batch(&self, protocol: ProtocolId, batch: Bytes) -> UploadResult {
        debug!("Uploading {} bytes for {}", batch.len(), protocol);

        let body = ProtocolUploadRequest::new(request_timestamp(), self.config.user_sno, &batch);
        let endpoint = self.config.endpoints.for_protocol(protocol);
        self.send(protocol, endpoint, &body, |text| {
            SleepCommResponse::parse(protocol, text)
        })
        .await
    }

    /// Upload a sleep-mode heart-rate / SpO2 reading.
    pub async fn upload_hr_spo2(&self, reading: HrSpO2Reading) -> UploadResult {
        let endpoint = &self.config.endpoints.protocol09;
        self.send_hr_spo2(endpoint, reading).await
    }

    /// Upload a daily-mode heart-rate / SpO2 reading.
    pub async fn upload_daily_hr_spo2(&self, reading: HrSpO2Reading) -> UploadResult {
        let endpoint = &self.config.endpoints.daily_hr_spo2;
        self.send_hr_spo2(endpoint, reading).await
    }

    /// Tell the backend a sleep session started.
    pub async fn start_sleep(&self) -> UploadResult {
        let protocol = ProtocolId::SleepStart;
        let body = self.session_request();
        self.send(protocol, &self.config.endpoints.sleep_start, &body, |text| {
            SleepCommResponse::parse(protocol, text)
        })
        .await
    }

    /// Tell the backend a sleep session ended and fetch its result.
    pub async fn end_sleep(&self) -> Result<SleepResultResponse, UploadError> {
        let body = self.session_request();
        self.send(
            ProtocolId::SleepEnd,
            &self.config.endpoints.sleep_end,
            &body,
            SleepResultResponse::parse,
        )
        .await
    }

    /// Run the composite HR/SpO2 path.
    ///
    /// The P07 upload (if there was a batch) and the HR/SpO2 upload run as
    /// separate tasks started back to back. They are joined P07 first, so the
    /// returned pair is always `[P07, HR/SpO2]` regardless of which finished
    /// first. A decode failure fills the HR/SpO2 slot without a network call.
    pub async fn upload_composite(
        self: &Arc<Self>,
        previous: Option<Bytes>,
        reading: Result<HrSpO2Reading, UploadError>,
    ) -> [(ProtocolId, Option<UploadResult>); 2] {
        let protocol07 = previous.map(|batch| {
            let dispatcher = self.clone();
            tokio::spawn(
                async move { dispatcher.upload_batch(ProtocolId::Protocol07, batch).await }
                    .instrument(info_span!("upload", protocol = %ProtocolId::Protocol07)),
            )
        });

        let hr_spo2 = reading.map(|reading| {
            let dispatcher = self.clone();
            tokio::spawn(
                async move { dispatcher.upload_hr_spo2(reading).await }
                    .instrument(info_span!("upload", protocol = %ProtocolId::Protocol09HrSpO2)),
            )
        });

        let protocol07_result = match protocol07 {
            Some(handle) => Some(join_upload(ProtocolId::Protocol07, handle).await),
            None => None,
        };

        let hr_spo2_result = match hr_spo2 {
            Ok(handle) => join_upload(ProtocolId::Protocol09HrSpO2, handle).await,
            Err(e) => Err(e),
        };

        [
            (ProtocolId::Protocol07, protocol07_result),
            (ProtocolId::Protocol09HrSpO2, Some(hr_spo2_result)),
        ]
    }

    async fn send_hr_spo2(&self, endpoint: &str, reading: HrSpO2Reading) -> UploadResult {
        let protocol = ProtocolId::Protocol09HrSpO2;
        debug!(
            "Uploading HR/SpO2 reading: hr={} spo2={}",
            reading.heart_rate, reading.spo2
        );

        let body = HrSpO2Request::new(request_timestamp(), self.config.user_sno, reading);
        self.send(protocol, endpoint, &body, |text| {
            SleepCommResponse::parse(protocol, text)
        })
        .await
    }

    fn session_request(&self) -> SleepSessionRequest {
        SleepSessionRequest {
            req_date: request_timestamp(),
            user_sno: self.config.user_sno,
        }
    }

    /// POST a body and parse the response, retrying per the retry policy.
    ///
    /// Only retryable failures are retried; a response that cannot be parsed
    /// is returned as-is.
    async fn send<T, R, F>(
        &self,
        protocol: ProtocolId,
        endpoint: &str,
        body: &T,
        parse: F,
    ) -> Result<R, UploadError>
    where
        T: Serialize,
        F: Fn(&str) -> Result<R, UploadError>,
    {
        let body = serde_json::to_value(body).map_err(|e| UploadError::DecodeFailure {
            protocol,
            reason: format!("could not encode request: {}", e),
        })?;

        let policy = self.config.retry;
        let max_attempts = policy.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let result = match self.api.post(endpoint, body.clone()).await {
                Ok(text) => parse(&text),
                Err(e) => Err(UploadError::NetworkFailure {
                    protocol,
                    reason: match e.status {
                        Some(status) => format!("HTTP {}: {}", status, e.message),
                        None => e.message,
                    },
                }),
            };

            match result {
                Ok(response) => {
                    debug!("{} upload to {} succeeded", protocol, endpoint);
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        "{} upload attempt {} of {} failed: {}",
                        protocol, attempts, max_attempts, e
                    );

                    if !e.is_retryable() || attempts >= max_attempts {
                        return Err(e);
                    }

                    tokio::time::sleep(policy.delay()).await;
                }
            }
        }
    }
}

async fn join_upload(protocol: ProtocolId, handle: JoinHandle<UploadResult>) -> UploadResult {
    handle.await.unwrap_or_else(|e| {
        Err(UploadError::TaskFailed {
            protocol,
            reason: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeSleepApi;
    use crate::api::MockSleepApi;
    use crate::api::TransportError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn dispatcher(api: FakeSleepApi) -> (Arc<FakeSleepApi>, Arc<UploadDispatcher>) {
        let api = Arc::new(api);
        let dispatcher = Arc::new(UploadDispatcher::new(api.clone(), SessionConfig::new(42)));
        (api, dispatcher)
    }

    #[tokio::test]
    async fn test_upload_if_ready_skips_empty_accumulator() {
        let mut api = MockSleepApi::new();
        api.expect_post().never();

        let dispatcher = UploadDispatcher::new(Arc::new(api), SessionConfig::new(1));
        let acc = FrameAccumulator::new(ProtocolId::Protocol06);

        assert!(dispatcher.upload_if_ready(&acc).await.is_none());
        assert!(dispatcher.upload_if_ready(&acc).await.is_none());
    }

    #[tokio::test]
    async fn test_upload_if_ready_posts_once_then_drains() {
        let mut api = MockSleepApi::new();
        api.expect_post()
            .times(1)
            .returning(|_, _| Ok(r#"{"retCd":"0000"}"#.to_string()));

        let dispatcher = UploadDispatcher::new(Arc::new(api), SessionConfig::new(1));
        let acc = FrameAccumulator::new(ProtocolId::Protocol08);
        acc.append(&[1, 2, 3]);

        let result = dispatcher.upload_if_ready(&acc).await.unwrap();
        assert!(tokio_test::assert_ok!(result).is_success());
        assert!(dispatcher.upload_if_ready(&acc).await.is_none());
    }

    #[tokio::test]
    async fn test_upload_batch_body() {
        let (api, dispatcher) = dispatcher(FakeSleepApi::new());

        let response = dispatcher
            .upload_batch(ProtocolId::Protocol06, Bytes::from_static(&[0xAA, 0xBB, 0xCC]))
            .await
            .unwrap();
        assert_eq!(response.ret_msg.as_deref(), Some("poli/sleep/protocol6"));

        let requests = api.requests_to("poli/sleep/protocol6");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["userSno"], json!(42));
        assert_eq!(requests[0]["data"], json!([0xAA, 0xBB, 0xCC]));
        assert_eq!(requests[0]["reqDate"].as_str().unwrap().len(), 14);
    }

    #[tokio::test]
    async fn test_hr_spo2_endpoints() {
        let (api, dispatcher) = dispatcher(FakeSleepApi::new());
        let reading = HrSpO2Reading::new(61, 96);

        dispatcher.upload_hr_spo2(reading).await.unwrap();
        dispatcher.upload_daily_hr_spo2(reading).await.unwrap();

        let sleep = api.requests_to("poli/sleep/protocol9");
        let daily = api.requests_to("poli/day/protocol3");
        assert_eq!(sleep.len(), 1);
        assert_eq!(daily.len(), 1);
        assert_eq!(
            sleep[0]["data"],
            json!({ "oxygenVal": 96, "heartRateVal": 61 })
        );
    }

    #[tokio::test]
    async fn test_session_calls() {
        let (api, dispatcher) = dispatcher(FakeSleepApi::new());

        assert!(dispatcher.start_sleep().await.unwrap().is_success());
        assert!(dispatcher.end_sleep().await.unwrap().is_success());

        let endpoints: Vec<_> = api.requests().into_iter().map(|(e, _)| e).collect();
        assert_eq!(endpoints, vec!["poli/sleep/start", "poli/sleep/end"]);
    }

    #[tokio::test]
    async fn test_network_failure_is_typed() {
        let mut api = MockSleepApi::new();
        api.expect_post()
            .times(1)
            .returning(|_, _| Err(TransportError::with_status(500, "boom")));

        let dispatcher = UploadDispatcher::new(Arc::new(api), SessionConfig::new(1));
        let err = dispatcher
            .upload_batch(ProtocolId::Protocol07, Bytes::from_static(&[1]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            UploadError::NetworkFailure {
                protocol: ProtocolId::Protocol07,
                reason: "HTTP 500: boom".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_response_is_decode_failure() {
        let (_api, dispatcher) =
            dispatcher(FakeSleepApi::new().with_malformed_response("poli/sleep/protocol8"));

        let err = dispatcher
            .upload_batch(ProtocolId::Protocol08, Bytes::from_static(&[1]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::DecodeFailure {
                protocol: ProtocolId::Protocol08,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let api = Arc::new(FakeSleepApi::new().with_failures("poli/sleep/protocol6", 2));
        let config = SessionConfig::new(1).with_retry(2, Duration::from_millis(1));
        let dispatcher = UploadDispatcher::new(api.clone(), config);

        let result = dispatcher
            .upload_batch(ProtocolId::Protocol06, Bytes::from_static(&[5]))
            .await;

        assert!(result.is_ok());
        assert_eq!(api.requests_to("poli/sleep/protocol6").len(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let api = Arc::new(FakeSleepApi::new().with_failures("poli/sleep/protocol6", 5));
        let config = SessionConfig::new(1).with_retry(1, Duration::from_millis(1));
        let dispatcher = UploadDispatcher::new(api.clone(), config);

        let result = dispatcher
            .upload_batch(ProtocolId::Protocol06, Bytes::from_static(&[5]))
            .await;

        assert!(matches!(result, Err(UploadError::NetworkFailure { .. })));
        assert_eq!(api.requests_to("poli/sleep/protocol6").len(), 2);
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_retried() {
        let api = Arc::new(FakeSleepApi::new().with_malformed_response("poli/sleep/protocol7"));
        let config = SessionConfig::new(1).with_retry(3, Duration::from_millis(1));
        let dispatcher = UploadDispatcher::new(api.clone(), config);

        let result = dispatcher
            .upload_batch(ProtocolId::Protocol07, Bytes::from_static(&[5]))
            .await;

        assert!(matches!(result, Err(UploadError::DecodeFailure { .. })));
        assert_eq!(api.requests_to("poli/sleep/protocol7").len(), 1);
    }

    #[tokio::test]
    async fn test_composite_reports_protocol07_first_even_if_slower() {
        let (api, dispatcher) = dispatcher(
            FakeSleepApi::new().with_delay("poli/sleep/protocol7", Duration::from_millis(80)),
        );

        let results = dispatcher
            .upload_composite(
                Some(Bytes::from_static(&[0x41])),
                Ok(HrSpO2Reading::new(70, 97)),
            )
            .await;

        assert_eq!(
            api.completion_order(),
            vec!["poli/sleep/protocol9", "poli/sleep/protocol7"]
        );
        assert_eq!(results[0].0, ProtocolId::Protocol07);
        assert_eq!(results[1].0, ProtocolId::Protocol09HrSpO2);
        assert_eq!(
            results[0].1.clone().unwrap().unwrap().ret_msg.as_deref(),
            Some("poli/sleep/protocol7")
        );
        assert_eq!(
            results[1].1.clone().unwrap().unwrap().ret_msg.as_deref(),
            Some("poli/sleep/protocol9")
        );
    }

    #[tokio::test]
    async fn test_composite_without_protocol07_data() {
        let (api, dispatcher) = dispatcher(FakeSleepApi::new());

        let results = dispatcher
            .upload_composite(None, Ok(HrSpO2Reading::new(70, 97)))
            .await;

        assert!(results[0].1.is_none());
        assert!(results[1].1.as_ref().unwrap().is_ok());
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_composite_decode_failure_still_uploads_protocol07() {
        let (api, dispatcher) = dispatcher(FakeSleepApi::new());
        let decode_error = UploadError::DecodeFailure {
            protocol: ProtocolId::Protocol09HrSpO2,
            reason: "missing SpO2".to_string(),
        };

        let results = dispatcher
            .upload_composite(Some(Bytes::from_static(&[1])), Err(decode_error.clone()))
            .await;

        assert!(results[0].1.as_ref().unwrap().is_ok());
        assert_eq!(results[1].1, Some(Err(decode_error)));
        assert_eq!(api.requests_to("poli/sleep/protocol7").len(), 1);
        assert!(api.requests_to("poli/sleep/protocol9").is_empty());
    }
}
