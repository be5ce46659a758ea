//! Session orchestration.
//!
//! [`SessionOrchestrator`] is what a BLE transport's notification callback
//! talks to. It owns the live [`SleepSession`], routes each frame through the
//! [`ProtocolRouter`], and hands completed batches to the
//! [`UploadDispatcher`] on background tasks. Results are published as
//! [`SessionEvent`]s on a single broadcast channel.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::api::{SleepApi, UploadDispatcher, UploadResult};
use crate::config::SessionConfig;
use crate::data::responses::{SleepCommResponse, SleepResultResponse};
use crate::data::session::SleepSession;
use crate::error::{Error, ProtocolError, Result, UploadError};
use crate::protocol::router::{ProtocolRouter, RoutedFrame};
use crate::protocol::tags::ProtocolId;
use crate::utils::format_hex;

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Event published to the caller.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The device reported SLEEP_START.
    SleepStart {
        /// Session opened for it.
        session: Uuid,
    },
    /// The device reported SLEEP_END.
    SleepEnd {
        /// Session that was closed, if one was live.
        session: Option<Uuid>,
    },
    /// An upload step finished.
    ///
    /// `result` is `None` only for the P07 slot of the composite HR/SpO2 path
    /// when there was no P07 data to send.
    Upload {
        /// Session the data belonged to.
        session: Uuid,
        /// Protocol the result is for.
        protocol: ProtocolId,
        /// Upload outcome.
        result: Option<UploadResult>,
    },
    /// A frame could not be routed and was discarded.
    FrameRejected(ProtocolError),
    /// A session was discarded with unsent data.
    DataDropped {
        /// Session that was discarded.
        session: Uuid,
        /// Protocol whose buffer was lost.
        protocol: ProtocolId,
        /// Number of bytes lost.
        bytes: usize,
    },
}

impl SessionEvent {
    /// Protocol this event concerns, if any.
    pub fn protocol(&self) -> Option<ProtocolId> {
        match self {
            Self::SleepStart { .. } => Some(ProtocolId::SleepStart),
            Self::SleepEnd { .. } => Some(ProtocolId::SleepEnd),
            Self::Upload { protocol, .. } | Self::DataDropped { protocol, .. } => Some(*protocol),
            Self::FrameRejected(_) => None,
        }
    }
}

/// Destination for raw notification frames.
pub trait FrameSink: Send + Sync {
    /// Accept one frame. Must not block.
    fn on_frame(&self, frame: Bytes);
}

/// Entry point for a monitoring session's notification stream.
pub struct SessionOrchestrator {
    /// Frame router.
    router: ProtocolRouter,
    /// Upload dispatcher shared with background tasks.
    dispatcher: Arc<UploadDispatcher>,
    /// Live session, if any.
    session: RwLock<Option<Arc<SleepSession>>>,
    /// Event channel.
    event_tx: broadcast::Sender<SessionEvent>,
    /// Runtime background uploads are spawned on.
    runtime: Handle,
    /// Upload tasks not yet joined.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl SessionOrchestrator {
    /// Create an orchestrator on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a runtime or the config is invalid.
    pub fn new(api: Arc<dyn SleepApi>, config: SessionConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?;
        Self::with_runtime(api, config, runtime)
    }

    /// Create an orchestrator that spawns uploads on a given runtime.
    ///
    /// Use this when frames arrive on a thread that is not part of a runtime.
    pub fn with_runtime(
        api: Arc<dyn SleepApi>,
        config: SessionConfig,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            router: ProtocolRouter::new(),
            dispatcher: Arc::new(UploadDispatcher::new(api, config)),
            session: RwLock::new(None),
            event_tx,
            runtime,
            tasks: Mutex::new(Vec::new()),
            callback_counter: AtomicU64::new(0),
        })
    }

    /// Handle one raw notification frame.
    ///
    /// Routing and buffering happen inline; uploads are spawned and this
    /// returns without waiting for them. Routing errors are published as
    /// [`SessionEvent::FrameRejected`].
    pub fn on_frame(&self, frame: impl Into<Bytes>) {
        let frame = frame.into();
        trace!("onCharacteristicChanged: {}", format_hex(&frame));

        let protocol = match self.router.classify(&frame) {
            Ok(protocol) => protocol,
            Err(e) => {
                self.reject(e);
                return;
            }
        };

        // Markers swap the session slot, so they never reach the router.
        if protocol.is_session_marker() {
            if protocol == ProtocolId::SleepStart {
                self.on_start();
            } else {
                self.on_end();
            }
            return;
        }

        self.route_data_frame(frame);
    }

    /// Open a new session and publish [`SessionEvent::SleepStart`].
    ///
    /// A session that is still live is ended first and its buffers uploaded.
    pub fn on_start(&self) -> Uuid {
        let session = Arc::new(SleepSession::new());
        let id = session.id();

        let previous = self.session.write().replace(session);
        if let Some(previous) = previous {
            warn!(
                "SLEEP_START while session {} is live; closing it first",
                previous.id()
            );
            self.finish_session(&previous);
        }

        info!("Sleep session {} started", id);
        self.emit(SessionEvent::SleepStart { session: id });

        id
    }

    /// Close the live session, publishing [`SessionEvent::SleepEnd`] and
    /// uploading every non-empty buffer.
    pub fn on_end(&self) -> Option<Uuid> {
        let session = self.session.write().take();

        match session {
            Some(session) => {
                let id = session.id();
                info!("Sleep session {} ended", id);
                self.emit(SessionEvent::SleepEnd { session: Some(id) });
                self.finish_session(&session);
                Some(id)
            }
            None => {
                warn!("SLEEP_END with no live session");
                self.emit(SessionEvent::SleepEnd { session: None });
                None
            }
        }
    }

    /// Discard the live session without uploading.
    ///
    /// Every non-empty buffer is logged and published as
    /// [`SessionEvent::DataDropped`].
    pub fn abort_session(&self) -> Option<Uuid> {
        let session = self.session.write().take()?;
        let id = session.id();

        for (protocol, batch) in session.flush_all() {
            warn!(
                "Dropping {} unsent bytes for {} from session {}",
                batch.len(),
                protocol,
                id
            );
            self.emit(SessionEvent::DataDropped {
                session: id,
                protocol,
                bytes: batch.len(),
            });
        }

        info!("Sleep session {} aborted", id);
        Some(id)
    }

    /// Id of the live session, if any.
    pub fn current_session(&self) -> Option<Uuid> {
        self.session.read().as_ref().map(|s| s.id())
    }

    /// Bytes buffered for a protocol in the live session.
    pub fn buffered_len(&self, protocol: ProtocolId) -> usize {
        self.session
            .read()
            .as_ref()
            .and_then(|s| s.accumulator(protocol).map(|acc| acc.len()))
            .unwrap_or(0)
    }

    /// Tell the backend a sleep session started.
    pub async fn request_sleep_start(&self) -> std::result::Result<SleepCommResponse, UploadError> {
        self.dispatcher.start_sleep().await
    }

    /// Tell the backend a sleep session ended and fetch its result.
    pub async fn request_sleep_end(&self) -> std::result::Result<SleepResultResponse, UploadError> {
        self.dispatcher.end_sleep().await
    }

    /// The upload dispatcher.
    pub fn dispatcher(&self) -> &Arc<UploadDispatcher> {
        &self.dispatcher
    }

    /// Subscribe to session events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Register a callback for session events.
    ///
    /// Events are delivered in the order they were published.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.event_tx.subscribe();

        let handle = self.runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event callback {} lagged, {} events skipped", callback_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Wait until every upload spawned so far has delivered its result.
    pub async fn wait_for_uploads(&self) {
        loop {
            let pending = std::mem::take(&mut *self.tasks.lock());
            if pending.is_empty() {
                return;
            }

            for handle in pending {
                if let Err(e) = handle.await {
                    error!("Upload task failed: {}", e);
                }
            }
        }
    }

    /// End the live session (uploading its buffers) and wait for every
    /// outstanding upload.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down session orchestrator");

        if let Some(session) = self.session.write().take() {
            self.finish_session(&session);
        }

        self.wait_for_uploads().await;

        Ok(())
    }

    /// Route a data frame into the live session, opening an implicit one if
    /// frames arrive outside START/END.
    ///
    /// The session slot stays locked until routing returns, so `on_start`,
    /// `on_end` and `abort_session` cannot flush a session while a payload is
    /// still being appended to it.
    fn route_data_frame(&self, frame: Bytes) {
        let slot = self.session.read();
        if let Some(session) = slot.as_ref() {
            self.route_into(session, frame);
            return;
        }
        drop(slot);

        let mut slot = self.session.write();
        let session = slot.get_or_insert_with(|| {
            let session = Arc::new(SleepSession::new());
            info!(
                "Data frame with no live session; opened implicit session {}",
                session.id()
            );
            session
        });
        self.route_into(session, frame);
    }

    fn route_into(&self, session: &SleepSession, frame: Bytes) {
        match self.router.route(frame, session) {
            Ok(routed) => self.dispatch(session.id(), routed),
            Err(e) => self.reject(e),
        }
    }

    /// Flush every buffer of a closing session and upload the batches.
    fn finish_session(&self, session: &SleepSession) {
        let id = session.id();
        let batches = session.flush_all();

        if batches.is_empty() {
            debug!("Session {} closed with empty buffers", id);
            return;
        }

        let dispatcher = self.dispatcher.clone();
        let event_tx = self.event_tx.clone();

        self.spawn_upload(
            async move {
                let uploads = batches.into_iter().map(|(protocol, batch)| {
                    let dispatcher = dispatcher.clone();
                    async move { (protocol, dispatcher.upload_batch(protocol, batch).await) }
                });

                for (protocol, result) in futures::future::join_all(uploads).await {
                    publish_upload(&event_tx, id, protocol, Some(result));
                }
            }
            .instrument(info_span!("finish_session", session = %id)),
        );
    }

    fn dispatch(&self, session: Uuid, routed: RoutedFrame) {
        if !routed.needs_upload() {
            // A composite frame with no P07 data and an undecodable reading
            // still reports both slots.
            if let RoutedFrame::Composite {
                reading: Err(e), ..
            } = routed
            {
                publish_upload(&self.event_tx, session, ProtocolId::Protocol07, None);
                publish_upload(
                    &self.event_tx,
                    session,
                    ProtocolId::Protocol09HrSpO2,
                    Some(Err(e)),
                );
            }
            return;
        }

        let dispatcher = self.dispatcher.clone();
        let event_tx = self.event_tx.clone();

        match routed {
            RoutedFrame::CrossTrigger {
                completed,
                batch: Some(batch),
                ..
            } => {
                self.spawn_upload(
                    async move {
                        let result = dispatcher.upload_batch(completed, batch).await;
                        publish_upload(&event_tx, session, completed, Some(result));
                    }
                    .instrument(info_span!("upload", protocol = %completed, session = %session)),
                );
            }
            RoutedFrame::Composite { previous, reading } => {
                self.spawn_upload(
                    async move {
                        let results = dispatcher.upload_composite(previous, reading).await;
                        for (protocol, result) in results {
                            publish_upload(&event_tx, session, protocol, result);
                        }
                    }
                    .instrument(info_span!("composite_upload", session = %session)),
                );
            }
            other => debug!("Nothing to upload for {:?}", other),
        }
    }

    fn spawn_upload<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime.spawn(task);

        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn reject(&self, error: ProtocolError) {
        warn!("Frame rejected: {}", error);
        self.emit(SessionEvent::FrameRejected(error));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl FrameSink for SessionOrchestrator {
    fn on_frame(&self, frame: Bytes) {
        SessionOrchestrator::on_frame(self, frame);
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("session", &self.current_session())
            .field("pending_uploads", &self.tasks.lock().len())
            .finish()
    }
}

fn publish_upload(
    event_tx: &broadcast::Sender<SessionEvent>,
    session: Uuid,
    protocol: ProtocolId,
    result: Option<UploadResult>,
) {
    match &result {
        Some(Ok(response)) => debug!("{} upload done: {:?}", protocol, response.ret_cd),
        Some(Err(e)) => warn!("{} upload failed, batch lost: {}", protocol, e),
        None => debug!("{} had no data to upload", protocol),
    }

    let _ = event_tx.send(SessionEvent::Upload {
        session,
        protocol,
        result,
    });
}
