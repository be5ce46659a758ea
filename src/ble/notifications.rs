//! GATT notification pump.
//!
//! Subscribes to the monitor's notify characteristic and forwards every
//! value to a [`FrameSink`], normally a
//! [`SessionOrchestrator`](crate::SessionOrchestrator).

use btleplug::api::{Characteristic, Peripheral};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::orchestrator::FrameSink;
use crate::utils::format_hex;

/// Forward values for `characteristic_uuid` from a notification stream to
/// `sink` until the stream ends.
///
/// Returns the number of frames forwarded.
pub async fn forward_notifications<S>(
    mut notifications: S,
    characteristic_uuid: Uuid,
    sink: &dyn FrameSink,
) -> u64
where
    S: Stream<Item = (Uuid, Vec<u8>)> + Unpin,
{
    let mut forwarded = 0;

    while let Some((uuid, value)) = notifications.next().await {
        if uuid != characteristic_uuid {
            trace!("Ignoring notification from {}", uuid);
            continue;
        }

        trace!("Notification: {} bytes, data: {}", value.len(), format_hex(&value));
        sink.on_frame(Bytes::from(value));
        forwarded += 1;
    }

    debug!("Notification stream ended after {} frames", forwarded);
    forwarded
}

/// Running subscription to one notify characteristic.
pub struct NotificationPump<P: Peripheral> {
    peripheral: P,
    characteristic: Characteristic,
    listener: Mutex<Option<JoinHandle<u64>>>,
}

impl<P: Peripheral + 'static> NotificationPump<P> {
    /// Subscribe to `characteristic_uuid` and start forwarding its
    /// notifications to `sink`.
    ///
    /// Services must already be discovered on `peripheral`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CharacteristicNotFound`] if the peripheral has no such
    /// characteristic, or a Bluetooth error if subscribing fails.
    pub async fn start(
        peripheral: P,
        characteristic_uuid: Uuid,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic_uuid)
            .ok_or_else(|| {
                debug!(
                    "Characteristic {} NOT found in discovered characteristics",
                    characteristic_uuid
                );
                Error::CharacteristicNotFound {
                    uuid: characteristic_uuid.to_string(),
                }
            })?;

        peripheral.subscribe(&characteristic).await.map_err(|e| {
            debug!("Failed to subscribe to {}: {:?}", characteristic_uuid, e);
            Error::Bluetooth(e)
        })?;

        let notifications = peripheral
            .notifications()
            .await?
            .map(|n| (n.uuid, n.value));

        let listener = tokio::spawn(async move {
            forward_notifications(notifications, characteristic_uuid, sink.as_ref()).await
        });

        debug!("Forwarding notifications from {}", characteristic_uuid);

        Ok(Self {
            peripheral,
            characteristic,
            listener: Mutex::new(Some(listener)),
        })
    }

    /// UUID of the characteristic being forwarded.
    pub fn characteristic_uuid(&self) -> Uuid {
        self.characteristic.uuid
    }

    /// Whether the listener task is still running.
    pub fn is_running(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Unsubscribe and stop forwarding.
    pub async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }

        self.peripheral
            .unsubscribe(&self.characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Unsubscribed from {}", self.characteristic.uuid);

        Ok(())
    }
}

impl<P: Peripheral> Drop for NotificationPump<P> {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.lock().take() {
            warn!(
                "Notification pump for {} dropped without stop()",
                self.characteristic.uuid
            );
            handle.abort();
        }
    }
}
