//! Notification subscription management.
//!
//! Owns the single oximetry subscription: writes the configuration
//! descriptor, runs the one notification listener, and feeds decoded
//! readings to the latest-reading cell and the display sink.

use chrono::Local;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::gatt::{CccdValue, CharacteristicDescriptor, GattDevice, NotificationStream};
use crate::data::ReadingCell;
use crate::error::SubscribeError;
use crate::feedback::{Severity, UserFeedback};
use crate::protocol::decode;

/// Message shown when a reading carries a disconnect code.
pub const CHECK_CONNECTION_MESSAGE: &str = "Please check connection and reconnect.";

/// Subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubscriptionState {
    /// No notifications are enabled.
    #[default]
    Unsubscribed,
    /// Notifications are enabled and one listener is running.
    Subscribed,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsubscribed => write!(f, "Unsubscribed"),
            Self::Subscribed => write!(f, "Subscribed"),
        }
    }
}

/// The live subscription.
struct ActiveSubscription {
    /// Identity of this subscription; notifications from older ones are dropped.
    generation: u64,
    /// The device is owned by the lifecycle controller.
    device: Weak<dyn GattDevice>,
    /// The subscribed characteristic.
    characteristic: CharacteristicDescriptor,
    /// Stops the listener.
    cancel: CancellationToken,
    /// The listener task.
    listener: JoinHandle<()>,
}

struct Inner {
    /// Serializes subscribe/unsubscribe transitions.
    transition: tokio::sync::Mutex<()>,
    active: RwLock<Option<ActiveSubscription>>,
    generation: AtomicU64,
    latest: ReadingCell,
    feedback: Arc<dyn UserFeedback>,
}

/// Manages the single characteristic subscription.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Inner>,
}

impl SubscriptionManager {
    /// Create a manager that publishes readings to `latest` and `feedback`.
    pub fn new(latest: ReadingCell, feedback: Arc<dyn UserFeedback>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transition: tokio::sync::Mutex::new(()),
                active: RwLock::new(None),
                generation: AtomicU64::new(0),
                latest,
                feedback,
            }),
        }
    }

    /// Get the current subscription state.
    pub fn state(&self) -> SubscriptionState {
        if self.inner.active.read().is_some() {
            SubscriptionState::Subscribed
        } else {
            SubscriptionState::Unsubscribed
        }
    }

    /// Check if subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.state() == SubscriptionState::Subscribed
    }

    /// Get the subscribed characteristic, if any.
    pub fn subscribed_characteristic(&self) -> Option<CharacteristicDescriptor> {
        self.inner
            .active
            .read()
            .as_ref()
            .map(|active| active.characteristic.clone())
    }

    /// The latest-reading cell fed by this manager.
    pub fn latest(&self) -> &ReadingCell {
        &self.inner.latest
    }

    /// Enable notifications on `characteristic`.
    ///
    /// Subscribing again to the same characteristic is a no-op. Subscribing
    /// to a different one first unsubscribes the current one.
    pub async fn subscribe(
        &self,
        device: &Arc<dyn GattDevice>,
        characteristic: &CharacteristicDescriptor,
    ) -> Result<(), SubscribeError> {
        let guard = self.inner.transition.lock().await;

        let mut previous_listener = None;
        if let Some(current) = self.subscribed_characteristic() {
            if current.same_attribute(characteristic) {
                debug!("Already subscribed to {}", characteristic.uuid);
                return Ok(());
            }

            debug!(
                "Switching subscription from {} to {}",
                current.uuid, characteristic.uuid
            );
            previous_listener = self.inner.unsubscribe_locked().await?;
        }

        let result = self.inner.subscribe_locked(device, characteristic).await;
        drop(guard);

        if let Some(listener) = previous_listener {
            let _ = listener.await;
        }

        result
    }

    /// Disable notifications on the subscribed characteristic.
    ///
    /// A no-op when not subscribed. If the device rejects the write the
    /// subscription is kept and [`SubscribeError::RemoteRejected`] returned.
    pub async fn unsubscribe(&self) -> Result<(), SubscribeError> {
        let guard = self.inner.transition.lock().await;
        let listener = self.inner.unsubscribe_locked().await?;
        drop(guard);

        if let Some(listener) = listener {
            let _ = listener.await;
        }

        Ok(())
    }

    /// Drop the subscription locally without writing to the device.
    pub async fn force_clear(&self) {
        let guard = self.inner.transition.lock().await;
        let listener = self.inner.clear_active();
        drop(guard);

        if let Some(listener) = listener {
            let _ = listener.await;
        }
    }
}

impl Inner {
    async fn subscribe_locked(
        self: &Arc<Self>,
        device: &Arc<dyn GattDevice>,
        characteristic: &CharacteristicDescriptor,
    ) -> Result<(), SubscribeError> {
        debug!(
            "Subscribing to {}, properties: {:?}",
            characteristic.uuid, characteristic.properties
        );

        let value = characteristic.preferred_cccd_value().ok_or_else(|| {
            SubscribeError::UnsupportedCharacteristic {
                uuid: characteristic.uuid.to_string(),
            }
        })?;

        // The stream is only consumed once the descriptor write succeeds.
        let stream = device.notifications().await.map_err(|e| {
            SubscribeError::NotificationsUnavailable {
                reason: e.to_string(),
            }
        })?;

        if let Err(e) = device.write_cccd(characteristic, value).await {
            warn!("Failed to write {} to {}: {}", value, characteristic.uuid, e);
            return Err(SubscribeError::Unauthorized {
                reason: e.to_string(),
            });
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();

        // The listener must not observe the stream before it is current.
        let mut active = self.active.write();
        let listener = tokio::spawn(listen(
            Arc::downgrade(self),
            generation,
            characteristic.uuid,
            stream,
            cancel.clone(),
        ));
        *active = Some(ActiveSubscription {
            generation,
            device: Arc::downgrade(device),
            characteristic: characteristic.clone(),
            cancel,
            listener,
        });
        drop(active);

        info!(
            "Subscribed to {} ({}) with {}",
            characteristic.name, characteristic.uuid, value
        );

        Ok(())
    }

    /// Write CCCD None and clear the subscription.
    ///
    /// Returns the stopped listener so the caller can await it after
    /// releasing the transition lock.
    async fn unsubscribe_locked(&self) -> Result<Option<JoinHandle<()>>, SubscribeError> {
        let target = self
            .active
            .read()
            .as_ref()
            .map(|active| (active.device.clone(), active.characteristic.clone()));

        let Some((device, characteristic)) = target else {
            return Ok(None);
        };

        match device.upgrade() {
            Some(device) => {
                if let Err(e) = device.write_cccd(&characteristic, CccdValue::None).await {
                    warn!("Failed to unsubscribe from {}: {}", characteristic.uuid, e);
                    return Err(SubscribeError::RemoteRejected {
                        reason: e.to_string(),
                    });
                }
                info!("Unsubscribed from {}", characteristic.uuid);
            }
            None => {
                debug!("Device already released, clearing subscription locally");
            }
        }

        Ok(self.clear_active())
    }

    /// Invalidate the subscription identity and stop its listener.
    fn clear_active(&self) -> Option<JoinHandle<()>> {
        let active = self.active.write().take()?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        active.cancel.cancel();
        debug!("Subscription {} cleared", active.generation);
        Some(active.listener)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.active
            .read()
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    async fn on_notification(&self, generation: u64, data: &[u8]) -> ControlFlow<()> {
        if !self.is_current(generation) {
            return ControlFlow::Break(());
        }

        let reading = match decode(data) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Failed to decode oximetry notification: {}", e);
                self.feedback
                    .notify_user(&format!("Unable to decode reading: {}", e), Severity::Error);
                return ControlFlow::Continue(());
            }
        };

        {
            // Held across the update so a concurrent clear cannot interleave.
            let active = self.active.read();
            if active.as_ref().map(|a| a.generation) != Some(generation) {
                return ControlFlow::Break(());
            }
            self.latest.set(reading.clone());
        }

        self.feedback
            .display_reading(&reading, reading.timestamp.with_timezone(&Local));

        if reading.signals_check_connection() {
            self.feedback
                .notify_user(CHECK_CONNECTION_MESSAGE, Severity::Error);
            self.clear_after_disconnect_code(generation).await;
            return ControlFlow::Break(());
        }

        ControlFlow::Continue(())
    }

    /// Stop stale notifications after the sensor reported a disconnect.
    async fn clear_after_disconnect_code(&self, generation: u64) {
        let _guard = self.transition.lock().await;
        if !self.is_current(generation) {
            return;
        }

        // The returned handle is this listener's own task; it exits on return.
        match self.unsubscribe_locked().await {
            Ok(_) => {}
            Err(e) => {
                warn!("{}; clearing subscription locally", e);
                let _ = self.clear_active();
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

/// Notification listener for one subscription generation.
async fn listen(
    inner: Weak<Inner>,
    generation: u64,
    characteristic_uuid: Uuid,
    mut notifications: NotificationStream,
    cancel: CancellationToken,
) {
    debug!("Notification listener {} started", generation);

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = notifications.next() => match event {
                Some(event) => event,
                None => {
                    debug!("Notification stream ended");
                    break;
                }
            },
        };

        if event.characteristic_uuid != characteristic_uuid {
            trace!("Ignoring notification from {}", event.characteristic_uuid);
            continue;
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };

        if inner.on_notification(generation, &event.data).await.is_break() {
            break;
        }
    }

    debug!("Notification listener {} stopped", generation);
}
