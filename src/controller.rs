//! Connection lifecycle controller.
//!
//! Drives a device from `Idle` through discovery and subscription to
//! `Active`, and back through `TearingDown`. The controller owns the only
//! device handle; the subscription manager and the recorder work through
//! the session it holds.

use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ble::connection::{LifecycleEvent, LifecycleState};
use crate::ble::discovery::Discovery;
use crate::ble::gatt::{CharacteristicDescriptor, GattCentral, GattDevice, ServiceDescriptor};
use crate::ble::subscription::SubscriptionManager;
use crate::config::ClientConfig;
use crate::data::{Reading, ReadingCell};
use crate::error::LifecycleError;
use crate::feedback::{Severity, UserFeedback};
use crate::recording::RecordingSink;

/// Message shown once a session is established.
pub const SUBSCRIBED_MESSAGE: &str = "Successfully subscribed for value changes";

/// An established connection.
pub struct Session {
    device: Arc<dyn GattDevice>,
    service: ServiceDescriptor,
    characteristic: CharacteristicDescriptor,
}

impl Session {
    /// The open device.
    pub fn device(&self) -> &Arc<dyn GattDevice> {
        &self.device
    }

    /// The discovered oximetry service.
    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    /// The discovered oximetry characteristic.
    pub fn characteristic(&self) -> &CharacteristicDescriptor {
        &self.characteristic
    }
}

/// A connect attempt that can be superseded.
struct Attempt {
    id: u64,
    token: CancellationToken,
}

/// Controller for the oximeter connection.
pub struct Controller {
    central: Arc<dyn GattCentral>,
    config: ClientConfig,
    discovery: Discovery,
    subscriptions: SubscriptionManager,
    recorder: RecordingSink,
    feedback: Arc<dyn UserFeedback>,
    /// Held for the whole of every connect and teardown.
    session: tokio::sync::Mutex<Option<Session>>,
    state: RwLock<LifecycleState>,
    device_id: RwLock<Option<String>>,
    attempt: Mutex<Option<Attempt>>,
    attempt_counter: AtomicU64,
    events_tx: broadcast::Sender<LifecycleEvent>,
}

impl Controller {
    /// Create a controller with the default configuration.
    pub fn new(central: Arc<dyn GattCentral>, feedback: Arc<dyn UserFeedback>) -> Self {
        Self::with_config(central, feedback, ClientConfig::default())
    }

    /// Create a controller with a custom configuration.
    pub fn with_config(
        central: Arc<dyn GattCentral>,
        feedback: Arc<dyn UserFeedback>,
        config: ClientConfig,
    ) -> Self {
        let subscriptions = SubscriptionManager::new(ReadingCell::new(), feedback.clone());
        let recorder =
            RecordingSink::new(subscriptions.clone(), feedback.clone(), config.record_period);
        let (events_tx, _) = broadcast::channel(32);

        Self {
            central,
            discovery: Discovery::new(&config, feedback.clone()),
            config,
            subscriptions,
            recorder,
            feedback,
            session: tokio::sync::Mutex::new(None),
            state: RwLock::new(LifecycleState::Idle),
            device_id: RwLock::new(None),
            attempt: Mutex::new(None),
            attempt_counter: AtomicU64::new(0),
            events_tx,
        }
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Check if a session is established.
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Identifier of the device being connected or in use.
    pub fn device_id(&self) -> Option<String> {
        self.device_id.read().clone()
    }

    /// Subscribe to lifecycle state changes.
    pub fn subscribe_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events_tx.subscribe()
    }

    /// Get the most recent reading.
    pub fn latest_reading(&self) -> Option<Reading> {
        self.subscriptions.latest().get()
    }

    /// The recording sink fed by this controller's subscription.
    pub fn recorder(&self) -> &RecordingSink {
        &self.recorder
    }

    /// The subscription manager.
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to `device_id`, discover the oximetry characteristic and
    /// subscribe to it.
    ///
    /// Any existing session is torn down first. A connect or teardown issued
    /// while this call is in progress cancels it; the stage being awaited is
    /// dropped and whatever was acquired is released.
    ///
    /// # Errors
    ///
    /// Fails with the first error of any stage; the device handle is then
    /// released and the controller is back in `Idle`.
    pub async fn connect(&self, device_id: &str) -> Result<(), LifecycleError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(self.report(LifecycleError::NoDeviceSelected));
        }

        let attempt = self.begin_attempt();
        let mut session = self.session.lock().await;

        if attempt.token.is_cancelled() {
            self.end_attempt(attempt.id);
            return Err(self.report(LifecycleError::Cancelled));
        }

        if session.is_some() {
            debug!("Tearing down previous session before connecting");
            if let Err(e) = self.teardown_locked(&mut session).await {
                self.end_attempt(attempt.id);
                return Err(self.report(e));
            }
        }

        let result = self
            .establish(device_id, &attempt.token, &mut session)
            .await;
        self.end_attempt(attempt.id);

        match result {
            Ok(()) => {
                info!("Session active on {}", device_id);
                self.feedback.notify_user(SUBSCRIBED_MESSAGE, Severity::Status);
                Ok(())
            }
            Err(e) => {
                self.set_state(LifecycleState::Idle, None);
                Err(self.report(e))
            }
        }
    }

    /// Unsubscribe and release the device handle.
    ///
    /// A no-op when there is no session. If the device refuses to disable
    /// notifications the session is kept and `TeardownFailed` returned.
    pub async fn teardown(&self) -> Result<(), LifecycleError> {
        self.cancel_attempt();

        let mut session = self.session.lock().await;
        self.teardown_locked(&mut session)
            .await
            .map_err(|e| self.report(e))
    }

    /// Re-enable notifications on the active session.
    ///
    /// Used after the subscription was cleared by a disconnect code or a
    /// recording failure. A no-op when still subscribed.
    pub async fn resubscribe(&self) -> Result<(), LifecycleError> {
        let session = self.session.lock().await;
        let Some(current) = session.as_ref() else {
            return Err(self.report(LifecycleError::NotConnected));
        };

        if self.subscriptions.is_subscribed() {
            return Ok(());
        }

        self.subscriptions
            .subscribe(&current.device, &current.characteristic)
            .await
            .map_err(|e| self.report(e.into()))?;

        self.feedback.notify_user(SUBSCRIBED_MESSAGE, Severity::Status);
        Ok(())
    }

    /// Stop recording and tear down the session.
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        info!("Shutting down controller");

        if let Err(e) = self.recorder.stop().await {
            debug!("Recording had ended with: {}", e);
        }

        self.teardown().await
    }

    async fn establish(
        &self,
        device_id: &str,
        token: &CancellationToken,
        session: &mut Option<Session>,
    ) -> Result<(), LifecycleError> {
        self.set_state(LifecycleState::Connecting, Some(device_id.to_string()));
        info!("Connecting to {}", device_id);

        let device = until_cancelled(token, async {
            self.central
                .open(device_id)
                .await
                .map_err(LifecycleError::from_open)
        })
        .await?;

        self.set_state(LifecycleState::Discovering, Some(device_id.to_string()));
        let discovered = until_cancelled(token, async {
            self.discovery
                .discover(device.as_ref())
                .await
                .map_err(LifecycleError::from)
        })
        .await;
        let (service, characteristic) = match discovered {
            Ok(found) => found,
            Err(e) => return Err(self.abandon(&device, e).await),
        };

        self.set_state(LifecycleState::Subscribing, Some(device_id.to_string()));
        let subscribed = until_cancelled(token, async {
            self.subscriptions
                .subscribe(&device, &characteristic)
                .await
                .map_err(LifecycleError::from)
        })
        .await;
        if let Err(e) = subscribed {
            return Err(self.abandon(&device, e).await);
        }

        if token.is_cancelled() {
            return Err(self.abandon(&device, LifecycleError::Cancelled).await);
        }

        *session = Some(Session {
            device,
            service,
            characteristic,
        });
        self.set_state(LifecycleState::Active, Some(device_id.to_string()));

        Ok(())
    }

    async fn teardown_locked(&self, session: &mut Option<Session>) -> Result<(), LifecycleError> {
        let Some(device_id) = session.as_ref().map(|s| s.device.id()) else {
            debug!("No session to tear down");
            return Ok(());
        };

        self.set_state(LifecycleState::TearingDown, Some(device_id.clone()));

        if let Err(e) = self.subscriptions.unsubscribe().await {
            self.set_state(LifecycleState::Active, Some(device_id));
            return Err(LifecycleError::TeardownFailed {
                reason: e.to_string(),
            });
        }

        if let Some(previous) = session.take() {
            if let Err(e) = previous.device.close().await {
                warn!("Failed to close {}: {}", device_id, e);
            }
        }

        self.set_state(LifecycleState::Idle, None);
        info!("Disconnected from {}", device_id);

        Ok(())
    }

    /// Release whatever a failed attempt acquired.
    async fn abandon(&self, device: &Arc<dyn GattDevice>, err: LifecycleError) -> LifecycleError {
        debug!("Abandoning connection to {}: {}", device.id(), err);

        if self.subscriptions.is_subscribed() {
            if let Err(e) = self.subscriptions.unsubscribe().await {
                warn!("{}; clearing subscription locally", e);
                self.subscriptions.force_clear().await;
            }
        }

        if let Err(e) = device.close().await {
            warn!("Failed to close {}: {}", device.id(), e);
        }

        err
    }

    fn begin_attempt(&self) -> Attempt {
        let id = self.attempt_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        let previous = self.attempt.lock().replace(Attempt {
            id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            debug!("Cancelling connect attempt {}", previous.id);
            previous.token.cancel();
        }

        Attempt { id, token }
    }

    fn end_attempt(&self, id: u64) {
        let mut attempt = self.attempt.lock();
        if attempt.as_ref().map(|a| a.id) == Some(id) {
            *attempt = None;
        }
    }

    fn cancel_attempt(&self) {
        if let Some(previous) = self.attempt.lock().take() {
            debug!("Cancelling connect attempt {}", previous.id);
            previous.token.cancel();
        }
    }

    fn set_state(&self, to: LifecycleState, device_id: Option<String>) {
        let from = std::mem::replace(&mut *self.state.write(), to);
        *self.device_id.write() = device_id.clone();

        if from != to {
            debug!("Lifecycle {} -> {}", from, to);
            let _ = self.events_tx.send(LifecycleEvent {
                device_id,
                from,
                to,
            });
        }
    }

    fn report(&self, err: LifecycleError) -> LifecycleError {
        let severity = match err {
            LifecycleError::Cancelled => Severity::Status,
            _ => Severity::Error,
        };
        self.feedback.notify_user(&err.to_string(), severity);
        err
    }
}

/// Run one connect stage, giving up as soon as the attempt is superseded.
async fn until_cancelled<F, T>(token: &CancellationToken, stage: F) -> Result<T, LifecycleError>
where
    F: Future<Output = Result<T, LifecycleError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(LifecycleError::Cancelled),
        result = stage => result,
    }
}
