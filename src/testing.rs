//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use btleplug::api::CharPropFlags;
use chrono::{DateTime, Local};
use futures::channel::mpsc;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use uuid::Uuid;

use crate::ble::gatt::{
    AccessStatus, CacheMode, CccdValue, CharacteristicDescriptor, GattCentral, GattDevice,
    GattError, NotificationEvent, NotificationStream, ServiceDescriptor,
};
use crate::ble::uuids::{
    service_name, DEVICE_INFO_SERVICE_UUID, OXIMETRY_MEASUREMENT_NAME,
    OXIMETRY_MEASUREMENT_UUID, OXIMETRY_SERVICE_UUID, CCCD_UUID,
};
use crate::data::Reading;
use crate::feedback::{Severity, UserFeedback};

/// The vendor oximetry service as discovery reports it.
pub(crate) fn oximetry_service() -> ServiceDescriptor {
    ServiceDescriptor {
        uuid: OXIMETRY_SERVICE_UUID,
        name: service_name(&OXIMETRY_SERVICE_UUID),
    }
}

/// The vendor oximetry characteristic as discovery reports it.
pub(crate) fn oximetry_characteristic() -> CharacteristicDescriptor {
    CharacteristicDescriptor {
        uuid: OXIMETRY_MEASUREMENT_UUID,
        service_uuid: OXIMETRY_SERVICE_UUID,
        name: OXIMETRY_MEASUREMENT_NAME.to_string(),
        properties: CharPropFlags::NOTIFY,
    }
}

/// A 10-byte oximetry frame.
pub(crate) fn oximetry_frame(spo2: u8, heart_rate: i16) -> Vec<u8> {
    let mut data = vec![0u8; 10];
    data[7] = spo2;
    data[8..10].copy_from_slice(&heart_rate.to_le_bytes());
    data
}

/// Feedback sink that remembers everything it was told.
#[derive(Default)]
pub(crate) struct RecordingFeedback {
    messages: Mutex<Vec<(String, Severity)>>,
    readings: Mutex<Vec<Reading>>,
}

impl RecordingFeedback {
    pub(crate) fn messages(&self) -> Vec<(String, Severity)> {
        self.messages.lock().clone()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(_, severity)| *severity == Severity::Error)
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub(crate) fn readings(&self) -> Vec<Reading> {
        self.readings.lock().clone()
    }
}

impl UserFeedback for RecordingFeedback {
    fn notify_user(&self, message: &str, severity: Severity) {
        self.messages.lock().push((message.to_string(), severity));
    }

    fn display_reading(&self, reading: &Reading, _at: DateTime<Local>) {
        self.readings.lock().push(reading.clone());
    }
}

/// In-memory peripheral with switchable failures.
pub(crate) struct FakeDevice {
    id: String,
    services: Mutex<Vec<ServiceDescriptor>>,
    characteristics: Mutex<Vec<CharacteristicDescriptor>>,
    fail_services: AtomicBool,
    deny_access: AtomicBool,
    fail_characteristics: AtomicBool,
    fail_descriptors: AtomicBool,
    reject_subscribe: AtomicBool,
    reject_unsubscribe: AtomicBool,
    cccd_writes: Mutex<Vec<(Uuid, CccdValue)>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<NotificationEvent>>>,
    close_count: AtomicUsize,
}

impl FakeDevice {
    /// A device without the oximetry service.
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            services: Mutex::new(vec![ServiceDescriptor {
                uuid: DEVICE_INFO_SERVICE_UUID,
                name: service_name(&DEVICE_INFO_SERVICE_UUID),
            }]),
            characteristics: Mutex::new(Vec::new()),
            fail_services: AtomicBool::new(false),
            deny_access: AtomicBool::new(false),
            fail_characteristics: AtomicBool::new(false),
            fail_descriptors: AtomicBool::new(false),
            reject_subscribe: AtomicBool::new(false),
            reject_unsubscribe: AtomicBool::new(false),
            cccd_writes: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
        }
    }

    /// A device exposing the oximetry service and characteristic.
    pub(crate) fn oximeter(id: &str) -> Self {
        let device = Self::new(id);
        device.services.lock().push(oximetry_service());
        device.characteristics.lock().push(oximetry_characteristic());
        device
    }

    pub(crate) fn set_fail_services(&self, fail: bool) {
        self.fail_services.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_deny_access(&self, deny: bool) {
        self.deny_access.store(deny, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_characteristics(&self, fail: bool) {
        self.fail_characteristics.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_descriptors(&self, fail: bool) {
        self.fail_descriptors.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_reject_subscribe(&self, reject: bool) {
        self.reject_subscribe.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn set_reject_unsubscribe(&self, reject: bool) {
        self.reject_unsubscribe.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn set_characteristics(&self, characteristics: Vec<CharacteristicDescriptor>) {
        *self.characteristics.lock() = characteristics;
    }

    pub(crate) fn cccd_writes(&self) -> Vec<(Uuid, CccdValue)> {
        self.cccd_writes.lock().clone()
    }

    /// Number of notification streams still being consumed.
    pub(crate) fn listener_count(&self) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|sender| !sender.is_closed());
        senders.len()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// Deliver an oximetry notification to every open stream.
    pub(crate) fn notify(&self, data: Vec<u8>) {
        let mut senders = self.senders.lock();
        senders.retain(|sender| {
            sender
                .unbounded_send(NotificationEvent {
                    characteristic_uuid: OXIMETRY_MEASUREMENT_UUID,
                    data: data.clone(),
                })
                .is_ok()
        });
    }
}

#[async_trait]
impl GattDevice for FakeDevice {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn services(&self, _cache: CacheMode) -> Result<Vec<ServiceDescriptor>, GattError> {
        if self.fail_services.load(Ordering::SeqCst) {
            return Err(GattError::Unreachable);
        }
        Ok(self.services.lock().clone())
    }

    async fn request_access(
        &self,
        _service: &ServiceDescriptor,
    ) -> Result<AccessStatus, GattError> {
        if self.deny_access.load(Ordering::SeqCst) {
            Ok(AccessStatus::Denied)
        } else {
            Ok(AccessStatus::Allowed)
        }
    }

    async fn characteristics(
        &self,
        service: &ServiceDescriptor,
        _cache: CacheMode,
    ) -> Result<Vec<CharacteristicDescriptor>, GattError> {
        if self.fail_characteristics.load(Ordering::SeqCst) {
            return Err(GattError::Unreachable);
        }
        Ok(self
            .characteristics
            .lock()
            .iter()
            .filter(|c| c.service_uuid == service.uuid)
            .cloned()
            .collect())
    }

    async fn descriptors(
        &self,
        _characteristic: &CharacteristicDescriptor,
        _cache: CacheMode,
    ) -> Result<Vec<Uuid>, GattError> {
        if self.fail_descriptors.load(Ordering::SeqCst) {
            return Err(GattError::Unreachable);
        }
        Ok(vec![CCCD_UUID])
    }

    async fn write_cccd(
        &self,
        characteristic: &CharacteristicDescriptor,
        value: CccdValue,
    ) -> Result<(), GattError> {
        let reject = match value {
            CccdValue::None => self.reject_unsubscribe.load(Ordering::SeqCst),
            _ => self.reject_subscribe.load(Ordering::SeqCst),
        };
        if reject {
            return Err(GattError::ProtocolError {
                reason: "write not permitted".to_string(),
            });
        }
        self.cccd_writes.lock().push((characteristic.uuid, value));
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, GattError> {
        let (tx, rx) = mpsc::unbounded();
        self.senders.lock().push(tx);
        Ok(rx.boxed())
    }

    async fn close(&self) -> Result<(), GattError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Central that hands out [`FakeDevice`]s.
#[derive(Default)]
pub(crate) struct FakeCentral {
    devices: Mutex<HashMap<String, Arc<FakeDevice>>>,
    radio_off: AtomicBool,
    open_delay: Mutex<Option<Duration>>,
    open_count: AtomicUsize,
}

impl FakeCentral {
    pub(crate) fn with_device(device: Arc<FakeDevice>) -> Self {
        let central = Self::default();
        central.add(device);
        central
    }

    pub(crate) fn add(&self, device: Arc<FakeDevice>) {
        self.devices.lock().insert(device.id.clone(), device);
    }

    pub(crate) fn set_radio_off(&self, off: bool) {
        self.radio_off.store(off, Ordering::SeqCst);
    }

    pub(crate) fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = Some(delay);
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GattCentral for FakeCentral {
    async fn open(&self, device_id: &str) -> Result<Arc<dyn GattDevice>, GattError> {
        let delay = *self.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.radio_off.load(Ordering::SeqCst) {
            return Err(GattError::DeviceNotAvailable);
        }

        let device = self
            .devices
            .lock()
            .get(device_id)
            .cloned()
            .ok_or_else(|| GattError::NotFound {
                identifier: device_id.to_string(),
            })?;

        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(device)
    }
}

/// Writer whose output can be inspected while a clone is being written to.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Writer that accepts a number of writes and then fails.
pub(crate) struct FailingWriter {
    remaining: usize,
}

impl FailingWriter {
    pub(crate) fn after(writes: usize) -> Self {
        Self { remaining: writes }
    }
}

impl AsyncWrite for FailingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.remaining == 0 {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full.")));
        }
        self.remaining -= 1;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
