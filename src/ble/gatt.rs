//! GATT client seam.
//!
//! The lifecycle, discovery and subscription code only talks to a
//! peripheral through [`GattCentral`] and [`GattDevice`]. The production
//! implementation lives in [`crate::ble::platform`].

use async_trait::async_trait;
use btleplug::api::CharPropFlags;
use futures::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Transport-level failure reported by a GATT implementation.
#[derive(Error, Debug)]
pub enum GattError {
    /// The radio is off or no adapter is present.
    #[error("Device not available")]
    DeviceNotAvailable,

    /// No peripheral with the given identifier is known.
    #[error("Peripheral not found: {identifier}")]
    NotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// The remote did not answer.
    #[error("Unreachable")]
    Unreachable,

    /// The remote or the platform refused the operation.
    #[error("Access denied")]
    AccessDenied,

    /// The remote answered with an ATT error.
    #[error("Protocol error: {reason}")]
    ProtocolError {
        /// Description of the error.
        reason: String,
    },

    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),
}

/// Whether an enumeration may be answered from the platform cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Cached attributes are acceptable.
    Cached,
    /// Always query the device.
    Uncached,
}

/// Value written to the Client Characteristic Configuration Descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CccdValue {
    /// Notifications and indications disabled.
    None,
    /// Unacknowledged notifications.
    Notify,
    /// Acknowledged indications.
    Indicate,
}

impl std::fmt::Display for CccdValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Notify => write!(f, "Notify"),
            Self::Indicate => write!(f, "Indicate"),
        }
    }
}

/// Outcome of a service access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    /// Access granted.
    Allowed,
    /// Access refused by the user or the system.
    Denied,
}

/// A discovered GATT service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Service UUID.
    pub uuid: Uuid,
    /// Human-readable name, see [`crate::ble::uuids::service_name`].
    pub name: String,
}

/// A discovered GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the service the characteristic belongs to.
    pub service_uuid: Uuid,
    /// Human-readable name, see [`crate::ble::uuids::characteristic_name`].
    pub name: String,
    /// Advertised properties.
    pub properties: CharPropFlags,
}

impl CharacteristicDescriptor {
    /// Check if the characteristic advertises notifications.
    pub fn supports_notify(&self) -> bool {
        self.properties.contains(CharPropFlags::NOTIFY)
    }

    /// Check if the characteristic advertises indications.
    pub fn supports_indicate(&self) -> bool {
        self.properties.contains(CharPropFlags::INDICATE)
    }

    /// The configuration value to enable updates: indicate wins over notify.
    pub fn preferred_cccd_value(&self) -> Option<CccdValue> {
        if self.supports_indicate() {
            Some(CccdValue::Indicate)
        } else if self.supports_notify() {
            Some(CccdValue::Notify)
        } else {
            None
        }
    }

    /// Check if two descriptors name the same remote attribute.
    pub fn same_attribute(&self, other: &CharacteristicDescriptor) -> bool {
        self.uuid == other.uuid && self.service_uuid == other.service_uuid
    }
}

/// Notification event from a characteristic.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// UUID of the characteristic that sent the notification.
    pub characteristic_uuid: Uuid,
    /// The notification data.
    pub data: Vec<u8>,
}

/// Stream of value notifications from one device.
pub type NotificationStream = BoxStream<'static, NotificationEvent>;

/// An opened peripheral.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GattDevice: Send + Sync {
    /// Platform identifier of the peripheral.
    fn id(&self) -> String;

    /// Enumerate primary services.
    async fn services(&self, cache: CacheMode) -> Result<Vec<ServiceDescriptor>, GattError>;

    /// Ask the platform for permission to use a service.
    async fn request_access(&self, service: &ServiceDescriptor)
        -> Result<AccessStatus, GattError>;

    /// Enumerate the characteristics of a service.
    async fn characteristics(
        &self,
        service: &ServiceDescriptor,
        cache: CacheMode,
    ) -> Result<Vec<CharacteristicDescriptor>, GattError>;

    /// Enumerate the descriptor UUIDs of a characteristic.
    async fn descriptors(
        &self,
        characteristic: &CharacteristicDescriptor,
        cache: CacheMode,
    ) -> Result<Vec<Uuid>, GattError>;

    /// Write the Client Characteristic Configuration Descriptor.
    async fn write_cccd(
        &self,
        characteristic: &CharacteristicDescriptor,
        value: CccdValue,
    ) -> Result<(), GattError>;

    /// Open a stream of value notifications for this device.
    async fn notifications(&self) -> Result<NotificationStream, GattError>;

    /// Release the connection.
    async fn close(&self) -> Result<(), GattError>;
}

/// Opens peripherals by identifier.
#[async_trait]
pub trait GattCentral: Send + Sync {
    /// Open and connect the peripheral with the given identifier.
    async fn open(&self, device_id: &str) -> Result<Arc<dyn GattDevice>, GattError>;
}
