//! BLE communication module.
//!
//! This module provides the GATT seam, its `btleplug` implementation,
//! discovery of the oximetry characteristic and the notification
//! subscription.

pub mod connection;
pub mod discovery;
pub mod gatt;
pub mod platform;
pub mod scanner;
pub mod subscription;
pub mod uuids;

pub use connection::{LifecycleEvent, LifecycleState};
pub use discovery::Discovery;
pub use gatt::{
    AccessStatus, CacheMode, CccdValue, CharacteristicDescriptor, GattCentral, GattDevice,
    GattError, NotificationEvent, NotificationStream, ServiceDescriptor,
};
pub use platform::{BtleplugCentral, BtleplugDevice};
pub use scanner::{DeviceScanner, DiscoveredDevice};
pub use subscription::{SubscriptionManager, SubscriptionState};
pub use uuids::*;
