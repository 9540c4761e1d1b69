//! Error types for the pulse-oximeter-ble crate.
//!
//! Each component reports its own error kind; [`Error`] wraps them for
//! callers that only want a single type.

use thiserror::Error;

use crate::ble::gatt::GattError;

/// Failure to decode an oximetry notification payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is shorter than the fixed frame.
    #[error("Payload too short: {len} bytes (need at least {min})")]
    TooShort {
        /// Length of the received payload.
        len: usize,
        /// Minimum length of a valid frame.
        min: usize,
    },
}

/// Failure in one of the discovery stages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Reading the service list failed.
    #[error("Device unreachable")]
    ServicesUnreachable,

    /// No service carries the target name.
    #[error("Service not found: {name}")]
    ServiceNotFound {
        /// The service name that was searched for.
        name: String,
    },

    /// The platform refused access to the matched service.
    #[error("Error accessing service [{name}]")]
    AccessDenied {
        /// Name of the service that was refused.
        name: String,
    },

    /// Reading the characteristic list failed.
    #[error("Error accessing service [{name}]: characteristics unreachable")]
    CharacteristicsUnreachable {
        /// Name of the service being enumerated.
        name: String,
    },

    /// No characteristic name contains the keyword.
    #[error("No characteristic matching \"{keyword}\"")]
    CharacteristicNotFound {
        /// The keyword that was searched for.
        keyword: String,
    },

    /// Reading the descriptors of the matched characteristic failed.
    #[error("Descriptor read failure: {reason}")]
    DescriptorsUnreachable {
        /// Transport-level reason.
        reason: String,
    },
}

/// Failure to change the notification subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// The characteristic advertises neither notify nor indicate.
    #[error("Characteristic {uuid} supports neither notify nor indicate")]
    UnsupportedCharacteristic {
        /// UUID of the characteristic.
        uuid: String,
    },

    /// The device rejected enabling notifications.
    #[error("Error registering for value changes: {reason}")]
    Unauthorized {
        /// Transport-level reason.
        reason: String,
    },

    /// The device rejected disabling notifications.
    #[error("Error un-registering for notifications: {reason}")]
    RemoteRejected {
        /// Transport-level reason.
        reason: String,
    },

    /// The platform could not hand out a notification stream.
    #[error("Notification stream unavailable: {reason}")]
    NotificationsUnavailable {
        /// Transport-level reason.
        reason: String,
    },
}

/// Failure in the recording sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    /// A recording session is already running.
    #[error("Recording already in progress")]
    AlreadyRecording,

    /// No save destination was chosen.
    #[error("No save destination selected")]
    Cancelled,

    /// Creating or writing the record file failed.
    #[error("{reason} Recording session was interrupted. Please restart.")]
    WriteFailed {
        /// Description of the I/O failure.
        reason: String,
    },
}

/// Failure of a lifecycle verb.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Connect was invoked without a device identifier.
    #[error("No device selected")]
    NoDeviceSelected,

    /// The Bluetooth radio is off or missing.
    #[error("Bluetooth radio is not on.")]
    RadioUnavailable,

    /// Opening the device failed.
    #[error("Failed to connect to device: {reason}")]
    ConnectFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Discovery of the oximetry characteristic failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Subscribing to the oximetry characteristic failed.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// Notifications could not be disabled, so the session was kept.
    #[error("Unable to reset app state: {reason}")]
    TeardownFailed {
        /// Description of why teardown failed.
        reason: String,
    },

    /// A later connect or teardown superseded this attempt.
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// The verb requires an active session.
    #[error("Not connected")]
    NotConnected,
}

impl LifecycleError {
    /// Map a transport error from opening a device.
    pub(crate) fn from_open(err: GattError) -> Self {
        match err {
            GattError::DeviceNotAvailable => Self::RadioUnavailable,
            other => Self::ConnectFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Transport error.
    #[error(transparent)]
    Gatt(#[from] GattError),

    /// Payload decoding error.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Discovery error.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Subscription error.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// Recording error.
    #[error(transparent)]
    Recording(#[from] RecordingError),

    /// Lifecycle error.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
