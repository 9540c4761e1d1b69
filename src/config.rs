//! Client configuration.

use std::time::Duration;

/// Display name of the vendor oximetry service.
pub const DEFAULT_SERVICE_NAME: &str = "Custom Service: 46a970e0-0d5f-11e2-8b5e-0002a5d5c51b";

/// Keyword contained in the oximetry characteristic's display name.
pub const DEFAULT_CHARACTERISTIC_KEYWORD: &str = "Oximetry";

/// Marker contained in the advertised name of supported devices.
pub const DEFAULT_DEVICE_NAME_MARKER: &str = "NONIN";

/// Period of the recording sink.
pub const DEFAULT_RECORD_PERIOD: Duration = Duration::from_secs(1);

/// Default scan duration used by the device scanner.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

/// Settings shared by the lifecycle controller, discovery and recording.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    /// Exact display name of the service to select.
    pub service_name: String,
    /// Substring of the characteristic display name to select.
    pub characteristic_keyword: String,
    /// Case-insensitive substring of supported device names.
    pub device_name_marker: String,
    /// Interval between appended record lines.
    pub record_period: Duration,
    /// How long the scanner listens for advertisements.
    pub scan_duration: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            characteristic_keyword: DEFAULT_CHARACTERISTIC_KEYWORD.to_string(),
            device_name_marker: DEFAULT_DEVICE_NAME_MARKER.to_string(),
            record_period: DEFAULT_RECORD_PERIOD,
            scan_duration: DEFAULT_SCAN_DURATION,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with the default vendor settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service display name to select.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the characteristic keyword to select.
    pub fn with_characteristic_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.characteristic_keyword = keyword.into();
        self
    }

    /// Set the supported-device name marker.
    pub fn with_device_name_marker(mut self, marker: impl Into<String>) -> Self {
        self.device_name_marker = marker.into();
        self
    }

    /// Set the recording period.
    pub fn with_record_period(mut self, period: Duration) -> Self {
        self.record_period = period;
        self
    }

    /// Set the scan duration.
    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Check if an advertised name belongs to a supported device.
    pub fn is_supported_device(&self, name: &str) -> bool {
        name.to_uppercase()
            .contains(&self.device_name_marker.to_uppercase())
    }
}

/// Check if an advertised name belongs to a supported device, using the
/// default marker.
pub fn is_supported_device(name: &str) -> bool {
    ClientConfig::default().is_supported_device(name)
}
