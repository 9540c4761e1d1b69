//! BLE Service and Characteristic UUIDs.
//!
//! Contains the UUID constants for the oximeter protocol and the display
//! naming convention that discovery matches against.

use uuid::Uuid;

// Standard BLE services
/// Generic Access Service UUID.
pub const GENERIC_ACCESS_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1800_0000_1000_8000_00805f9b34fb);
/// Generic Attribute Service UUID.
pub const GENERIC_ATTRIBUTE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1801_0000_1000_8000_00805f9b34fb);
/// Standard BLE Device Information Service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);
/// Heart Rate Service UUID.
pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180d_0000_1000_8000_00805f9b34fb);
/// Battery Service UUID.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_00805f9b34fb);
/// Pulse Oximeter Service UUID.
pub const PULSE_OXIMETER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1822_0000_1000_8000_00805f9b34fb);

// Standard BLE characteristics
/// Device Name characteristic UUID.
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a00_0000_1000_8000_00805f9b34fb);
/// Battery Level characteristic UUID.
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_00805f9b34fb);
/// Manufacturer Name characteristic UUID.
pub const MANUFACTURER_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a29_0000_1000_8000_00805f9b34fb);
/// Model Number characteristic UUID.
pub const MODEL_NUMBER_UUID: Uuid = Uuid::from_u128(0x0000_2a24_0000_1000_8000_00805f9b34fb);
/// Serial Number characteristic UUID.
pub const SERIAL_NUMBER_UUID: Uuid = Uuid::from_u128(0x0000_2a25_0000_1000_8000_00805f9b34fb);
/// Firmware Revision characteristic UUID.
pub const FIRMWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a26_0000_1000_8000_00805f9b34fb);
/// Hardware Revision characteristic UUID.
pub const HARDWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a27_0000_1000_8000_00805f9b34fb);
/// Heart Rate Measurement characteristic UUID.
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_00805f9b34fb);

// Standard BLE descriptors
/// Characteristic User Description descriptor UUID.
pub const USER_DESCRIPTION_UUID: Uuid = Uuid::from_u128(0x0000_2901_0000_1000_8000_00805f9b34fb);
/// Client Characteristic Configuration descriptor UUID.
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

// Oximetry Service (Nonin Custom)
/// Vendor oximetry service UUID.
pub const OXIMETRY_SERVICE_UUID: Uuid = Uuid::from_u128(0x46a9_70e0_0d5f_11e2_8b5e_0002a5d5c51b);
/// Vendor continuous oximetry characteristic UUID (Notify).
pub const OXIMETRY_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0aad_7ea0_0d60_11e2_8e3c_0002a5d5c51b);

/// Name of the oximetry characteristic when the device has no user description.
pub const OXIMETRY_MEASUREMENT_NAME: &str = "Nonin Oximetry";

/// Display name of a service.
///
/// Well-known services are named after their assigned number; everything
/// else is `"Custom Service: <uuid>"`.
pub fn service_name(uuid: &Uuid) -> String {
    let known = match *uuid {
        GENERIC_ACCESS_SERVICE_UUID => Some("GenericAccess"),
        GENERIC_ATTRIBUTE_SERVICE_UUID => Some("GenericAttribute"),
        DEVICE_INFO_SERVICE_UUID => Some("DeviceInformation"),
        HEART_RATE_SERVICE_UUID => Some("HeartRate"),
        BATTERY_SERVICE_UUID => Some("Battery"),
        PULSE_OXIMETER_SERVICE_UUID => Some("PulseOximeter"),
        _ => None,
    };

    match known {
        Some(name) => name.to_string(),
        None => format!("Custom Service: {}", uuid),
    }
}

/// Display name of a characteristic.
///
/// A non-empty User Description wins, then well-known and vendor names,
/// then `"Custom Characteristic: <uuid>"`.
pub fn characteristic_name(uuid: &Uuid, user_description: Option<&str>) -> String {
    if let Some(description) = user_description.map(str::trim).filter(|d| !d.is_empty()) {
        return description.to_string();
    }

    let known = match *uuid {
        DEVICE_NAME_UUID => Some("DeviceName"),
        BATTERY_LEVEL_UUID => Some("BatteryLevel"),
        MANUFACTURER_NAME_UUID => Some("ManufacturerNameString"),
        MODEL_NUMBER_UUID => Some("ModelNumberString"),
        SERIAL_NUMBER_UUID => Some("SerialNumberString"),
        FIRMWARE_REVISION_UUID => Some("FirmwareRevisionString"),
        HARDWARE_REVISION_UUID => Some("HardwareRevisionString"),
        HEART_RATE_MEASUREMENT_UUID => Some("HeartRateMeasurement"),
        OXIMETRY_MEASUREMENT_UUID => Some(OXIMETRY_MEASUREMENT_NAME),
        _ => None,
    };

    match known {
        Some(name) => name.to_string(),
        None => format!("Custom Characteristic: {}", uuid),
    }
}
