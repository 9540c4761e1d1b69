//! # pulse-oximeter-ble
//!
//! A cross-platform Rust library for reading Nonin-style pulse oximeters
//! via Bluetooth Low Energy.
//!
//! The library discovers the vendor oximetry service and characteristic,
//! subscribes to value notifications, decodes each frame into SpO2 and
//! heart-rate readings and optionally records them once per second.
//!
//! ## Features
//!
//! - **Device Selection**: Scan for peripherals advertising a supported name
//! - **Discovery**: Locate the oximetry service and characteristic uncached
//! - **Notifications**: A single subscription with one listener task
//! - **Decoding**: Disconnect sentinels and out-of-range values read as 0
//! - **Recording**: 1 Hz `SpO2;HeartRate` log to a file or any `AsyncWrite`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pulse_oximeter_ble::{
//!     BtleplugCentral, ClientConfig, Controller, DeviceScanner, Result, TracingFeedback,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let central = BtleplugCentral::new().await?;
//!     let scanner = DeviceScanner::new(central.adapter().clone(), ClientConfig::default());
//!
//!     let Some(device) = scanner.select_device().await? else {
//!         println!("No oximeter found");
//!         return Ok(());
//!     };
//!
//!     let controller = Controller::new(Arc::new(central), Arc::new(TracingFeedback));
//!     controller.connect(&device.id).await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     if let Some(reading) = controller.latest_reading() {
//!         println!("SpO2 {}%, heart rate {} bpm", reading.spo2, reading.heart_rate);
//!     }
//!
//!     controller.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for readings and configuration

// Public modules
pub mod ble;
pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod feedback;
pub mod protocol;
pub mod recording;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::{is_supported_device, ClientConfig};
pub use controller::{Controller, Session};
pub use error::{
    DecodeError, DiscoveryError, Error, LifecycleError, RecordingError, Result, SubscribeError,
};
pub use feedback::{Severity, TracingFeedback, UserFeedback};
pub use recording::{DestinationPicker, FixedDestination, RecordingSink};

// Re-export commonly used types from submodules
pub use ble::{
    BtleplugCentral, DeviceScanner, DiscoveredDevice, GattCentral, GattDevice, LifecycleEvent,
    LifecycleState, SubscriptionManager, SubscriptionState,
};
pub use data::{Reading, ReadingCell};
pub use protocol::decode;
