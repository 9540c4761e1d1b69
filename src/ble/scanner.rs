//! BLE scanning functionality.
//!
//! Lists nearby peripherals whose advertised name marks them as a
//! supported oximeter; the caller picks one and hands its identifier to
//! [`crate::Controller::connect`].

use btleplug::api::{Central, Peripheral as _, ScanFilter};
use btleplug::platform::Adapter;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// A supported peripheral seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Platform identifier, accepted by `connect`.
    pub id: String,
    /// Advertised local name.
    pub name: String,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// Scanner for supported oximeters.
pub struct DeviceScanner {
    adapter: Adapter,
    config: ClientConfig,
}

impl DeviceScanner {
    /// Create a scanner on an adapter.
    pub fn new(adapter: Adapter, config: ClientConfig) -> Self {
        Self { adapter, config }
    }

    /// Scan for the configured duration and list supported devices,
    /// strongest signal first.
    pub async fn supported_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        info!("Starting BLE scan for supported oximeters");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        tokio::time::sleep(self.config.scan_duration).await;

        let devices = self.collect().await;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        let mut devices = devices?;
        sort_by_signal(&mut devices);
        debug!("Found {} supported devices", devices.len());

        Ok(devices)
    }

    /// Scan and pick the supported device with the strongest signal.
    pub async fn select_device(&self) -> Result<Option<DiscoveredDevice>> {
        Ok(self.supported_devices().await?.into_iter().next())
    }

    /// Scan duration in use.
    pub fn scan_duration(&self) -> Duration {
        self.config.scan_duration
    }

    async fn collect(&self) -> Result<Vec<DiscoveredDevice>> {
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;

        let mut devices = Vec::new();
        for peripheral in peripherals {
            let properties = match peripheral.properties().await {
                Ok(Some(p)) => p,
                _ => continue,
            };

            let Some(name) = properties.local_name else {
                continue;
            };

            if !self.config.is_supported_device(&name) {
                trace!("Ignoring unsupported device: {}", name);
                continue;
            }

            devices.push(DiscoveredDevice {
                id: peripheral.id().to_string(),
                name,
                rssi: properties.rssi,
            });
        }

        Ok(devices)
    }
}

fn sort_by_signal(devices: &mut [DiscoveredDevice]) {
    devices.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, rssi: Option<i16>) -> DiscoveredDevice {
        DiscoveredDevice {
            id: id.to_string(),
            name: format!("Nonin3150_{}", id),
            rssi,
        }
    }

    #[test]
    fn test_sort_by_signal() {
        let mut devices = vec![
            device("a", Some(-80)),
            device("b", None),
            device("c", Some(-40)),
        ];
        sort_by_signal(&mut devices);

        let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
