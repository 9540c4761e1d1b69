//! `btleplug`-backed GATT implementation.

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::gatt::{
    AccessStatus, CacheMode, CccdValue, CharacteristicDescriptor, GattCentral, GattDevice,
    GattError, NotificationEvent, NotificationStream, ServiceDescriptor,
};
use crate::ble::uuids::{characteristic_name, service_name, USER_DESCRIPTION_UUID};
use crate::error::{Error, Result};

/// Opens peripherals through the first Bluetooth adapter.
#[derive(Clone)]
pub struct BtleplugCentral {
    adapter: Adapter,
}

impl BtleplugCentral {
    /// Create a central on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Create a central on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }
}

#[async_trait]
impl GattCentral for BtleplugCentral {
    async fn open(&self, device_id: &str) -> std::result::Result<Arc<dyn GattDevice>, GattError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|_e| GattError::DeviceNotAvailable)?;

        let peripheral = peripherals
            .into_iter()
            .find(|p| p.id().to_string() == device_id)
            .ok_or_else(|| GattError::NotFound {
                identifier: device_id.to_string(),
            })?;

        let made_connection = !peripheral.is_connected().await.unwrap_or(false);
        if made_connection {
            debug!("Connecting to {}", device_id);
            peripheral.connect().await?;
        }

        let discovered = peripheral.discover_services().await;
        release_on_failure(discovered, made_connection, peripheral.disconnect()).await?;
        info!("Opened peripheral {}", device_id);

        Ok(Arc::new(BtleplugDevice::new(peripheral)))
    }
}

/// A connected `btleplug` peripheral.
pub struct BtleplugDevice {
    peripheral: Peripheral,
}

impl BtleplugDevice {
    /// Wrap a connected peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        Self { peripheral }
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    async fn refresh(&self, cache: CacheMode) -> std::result::Result<(), GattError> {
        if cache == CacheMode::Uncached {
            self.peripheral.discover_services().await?;
        }
        Ok(())
    }

    fn find_characteristic(
        &self,
        descriptor: &CharacteristicDescriptor,
    ) -> std::result::Result<Characteristic, GattError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == descriptor.uuid && c.service_uuid == descriptor.service_uuid)
            .ok_or_else(|| GattError::NotFound {
                identifier: descriptor.uuid.to_string(),
            })
    }

    /// Read the User Description descriptor, if the characteristic has one.
    async fn user_description(&self, characteristic: &Characteristic) -> Option<String> {
        let descriptor = characteristic
            .descriptors
            .iter()
            .find(|d| d.uuid == USER_DESCRIPTION_UUID)?;

        match self.peripheral.read_descriptor(descriptor).await {
            Ok(value) => Some(String::from_utf8_lossy(&value).into_owned()),
            Err(e) => {
                trace!("No user description for {}: {}", characteristic.uuid, e);
                None
            }
        }
    }
}

#[async_trait]
impl GattDevice for BtleplugDevice {
    fn id(&self) -> String {
        self.peripheral.id().to_string()
    }

    async fn services(
        &self,
        cache: CacheMode,
    ) -> std::result::Result<Vec<ServiceDescriptor>, GattError> {
        self.refresh(cache).await?;

        Ok(self
            .peripheral
            .services()
            .into_iter()
            .map(|service| ServiceDescriptor {
                name: service_name(&service.uuid),
                uuid: service.uuid,
            })
            .collect())
    }

    async fn request_access(
        &self,
        service: &ServiceDescriptor,
    ) -> std::result::Result<AccessStatus, GattError> {
        // Access is granted at connect time on desktop stacks; a lost link or
        // a service that vanished is treated as refused.
        if !self.peripheral.is_connected().await? {
            return Ok(AccessStatus::Denied);
        }

        let present = self
            .peripheral
            .services()
            .iter()
            .any(|s| s.uuid == service.uuid);

        Ok(if present {
            AccessStatus::Allowed
        } else {
            AccessStatus::Denied
        })
    }

    async fn characteristics(
        &self,
        service: &ServiceDescriptor,
        cache: CacheMode,
    ) -> std::result::Result<Vec<CharacteristicDescriptor>, GattError> {
        self.refresh(cache).await?;

        let characteristics: Vec<Characteristic> = self
            .peripheral
            .characteristics()
            .into_iter()
            .filter(|c| c.service_uuid == service.uuid)
            .collect();

        let mut descriptors = Vec::with_capacity(characteristics.len());
        for characteristic in characteristics {
            let description = self.user_description(&characteristic).await;
            descriptors.push(CharacteristicDescriptor {
                name: characteristic_name(&characteristic.uuid, description.as_deref()),
                uuid: characteristic.uuid,
                service_uuid: characteristic.service_uuid,
                properties: characteristic.properties,
            });
        }

        Ok(descriptors)
    }

    async fn descriptors(
        &self,
        characteristic: &CharacteristicDescriptor,
        cache: CacheMode,
    ) -> std::result::Result<Vec<Uuid>, GattError> {
        self.refresh(cache).await?;

        Ok(self
            .find_characteristic(characteristic)?
            .descriptors
            .iter()
            .map(|d| d.uuid)
            .collect())
    }

    async fn write_cccd(
        &self,
        characteristic: &CharacteristicDescriptor,
        value: CccdValue,
    ) -> std::result::Result<(), GattError> {
        let target = self.find_characteristic(characteristic)?;

        // The backend picks notify or indicate from the advertised properties.
        match value {
            CccdValue::None => self.peripheral.unsubscribe(&target).await?,
            CccdValue::Notify | CccdValue::Indicate => self.peripheral.subscribe(&target).await?,
        }

        debug!("Wrote CCCD {} to {}", value, characteristic.uuid);
        Ok(())
    }

    async fn notifications(&self) -> std::result::Result<NotificationStream, GattError> {
        let stream = self.peripheral.notifications().await?;

        Ok(stream
            .map(|notification| NotificationEvent {
                characteristic_uuid: notification.uuid,
                data: notification.value,
            })
            .boxed())
    }

    async fn close(&self) -> std::result::Result<(), GattError> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            self.peripheral.disconnect().await?;
            info!("Disconnected from {}", self.id());
        }
        Ok(())
    }
}

/// Drop a connection this open made if the open then failed.
async fn release_on_failure<D>(
    result: std::result::Result<(), btleplug::Error>,
    made_connection: bool,
    disconnect: D,
) -> std::result::Result<(), GattError>
where
    D: Future<Output = std::result::Result<(), btleplug::Error>>,
{
    let Err(e) = result else {
        return Ok(());
    };

    if made_connection {
        match disconnect.await {
            Ok(()) => debug!("Disconnected after failed service discovery"),
            Err(d) => warn!("Failed to disconnect after failed service discovery: {}", d),
        }
    }

    Err(e.into())
}
