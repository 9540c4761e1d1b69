//! Oximetry service and characteristic discovery.
//!
//! Every enumeration bypasses the platform cache: the services a device
//! exposes may change between sessions.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ble::gatt::{
    AccessStatus, CacheMode, CharacteristicDescriptor, GattDevice, ServiceDescriptor,
};
use crate::config::ClientConfig;
use crate::error::DiscoveryError;
use crate::feedback::{Severity, UserFeedback};

/// Finds the oximetry service and characteristic on an opened device.
#[derive(Clone)]
pub struct Discovery {
    service_name: String,
    characteristic_keyword: String,
    feedback: Arc<dyn UserFeedback>,
}

impl Discovery {
    /// Create a discovery pipeline using the names from `config`.
    pub fn new(config: &ClientConfig, feedback: Arc<dyn UserFeedback>) -> Self {
        Self {
            service_name: config.service_name.clone(),
            characteristic_keyword: config.characteristic_keyword.clone(),
            feedback,
        }
    }

    /// Run all discovery stages, stopping at the first failure.
    pub async fn discover(
        &self,
        device: &dyn GattDevice,
    ) -> Result<(ServiceDescriptor, CharacteristicDescriptor), DiscoveryError> {
        let service = self.find_service(device).await?;
        let characteristic = self.find_characteristic(device, &service).await?;
        Ok((service, characteristic))
    }

    async fn find_service(&self, device: &dyn GattDevice) -> Result<ServiceDescriptor, DiscoveryError> {
        let services = device
            .services(CacheMode::Uncached)
            .await
            .map_err(|e| {
                warn!("Failed to enumerate services: {}", e);
                DiscoveryError::ServicesUnreachable
            })?;

        self.feedback
            .notify_user(&format!("Found {} services", services.len()), Severity::Status);

        for service in &services {
            debug!("Found service: {} ({})", service.name, service.uuid);
        }

        services
            .into_iter()
            .find(|service| service.name == self.service_name)
            .ok_or_else(|| DiscoveryError::ServiceNotFound {
                name: self.service_name.clone(),
            })
    }

    async fn find_characteristic(
        &self,
        device: &dyn GattDevice,
        service: &ServiceDescriptor,
    ) -> Result<CharacteristicDescriptor, DiscoveryError> {
        let denied = || DiscoveryError::AccessDenied {
            name: service.name.clone(),
        };

        match device.request_access(service).await {
            Ok(AccessStatus::Allowed) => {}
            Ok(AccessStatus::Denied) => return Err(denied()),
            Err(e) => {
                warn!("Access request for {} failed: {}", service.uuid, e);
                return Err(denied());
            }
        }

        let characteristics = device
            .characteristics(service, CacheMode::Uncached)
            .await
            .map_err(|e| {
                warn!("Failed to enumerate characteristics of {}: {}", service.uuid, e);
                DiscoveryError::CharacteristicsUnreachable {
                    name: service.name.clone(),
                }
            })?;

        let characteristic = characteristics
            .into_iter()
            .find(|c| c.name.contains(&self.characteristic_keyword))
            .ok_or_else(|| DiscoveryError::CharacteristicNotFound {
                keyword: self.characteristic_keyword.clone(),
            })?;

        self.feedback
            .notify_user("Accessing service...", Severity::Status);

        let descriptors = device
            .descriptors(&characteristic, CacheMode::Uncached)
            .await
            .map_err(|e| DiscoveryError::DescriptorsUnreachable {
                reason: e.to_string(),
            })?;

        info!(
            "Selected characteristic {} ({}) with {} descriptors",
            characteristic.name,
            characteristic.uuid,
            descriptors.len()
        );

        Ok(characteristic)
    }
}
