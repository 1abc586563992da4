//! [`Transport`] backed by a btleplug peripheral.
//!
//! Enabled with the `btleplug` feature. The peripheral must already be
//! connected; this adapter only issues GATT requests.

use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use tracing::debug;
use uuid::Uuid;

use gattlink_types::{
    CacheMode, CharacteristicInfo, CharacteristicProperties, DescriptorValue, ServiceInfo,
};

use crate::error::TransportError;
use crate::transport::Transport;

impl From<btleplug::Error> for TransportError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::NotConnected | btleplug::Error::DeviceNotFound => {
                TransportError::LinkLost
            }
            btleplug::Error::TimedOut(_) => TransportError::Timeout,
            btleplug::Error::NotSupported(what) => TransportError::Unsupported(what),
            btleplug::Error::PermissionDenied => {
                TransportError::Rejected("permission denied".to_string())
            }
            other => TransportError::Other(other.to_string()),
        }
    }
}

fn properties(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

/// GATT transport over a connected btleplug peripheral.
#[derive(Debug, Clone)]
pub struct BtleTransport {
    peripheral: Peripheral,
}

impl BtleTransport {
    /// Wrap an already connected peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        Self { peripheral }
    }

    /// The underlying btleplug peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    async fn refresh(&self, cache_mode: CacheMode) -> Result<(), TransportError> {
        // btleplug caches the attribute table after the first discovery.
        if cache_mode == CacheMode::Uncached || self.peripheral.services().is_empty() {
            self.peripheral.discover_services().await?;
        }
        Ok(())
    }

    fn find(&self, service: Uuid, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics)
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| {
                TransportError::Other(format!("characteristic {uuid} not found in {service}"))
            })
    }
}

#[async_trait]
impl Transport for BtleTransport {
    async fn get_services(
        &self,
        cache_mode: CacheMode,
    ) -> Result<Vec<ServiceInfo>, TransportError> {
        self.refresh(cache_mode).await?;
        Ok(self
            .peripheral
            .services()
            .into_iter()
            .map(|s| ServiceInfo {
                uuid: s.uuid,
                primary: s.primary,
            })
            .collect())
    }

    async fn get_characteristics(
        &self,
        service: Uuid,
        cache_mode: CacheMode,
    ) -> Result<Vec<CharacteristicInfo>, TransportError> {
        self.refresh(cache_mode).await?;
        let characteristics: Vec<_> = self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics)
            .map(|c| CharacteristicInfo::new(c.service_uuid, c.uuid, properties(c.properties)))
            .collect();
        debug!(%service, count = characteristics.len(), "Read characteristics");
        Ok(characteristics)
    }

    async fn write_subscription_descriptor(
        &self,
        characteristic: &CharacteristicInfo,
        value: DescriptorValue,
    ) -> Result<(), TransportError> {
        let target = self.find(characteristic.service_uuid, characteristic.uuid)?;
        // btleplug picks notify or indicate from the characteristic's flags.
        if value.is_enabled() {
            self.peripheral.subscribe(&target).await?;
        } else {
            self.peripheral.unsubscribe(&target).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_flags_mapping() {
        let props = properties(CharPropFlags::READ | CharPropFlags::NOTIFY);
        assert!(props.read);
        assert!(props.notify);
        assert!(!props.indicate);
        assert!(!props.write);
    }

    #[test]
    fn test_btleplug_error_conversion() {
        assert_eq!(
            TransportError::from(btleplug::Error::NotConnected),
            TransportError::LinkLost
        );
        assert_eq!(
            TransportError::from(btleplug::Error::TimedOut(std::time::Duration::from_secs(1))),
            TransportError::Timeout
        );
        assert!(matches!(
            TransportError::from(btleplug::Error::NotSupported("cccd".into())),
            TransportError::Unsupported(_)
        ));
    }
}
