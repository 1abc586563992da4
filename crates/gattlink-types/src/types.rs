//! Core GATT value types.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ParseError, ParseResult};

/// Whether a transport read may be answered from the platform's attribute cache.
///
/// The keep-alive probe and top-level discovery always use
/// [`CacheMode::Uncached`] so that the request forces a live round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CacheMode {
    /// Results may come from the platform cache.
    Cached,
    /// Results must come from the peripheral.
    #[default]
    Uncached,
}

/// Value of the Client Characteristic Configuration Descriptor.
///
/// The descriptor is a little-endian 16-bit bitfield where bit 0 enables
/// notifications and bit 1 enables indications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DescriptorValue {
    /// Value changes are not pushed.
    None,
    /// Unacknowledged notifications.
    Notify,
    /// Acknowledged indications.
    Indicate,
}

impl DescriptorValue {
    /// Encode as the two wire bytes of the descriptor.
    ///
    /// # Examples
    ///
    /// ```
    /// use gattlink_types::DescriptorValue;
    ///
    /// assert_eq!(DescriptorValue::None.to_bytes(), [0x00, 0x00]);
    /// assert_eq!(DescriptorValue::Notify.to_bytes(), [0x01, 0x00]);
    /// assert_eq!(DescriptorValue::Indicate.to_bytes(), [0x02, 0x00]);
    /// ```
    #[must_use]
    pub fn to_bytes(self) -> [u8; 2] {
        let bits: u16 = match self {
            DescriptorValue::None => 0x0000,
            DescriptorValue::Notify => 0x0001,
            DescriptorValue::Indicate => 0x0002,
        };
        bits.to_le_bytes()
    }

    /// Decode the descriptor from its wire bytes.
    ///
    /// A value with both bits set is rejected: the connection layer only ever
    /// writes one mode at a time.
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        if data.len() < 2 {
            return Err(ParseError::InsufficientBytes {
                expected: 2,
                actual: data.len(),
            });
        }
        match u16::from_le_bytes([data[0], data[1]]) {
            0x0000 => Ok(DescriptorValue::None),
            0x0001 => Ok(DescriptorValue::Notify),
            0x0002 => Ok(DescriptorValue::Indicate),
            other => Err(ParseError::InvalidValue(format!(
                "unsupported client configuration 0x{other:04X}"
            ))),
        }
    }

    /// Whether this value asks the peripheral to push value changes.
    #[must_use]
    pub fn is_enabled(self) -> bool {
        !matches!(self, DescriptorValue::None)
    }
}

impl fmt::Display for DescriptorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorValue::None => write!(f, "none"),
            DescriptorValue::Notify => write!(f, "notify"),
            DescriptorValue::Indicate => write!(f, "indicate"),
        }
    }
}

/// Subset of GATT characteristic properties relevant to the connection layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CharacteristicProperties {
    /// The value can be read.
    pub read: bool,
    /// The value can be written with response.
    pub write: bool,
    /// The value can be written without response.
    pub write_without_response: bool,
    /// The peripheral can push notifications.
    pub notify: bool,
    /// The peripheral can push indications.
    pub indicate: bool,
}

impl CharacteristicProperties {
    /// Properties of a characteristic that only supports notifications.
    #[must_use]
    pub fn notify_only() -> Self {
        Self {
            notify: true,
            ..Default::default()
        }
    }

    /// Whether any form of value-change subscription is supported.
    #[must_use]
    pub fn supports_subscription(&self) -> bool {
        self.notify || self.indicate
    }

    /// The descriptor value to write when subscribing.
    ///
    /// Notifications are preferred over indications when both are offered.
    #[must_use]
    pub fn subscription_value(&self) -> Option<DescriptorValue> {
        if self.notify {
            Some(DescriptorValue::Notify)
        } else if self.indicate {
            Some(DescriptorValue::Indicate)
        } else {
            None
        }
    }
}

/// A discovered GATT service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ServiceInfo {
    /// Service UUID.
    pub uuid: Uuid,
    /// Whether this is a primary service.
    pub primary: bool,
}

impl ServiceInfo {
    /// Describe a primary service.
    #[must_use]
    pub fn primary(uuid: Uuid) -> Self {
        Self {
            uuid,
            primary: true,
        }
    }
}

/// Identifies a characteristic within the attribute table of one connection.
///
/// Characteristic UUIDs are only unique within their service, so the owning
/// service UUID is part of the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CharacteristicId {
    /// UUID of the owning service.
    pub service: Uuid,
    /// UUID of the characteristic.
    pub characteristic: Uuid,
}

impl CharacteristicId {
    /// Create a new identifier.
    #[must_use]
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// A discovered GATT characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CharacteristicInfo {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the service this characteristic belongs to.
    pub service_uuid: Uuid,
    /// Supported operations.
    pub properties: CharacteristicProperties,
}

impl CharacteristicInfo {
    /// Create a new characteristic description.
    #[must_use]
    pub fn new(service_uuid: Uuid, uuid: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            service_uuid,
            properties,
        }
    }

    /// The connection-wide identifier of this characteristic.
    #[must_use]
    pub fn id(&self) -> CharacteristicId {
        CharacteristicId::new(self.service_uuid, self.uuid)
    }
}
