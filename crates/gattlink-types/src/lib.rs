//! Platform-agnostic GATT types for gattlink.
//!
//! This crate provides the value types shared between the connection core
//! (gattlink-core) and any transport implementation.
//!
//! # Features
//!
//! - Service and characteristic descriptions
//! - Client Characteristic Configuration Descriptor values
//! - UUID constants for the standard GATT attributes
//! - Error types for descriptor parsing
//!
//! # Example
//!
//! ```
//! use gattlink_types::{CharacteristicInfo, CharacteristicProperties, DescriptorValue};
//! use gattlink_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE};
//!
//! let battery = CharacteristicInfo::new(
//!     BATTERY_SERVICE,
//!     BATTERY_LEVEL,
//!     CharacteristicProperties::notify_only(),
//! );
//! assert_eq!(
//!     battery.properties.subscription_value(),
//!     Some(DescriptorValue::Notify)
//! );
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    CacheMode, CharacteristicId, CharacteristicInfo, CharacteristicProperties, DescriptorValue,
    ServiceInfo,
};


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn descriptor_from_bytes_never_panics(data in proptest::collection::vec(any::<u8>(), 0..8)) {
            let _ = DescriptorValue::from_bytes(&data);
        }

        #[test]
        fn descriptor_decodes_what_it_encodes(choice in 0u8..3) {
            let value = match choice {
                0 => DescriptorValue::None,
                1 => DescriptorValue::Notify,
                _ => DescriptorValue::Indicate,
            };
            prop_assert_eq!(DescriptorValue::from_bytes(&value.to_bytes()), Ok(value));
        }
    }
}
