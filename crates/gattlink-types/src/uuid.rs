//! Well-known Bluetooth GATT UUIDs.
//!
//! Only the attributes the connection layer touches directly are listed here.
//! Use [`from_short`] to expand any other 16-bit assigned number.

use uuid::{Uuid, uuid};

/// The Bluetooth Base UUID (`00000000-0000-1000-8000-00805f9b34fb`).
pub const BASE_UUID: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

// --- Standard Service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Generic Attribute Profile (GATT) service.
pub const GATT_SERVICE: Uuid = uuid!("00001801-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

// --- Standard Characteristic UUIDs ---

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Service Changed characteristic (indicates that the attribute table changed).
pub const SERVICE_CHANGED: Uuid = uuid!("00002a05-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

// --- Descriptor UUIDs ---

/// Client Characteristic Configuration Descriptor (CCCD).
///
/// Writing this descriptor enables or disables notifications and indications.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid =
    uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// Expand a 16-bit assigned number into a full 128-bit UUID.
///
/// # Examples
///
/// ```
/// use gattlink_types::uuid::{from_short, BATTERY_SERVICE};
///
/// assert_eq!(from_short(0x180F), BATTERY_SERVICE);
/// ```
#[must_use]
pub const fn from_short(short: u16) -> Uuid {
    let mut bytes = *BASE_UUID.as_bytes();
    let [hi, lo] = short.to_be_bytes();
    bytes[2] = hi;
    bytes[3] = lo;
    Uuid::from_bytes(bytes)
}

/// Return the 16-bit assigned number if `uuid` is derived from the base UUID.
#[must_use]
pub fn to_short(uuid: &Uuid) -> Option<u16> {
    let bytes = uuid.as_bytes();
    let base = BASE_UUID.as_bytes();
    if bytes[0] == 0 && bytes[1] == 0 && bytes[4..] == base[4..] {
        Some(u16::from_be_bytes([bytes[2], bytes[3]]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_short_matches_constants() {
        assert_eq!(from_short(0x1800), GAP_SERVICE);
        assert_eq!(from_short(0x1801), GATT_SERVICE);
        assert_eq!(from_short(0x180A), DEVICE_INFO_SERVICE);
        assert_eq!(from_short(0x2902), CLIENT_CHARACTERISTIC_CONFIGURATION);
        assert_eq!(from_short(0x2A19), BATTERY_LEVEL);
    }

    #[test]
    fn test_to_short() {
        assert_eq!(to_short(&SERVICE_CHANGED), Some(0x2A05));
        assert_eq!(to_short(&BASE_UUID), Some(0));

        let vendor = uuid!("f0cd1400-95da-4f4b-9ac8-aa55d312af0c");
        assert_eq!(to_short(&vendor), None);
    }

    #[test]
    fn test_32bit_alias_is_not_short() {
        let uuid = uuid!("12341800-0000-1000-8000-00805f9b34fb");
        assert_eq!(to_short(&uuid), None);
    }
}
