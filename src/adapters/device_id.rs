//! Device identity derived from the 8-byte link-layer address.
//!
//! The full name doubles as the SenML base name:
//! `urn:dev:mac:XXXXXXXXXXXXXXXX:` (upper-case hex, trailing colon).
//! It is stable across restarts as long as the address is.

use core::fmt::Write;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::registration::{DeviceIdentity, DeviceType};

/// 8-byte link-layer address.
pub type LinkAddress = [u8; 8];

/// `urn:dev:mac:` + 16 hex digits + `:`.
pub type BaseName = heapless::String<32>;

pub fn base_name(addr: &LinkAddress) -> BaseName {
    let mut name = BaseName::new();
    let _ = name.push_str("urn:dev:mac:");
    for b in addr {
        let _ = write!(name, "{b:02X}");
    }
    let _ = name.push(':');
    name
}

/// Host stand-in for a radio address: a hash of the host name, the alias
/// and the device type, so two devices on one machine differ.
pub fn host_address(alias: &str, device_type: DeviceType) -> LinkAddress {
    let mut hasher = DefaultHasher::new();
    std::env::var("HOSTNAME").unwrap_or_default().hash(&mut hasher);
    alias.hash(&mut hasher);
    (device_type as u8).hash(&mut hasher);
    hasher.finish().to_be_bytes()
}

pub fn identity(addr: &LinkAddress, alias: &str, device_type: DeviceType) -> DeviceIdentity {
    DeviceIdentity {
        full_name: base_name(addr).as_str().into(),
        alias: alias.into(),
        device_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_format() {
        let addr = [0x00, 0x12, 0x4b, 0x00, 0x0a, 0xbc, 0xde, 0xf1];
        assert_eq!(base_name(&addr).as_str(), "urn:dev:mac:00124B000ABCDEF1:");
    }

    #[test]
    fn host_address_deterministic() {
        let a = host_address("smart_meter_1", DeviceType::SmartPowerMeter);
        let b = host_address("smart_meter_1", DeviceType::SmartPowerMeter);
        assert_eq!(a, b);
        assert_ne!(a, host_address("smart_transformer_1", DeviceType::SmartTransformer));
    }
}
