//! Device addresses
//!
//! Hardware addresses arrive from the host in whatever case the caller used.
//! Everything inside the bridge works on the canonical uppercase form so that
//! registry lookups never depend on the caller's spelling.

use crate::error::{BridgeError, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// Number of characters in `XX:XX:XX:XX:XX:XX`
const ADDRESS_LENGTH: usize = 17;

/// Canonical (uppercase, colon delimited) hardware address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl std::str::FromStr for DeviceAddress {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        normalize(s)
    }
}

/// Validate `address` and return its canonical form
pub fn normalize(address: &str) -> Result<DeviceAddress> {
    let upper = address.to_ascii_uppercase();

    if is_hardware_address(&upper) {
        Ok(DeviceAddress(upper))
    } else {
        Err(BridgeError::InvalidAddress(address.to_string()))
    }
}

/// Check that `address` is a valid address without keeping the result
pub fn is_valid(address: &str) -> bool {
    normalize(address).is_ok()
}

// Six uppercase hex octets separated by ':'
fn is_hardware_address(address: &str) -> bool {
    if address.len() != ADDRESS_LENGTH {
        return false;
    }

    address.bytes().enumerate().all(|(i, b)| match i % 3 {
        2 => b == b':',
        _ => b.is_ascii_digit() || (b'A'..=b'F').contains(&b),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_uppercases() {
        let addr = normalize("a4:c1:38:0f:9e:2b").unwrap();
        assert_eq!(addr.as_str(), "A4:C1:38:0F:9E:2B");
        assert_eq!(addr, normalize("A4:C1:38:0f:9E:2b").unwrap());
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        for bad in [
            "",
            "A4:C1:38:0F:9E",
            "A4:C1:38:0F:9E:2B:00",
            "A4-C1-38-0F-9E-2B",
            "A4:C1:38:0F:9E:2G",
            "A4C1:38:0F:9E:2B:",
            " A4:C1:38:0F:9E:2B",
        ] {
            assert!(
                matches!(normalize(bad), Err(BridgeError::InvalidAddress(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_invalid_address_keeps_caller_spelling() {
        match normalize("zz:00") {
            Err(BridgeError::InvalidAddress(raw)) => assert_eq!(raw, "zz:00"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let addr = normalize("00:11:22:aa:bb:cc").unwrap();
        assert_eq!(
            serde_json::to_string(&addr).unwrap(),
            "\"00:11:22:AA:BB:CC\""
        );
    }
}
