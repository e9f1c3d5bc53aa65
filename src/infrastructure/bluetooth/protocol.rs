//! GATT Bridge Protocol
//!
//! Identifiers, status codes and the event-name catalog shared between the
//! bridge and its host runtime.

use crate::domain::models::ScanMode;
use crate::error::{BridgeError, Result};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Prefix of every event name the bridge emits
pub const TAG: &str = "GattBridge";

/// Bluetooth base UUID, the short forms are expanded into it
/// (0000xxxx-0000-1000-8000-00805F9B34FB)
pub const BASE_UUID: Uuid = Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5f9b_34fb);

/// Client Characteristic Configuration descriptor
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);

/// Callback status reporting success; anything else is passed through verbatim
pub const GATT_SUCCESS: i32 = 0;

/// Generic failure, used for queued requests the platform refused to start
pub const GATT_FAILURE: i32 = 0x101;

/// Longest value a single attribute can hold
pub const MAX_ATTRIBUTE_LENGTH: usize = 512;

/// Values written to the CCCD when toggling notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CccdValue {
    Disable,
    EnableNotification,
    EnableIndication,
}

impl CccdValue {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Disable => &[0x00, 0x00],
            Self::EnableNotification => &[0x01, 0x00],
            Self::EnableIndication => &[0x02, 0x00],
        }
    }
}

macro_rules! event_name {
    ($name:literal) => {
        concat!("GattBridge", $name)
    };
}

/// Event-name catalog, grouped the way the host subscribes to it
pub mod events {
    pub mod connection_state {
        pub const CONNECTED: &str = event_name!("CONNECTION_STATE_CONNECTED");
        pub const CONNECTING: &str = event_name!("CONNECTION_STATE_CONNECTING");
        pub const DISCONNECTED: &str = event_name!("CONNECTION_STATE_DISCONNECTED");
        pub const DISCONNECTING: &str = event_name!("CONNECTION_STATE_DISCONNECTING");

        pub const ALL: &[(&str, &str)] = &[
            ("CONNECTED", CONNECTED),
            ("CONNECTING", CONNECTING),
            ("DISCONNECTED", DISCONNECTED),
            ("DISCONNECTING", DISCONNECTING),
        ];
    }

    pub mod gatt {
        pub const SERVICES_DISCOVERED: &str = event_name!("SERVICES_DISCOVERED");
        pub const CHARACTERISTIC_READ: &str = event_name!("CHARACTERISTIC_READ");
        pub const CHARACTERISTIC_WRITTEN: &str = event_name!("CHARACTERISTIC_WRITTEN");
        pub const CHARACTERISTIC_CHANGED: &str = event_name!("CHARACTERISTIC_CHANGED");
        pub const DESCRIPTOR_READ: &str = event_name!("DESCRIPTOR_READ");
        pub const DESCRIPTOR_WRITTEN: &str = event_name!("DESCRIPTOR_WRITTEN");

        pub const ALL: &[(&str, &str)] = &[
            ("SERVICES_DISCOVERED", SERVICES_DISCOVERED),
            ("CHARACTERISTIC_READ", CHARACTERISTIC_READ),
            ("CHARACTERISTIC_WRITTEN", CHARACTERISTIC_WRITTEN),
            ("CHARACTERISTIC_CHANGED", CHARACTERISTIC_CHANGED),
            ("DESCRIPTOR_READ", DESCRIPTOR_READ),
            ("DESCRIPTOR_WRITTEN", DESCRIPTOR_WRITTEN),
        ];
    }

    pub mod le_scan_callback {
        pub const SCAN_FAILED: &str = event_name!("SCAN_FAILED");
        pub const SCAN_RESULT: &str = event_name!("SCAN_RESULT");
        pub const BATCH_SCAN_RESULTS: &str = event_name!("BATCH_SCAN_RESULTS");

        pub const ALL: &[(&str, &str)] = &[
            ("SCAN_FAILED", SCAN_FAILED),
            ("SCAN_RESULT", SCAN_RESULT),
            ("BATCH_SCAN_RESULTS", BATCH_SCAN_RESULTS),
        ];
    }
}

/// Constants exposed to the host: scan modes and the event-name catalog
pub fn exported_constants() -> Value {
    let scan_modes: Map<String, Value> = ScanMode::ALL
        .iter()
        .map(|mode| (mode.name().to_string(), Value::from(mode.raw())))
        .collect();

    let group = |names: &[(&str, &str)]| -> Value {
        names
            .iter()
            .map(|(key, name)| (key.to_string(), Value::from(*name)))
            .collect::<Map<String, Value>>()
            .into()
    };

    json!({
        "scanMode": scan_modes,
        "events": {
            "connectionState": group(events::connection_state::ALL),
            "gatt": group(events::gatt::ALL),
            "leScanCallback": group(events::le_scan_callback::ALL),
        }
    })
}

/// Parse a UUID string.
///
/// Accepts the full 128-bit form as well as 16-bit ("180A") and 32-bit
/// short forms, which are expanded against the Bluetooth base UUID.
pub fn parse_uuid(uuid_str: &str) -> Result<Uuid> {
    let trimmed = uuid_str.trim();
    let short = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if (short.len() == 4 || short.len() == 8) && short.bytes().all(|b| b.is_ascii_hexdigit()) {
        let value = u32::from_str_radix(short, 16)
            .map_err(|_| BridgeError::InvalidUuid(uuid_str.to_string()))?;
        return Ok(Uuid::from_u128(BASE_UUID.as_u128() | ((value as u128) << 96)));
    }

    Uuid::parse_str(trimmed).map_err(|_| BridgeError::InvalidUuid(uuid_str.to_string()))
}
