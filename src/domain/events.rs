//! Outbound events
//!
//! One variant per event kind. Every device event carries the
//! `{deviceId, status, error}` header; the host receives each event as a
//! name from the catalog in `protocol::events` plus a JSON body.

use crate::domain::address::DeviceAddress;
use crate::domain::codec::DecodedValue;
use crate::domain::gatt::{AttributeTarget, GattService};
use crate::domain::models::ConnectionState;
use crate::infrastructure::bluetooth::protocol::{events, GATT_SUCCESS};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    pub device_id: DeviceAddress,
    /// Raw platform status, zero on success
    pub status: i32,
    pub error: bool,
}

impl EventHeader {
    pub fn new(device_id: DeviceAddress, status: i32) -> Self {
        Self {
            device_id,
            status,
            error: status != GATT_SUCCESS,
        }
    }
}

/// UUIDs naming the attribute an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRef {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor_uuid: Option<Uuid>,
}

impl From<&AttributeTarget> for AttributeRef {
    fn from(target: &AttributeTarget) -> Self {
        let path = target.characteristic_path();
        Self {
            service_uuid: path.service.uuid,
            characteristic_uuid: path.characteristic.uuid,
            descriptor_uuid: target.descriptor_uuid(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStateEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub state: ConnectionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesDiscoveredEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub services: Vec<GattService>,
}

/// Read completion or notified change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeValueEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    #[serde(flatten)]
    pub attribute: AttributeRef,
    /// Absent when the operation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<DecodedValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeWrittenEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    #[serde(flatten)]
    pub attribute: AttributeRef,
    /// False for every chunk of a chunked write except the last one
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFailedEvent {
    pub status: i32,
    pub error: bool,
    pub error_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedDevice {
    pub id: DeviceAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub device: ScannedDevice,
    pub rssi: i32,
    pub advertisement: DecodedValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultEvent {
    pub status: i32,
    pub error: bool,
    /// Platform callback type for single results, absent for batches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_type: Option<i32>,
    pub results: Vec<ScanRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BridgeEvent {
    ConnectionState(ConnectionStateEvent),
    ServicesDiscovered(ServicesDiscoveredEvent),
    CharacteristicRead(AttributeValueEvent),
    CharacteristicWritten(AttributeWrittenEvent),
    CharacteristicChanged(AttributeValueEvent),
    DescriptorRead(AttributeValueEvent),
    DescriptorWritten(AttributeWrittenEvent),
    ScanFailed(ScanFailedEvent),
    ScanResult(ScanResultEvent),
    BatchScanResults(ScanResultEvent),
}

/// Event as handed to the host runtime
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub name: &'static str,
    pub body: Value,
}

impl BridgeEvent {
    /// Fixed event-kind identifier from the catalog
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionState(event) => match event.state {
                ConnectionState::Connected => events::connection_state::CONNECTED,
                ConnectionState::Connecting => events::connection_state::CONNECTING,
                ConnectionState::Disconnected => events::connection_state::DISCONNECTED,
                ConnectionState::Disconnecting => events::connection_state::DISCONNECTING,
            },
            Self::ServicesDiscovered(_) => events::gatt::SERVICES_DISCOVERED,
            Self::CharacteristicRead(_) => events::gatt::CHARACTERISTIC_READ,
            Self::CharacteristicWritten(_) => events::gatt::CHARACTERISTIC_WRITTEN,
            Self::CharacteristicChanged(_) => events::gatt::CHARACTERISTIC_CHANGED,
            Self::DescriptorRead(_) => events::gatt::DESCRIPTOR_READ,
            Self::DescriptorWritten(_) => events::gatt::DESCRIPTOR_WRITTEN,
            Self::ScanFailed(_) => events::le_scan_callback::SCAN_FAILED,
            Self::ScanResult(_) => events::le_scan_callback::SCAN_RESULT,
            Self::BatchScanResults(_) => events::le_scan_callback::BATCH_SCAN_RESULTS,
        }
    }

    /// Device the event belongs to; scan events have none
    pub fn device_id(&self) -> Option<&DeviceAddress> {
        self.header().map(|header| &header.device_id)
    }

    pub fn header(&self) -> Option<&EventHeader> {
        match self {
            Self::ConnectionState(event) => Some(&event.header),
            Self::ServicesDiscovered(event) => Some(&event.header),
            Self::CharacteristicRead(event)
            | Self::CharacteristicChanged(event)
            | Self::DescriptorRead(event) => Some(&event.header),
            Self::CharacteristicWritten(event) | Self::DescriptorWritten(event) => {
                Some(&event.header)
            }
            Self::ScanFailed(_) | Self::ScanResult(_) | Self::BatchScanResults(_) => None,
        }
    }

    /// Decoded value carried by read and change events
    pub fn value(&self) -> Option<&DecodedValue> {
        match self {
            Self::CharacteristicRead(event)
            | Self::CharacteristicChanged(event)
            | Self::DescriptorRead(event) => event.value.as_ref(),
            _ => None,
        }
    }

    /// Project the event into its name and JSON body; the body also carries
    /// the name under `eventName`
    pub fn to_message(&self) -> serde_json::Result<EventMessage> {
        let name = self.name();
        let mut body = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut body {
            map.insert("eventName".to_string(), Value::from(name));
        }
        Ok(EventMessage { name, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::address::normalize;
    use crate::domain::gatt::{AttributeId, CharacteristicPath};
    use serde_json::json;

    fn device() -> DeviceAddress {
        normalize("c0:ff:ee:00:00:01").unwrap()
    }

    #[test]
    fn test_header_flags_error_from_status() {
        assert!(!EventHeader::new(device(), 0).error);
        let failed = EventHeader::new(device(), 133);
        assert!(failed.error);
        assert_eq!(failed.status, 133);
    }

    #[test]
    fn test_read_event_message() {
        let target = AttributeTarget::Characteristic(CharacteristicPath {
            service: AttributeId::new(Uuid::from_u128(0xA), 0),
            characteristic: AttributeId::new(Uuid::from_u128(0xB), 3),
        });
        let event = BridgeEvent::CharacteristicRead(AttributeValueEvent {
            header: EventHeader::new(device(), 0),
            attribute: AttributeRef::from(&target),
            value: Some(DecodedValue::Text("CD".into())),
        });

        let message = event.to_message().unwrap();
        assert_eq!(message.name, events::gatt::CHARACTERISTIC_READ);
        assert_eq!(message.body["deviceId"], "C0:FF:EE:00:00:01");
        assert_eq!(message.body["error"], false);
        assert_eq!(message.body["value"], "CD");
        assert_eq!(message.body["eventName"], events::gatt::CHARACTERISTIC_READ);
        assert!(message.body.get("descriptorUuid").is_none());
    }

    #[test]
    fn test_connection_state_names() {
        let event = BridgeEvent::ConnectionState(ConnectionStateEvent {
            header: EventHeader::new(device(), 8),
            state: ConnectionState::Disconnected,
        });
        assert_eq!(event.name(), events::connection_state::DISCONNECTED);
        assert_eq!(
            event.to_message().unwrap().body,
            json!({
                "deviceId": "C0:FF:EE:00:00:01",
                "status": 8,
                "error": true,
                "state": "DISCONNECTED",
                "eventName": events::connection_state::DISCONNECTED,
            })
        );
    }

    #[test]
    fn test_scan_events_have_no_device() {
        let event = BridgeEvent::ScanFailed(ScanFailedEvent {
            status: 2,
            error: true,
            error_code: 2,
        });
        assert!(event.device_id().is_none());
        assert_eq!(event.name(), events::le_scan_callback::SCAN_FAILED);
    }
}
