//! GATT attribute model
//!
//! Services own characteristics, characteristics own descriptors. A UUID may
//! repeat within one device, so services and characteristics are identified by
//! `(uuid, instance_id)` pairs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characteristic property bits as reported by the platform
pub mod properties {
    pub const BROADCAST: u32 = 0x01;
    pub const READ: u32 = 0x02;
    pub const WRITE_NO_RESPONSE: u32 = 0x04;
    pub const WRITE: u32 = 0x08;
    pub const NOTIFY: u32 = 0x10;
    pub const INDICATE: u32 = 0x20;
    pub const SIGNED_WRITE: u32 = 0x40;
    pub const EXTENDED_PROPS: u32 = 0x80;
}

/// Attribute permission bits as reported by the platform
pub mod permissions {
    pub const READ: u32 = 0x01;
    pub const READ_ENCRYPTED: u32 = 0x02;
    pub const READ_ENCRYPTED_MITM: u32 = 0x04;
    pub const WRITE: u32 = 0x10;
    pub const WRITE_ENCRYPTED: u32 = 0x20;
    pub const WRITE_ENCRYPTED_MITM: u32 = 0x40;
    pub const WRITE_SIGNED: u32 = 0x80;
    pub const WRITE_SIGNED_MITM: u32 = 0x100;
}

/// How a characteristic write is performed on air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteType {
    /// Write request, acknowledged by the peripheral
    #[default]
    Default,
    /// Write command, no acknowledgement
    NoResponse,
    /// Authenticated signed write
    Signed,
}

impl WriteType {
    /// Platform numeric value
    pub fn raw(self) -> i32 {
        match self {
            Self::NoResponse => 1,
            Self::Default => 2,
            Self::Signed => 4,
        }
    }
}

/// `(uuid, instance_id)` pair naming one service or characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeId {
    pub uuid: Uuid,
    pub instance_id: u32,
}

impl AttributeId {
    pub fn new(uuid: Uuid, instance_id: u32) -> Self {
        Self { uuid, instance_id }
    }
}

/// Structural back-reference from a characteristic to its service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicPath {
    pub service: AttributeId,
    pub characteristic: AttributeId,
}

/// Structural back-reference from a descriptor to its characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorPath {
    pub characteristic: CharacteristicPath,
    pub descriptor: Uuid,
}

/// Either kind of attribute that can be read or written.
///
/// Both share one read/write contract; the variant only decides which
/// catalog entry holds the shadow value and which event kind reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeTarget {
    Characteristic(CharacteristicPath),
    Descriptor(DescriptorPath),
}

impl AttributeTarget {
    pub fn characteristic_path(&self) -> &CharacteristicPath {
        match self {
            Self::Characteristic(path) => path,
            Self::Descriptor(path) => &path.characteristic,
        }
    }

    pub fn descriptor_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Characteristic(_) => None,
            Self::Descriptor(path) => Some(path.descriptor),
        }
    }

    /// Key under which read/notification options are kept for this attribute
    pub fn options_key(&self) -> OptionsKey {
        let path = self.characteristic_path();
        OptionsKey {
            service: path.service.uuid,
            characteristic: path.characteristic.uuid,
            descriptor: self.descriptor_uuid(),
        }
    }
}

impl From<CharacteristicPath> for AttributeTarget {
    fn from(path: CharacteristicPath) -> Self {
        Self::Characteristic(path)
    }
}

impl From<DescriptorPath> for AttributeTarget {
    fn from(path: DescriptorPath) -> Self {
        Self::Descriptor(path)
    }
}

/// UUID triple that keys pending read/notification options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionsKey {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub descriptor: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GattDescriptor {
    pub uuid: Uuid,
    pub permissions: u32,
    /// Local shadow of the last value read, written or buffered
    #[serde(skip)]
    pub value: Vec<u8>,
}

impl GattDescriptor {
    pub fn new(uuid: Uuid, permissions: u32) -> Self {
        Self {
            uuid,
            permissions,
            value: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub instance_id: u32,
    pub properties: u32,
    pub permissions: u32,
    pub write_type: WriteType,
    pub descriptors: Vec<GattDescriptor>,
    /// Local shadow of the last value read, written or buffered
    #[serde(skip)]
    pub value: Vec<u8>,
}

impl GattCharacteristic {
    pub fn new(uuid: Uuid, instance_id: u32, props: u32) -> Self {
        let write_type = if props & properties::WRITE_NO_RESPONSE != 0
            && props & properties::WRITE == 0
        {
            WriteType::NoResponse
        } else {
            WriteType::Default
        };

        Self {
            uuid,
            instance_id,
            properties: props,
            permissions: 0,
            write_type,
            descriptors: Vec::new(),
            value: Vec::new(),
        }
    }

    pub fn with_descriptor(mut self, descriptor: GattDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn id(&self) -> AttributeId {
        AttributeId::new(self.uuid, self.instance_id)
    }

    pub fn has_property(&self, flag: u32) -> bool {
        self.properties & flag != 0
    }

    pub fn descriptor(&self, uuid: &Uuid) -> Option<&GattDescriptor> {
        self.descriptors.iter().find(|d| &d.uuid == uuid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GattService {
    pub uuid: Uuid,
    pub instance_id: u32,
    pub primary: bool,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn new(uuid: Uuid, instance_id: u32) -> Self {
        Self {
            uuid,
            instance_id,
            primary: true,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: GattCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn id(&self) -> AttributeId {
        AttributeId::new(self.uuid, self.instance_id)
    }
}
