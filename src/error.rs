//! Bridge Errors
//!
//! Every error here is scoped to the single request that produced it. Transport
//! failures reported by callbacks never show up as a `BridgeError`; they travel
//! as events with `error: true`.

use crate::domain::address::DeviceAddress;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Kind of GATT entity that could not be found in a catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Service,
    Characteristic,
    Descriptor,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Service => "service",
            Self::Characteristic => "characteristic",
            Self::Descriptor => "descriptor",
        };
        f.write_str(name)
    }
}

/// Operation named in an `OperationRejected` error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattOperation {
    Connect,
    DiscoverServices,
    ReadCharacteristic,
    ReadDescriptor,
    WriteCharacteristic,
    WriteDescriptor,
    SetNotification,
    StartScan,
}

impl fmt::Display for GattOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connectGatt",
            Self::DiscoverServices => "discoverServices",
            Self::ReadCharacteristic => "readCharacteristic",
            Self::ReadDescriptor => "readDescriptor",
            Self::WriteCharacteristic => "writeCharacteristic",
            Self::WriteDescriptor => "writeDescriptor",
            Self::SetNotification => "setCharacteristicNotification",
            Self::StartScan => "startScan",
        };
        f.write_str(name)
    }
}

/// Step at which an operation was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectStage {
    /// The value could not be placed into the entity's shadow copy
    LocalBuffer,
    /// The platform declined to start the operation
    PlatformSubmit,
    /// Another operation already occupies the resource
    Busy,
}

impl fmt::Display for RejectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LocalBuffer => "local buffer",
            Self::PlatformSubmit => "platform submission",
            Self::Busy => "busy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid device id: '{0}'")]
    InvalidAddress(String),

    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,

    #[error("GATT for '{0}' hasn't been connected")]
    SessionNotFound(DeviceAddress),

    #[error("Services of '{0}' haven't been discovered")]
    ServicesNotDiscovered(DeviceAddress),

    #[error("No {kind} with UUID {uuid}")]
    EntityNotFound { kind: EntityKind, uuid: Uuid },

    #[error("{operation} rejected at {stage}")]
    OperationRejected {
        operation: GattOperation,
        stage: RejectStage,
    },

    #[error("Value can't be encoded: {0}")]
    ValueEncodingFailed(String),

    #[error("Invalid UUID: '{0}'")]
    InvalidUuid(String),
}

impl BridgeError {
    pub(crate) fn rejected(operation: GattOperation, stage: RejectStage) -> Self {
        Self::OperationRejected { operation, stage }
    }

    /// Stable code handed to the host runtime alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "E_INVALID_ADDRESS",
            Self::AdapterDisabled => "E_ADAPTER_DISABLED",
            Self::SessionNotFound(_) => "E_SESSION_NOT_FOUND",
            Self::ServicesNotDiscovered(_) => "E_SERVICES_NOT_DISCOVERED",
            Self::EntityNotFound { .. } => "E_ENTITY_NOT_FOUND",
            Self::OperationRejected { .. } => "E_OPERATION_REJECTED",
            Self::ValueEncodingFailed(_) => "E_VALUE_ENCODING_FAILED",
            Self::InvalidUuid(_) => "E_INVALID_UUID",
        }
    }
}
