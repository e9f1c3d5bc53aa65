//! Platform transport
//!
//! The platform's BLE stack seen as a black box: it accepts GATT and scan
//! operations on the caller's thread and answers later through
//! [`PlatformCallback`]s delivered on its own thread.

use crate::domain::address::DeviceAddress;
use crate::domain::gatt::{AttributeTarget, CharacteristicPath, DescriptorPath, GattService, WriteType};
use crate::domain::models::{ScanFilter, ScanSettings};
use std::fmt;

/// Connection handle, allocated by the bridge once per connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GattHandle(pub u64);

impl fmt::Display for GattHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gatt#{}", self.0)
    }
}

/// Operations the bridge issues to the platform.
///
/// Every method returns immediately. A `false` return means the platform
/// declined to start the operation; otherwise the outcome arrives later as
/// a callback.
///
/// `connect_gatt` is issued with no lock held and the handle is already
/// routable, so its first callback may arrive on any thread before the
/// method returns. The other methods are issued while the session is
/// locked and must not deliver callbacks synchronously.
pub trait BleTransport: Send + Sync {
    /// Whether the radio is powered on
    fn is_enabled(&self) -> bool;

    /// Open a GATT connection that reports back under `handle`
    fn connect_gatt(&self, handle: GattHandle, address: &DeviceAddress, auto_connect: bool) -> bool;

    fn disconnect(&self, handle: GattHandle);

    /// Release the connection handle. No callbacks are expected afterwards.
    fn close(&self, handle: GattHandle);

    fn discover_services(&self, handle: GattHandle) -> bool;

    fn read(&self, handle: GattHandle, target: &AttributeTarget) -> bool;

    fn write(
        &self,
        handle: GattHandle,
        target: &AttributeTarget,
        value: &[u8],
        write_type: WriteType,
    ) -> bool;

    /// Local toggle of change delivery; produces no callback
    fn set_notification(&self, handle: GattHandle, path: &CharacteristicPath, enable: bool) -> bool;

    fn start_scan(&self, filters: &[ScanFilter], settings: &ScanSettings) -> bool;

    fn stop_scan(&self);
}

/// GATT client callbacks. Each carries the connection handle and, for
/// attribute callbacks, structural back-references to the attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum GattCallback {
    ConnectionStateChanged {
        handle: GattHandle,
        status: i32,
        new_state: i32,
    },
    ServicesDiscovered {
        handle: GattHandle,
        status: i32,
        services: Vec<GattService>,
    },
    CharacteristicRead {
        handle: GattHandle,
        status: i32,
        path: CharacteristicPath,
        value: Vec<u8>,
    },
    CharacteristicWrite {
        handle: GattHandle,
        status: i32,
        path: CharacteristicPath,
    },
    CharacteristicChanged {
        handle: GattHandle,
        path: CharacteristicPath,
        value: Vec<u8>,
    },
    DescriptorRead {
        handle: GattHandle,
        status: i32,
        path: DescriptorPath,
        value: Vec<u8>,
    },
    DescriptorWrite {
        handle: GattHandle,
        status: i32,
        path: DescriptorPath,
    },
}

impl GattCallback {
    pub fn handle(&self) -> GattHandle {
        match self {
            Self::ConnectionStateChanged { handle, .. }
            | Self::ServicesDiscovered { handle, .. }
            | Self::CharacteristicRead { handle, .. }
            | Self::CharacteristicWrite { handle, .. }
            | Self::CharacteristicChanged { handle, .. }
            | Self::DescriptorRead { handle, .. }
            | Self::DescriptorWrite { handle, .. } => *handle,
        }
    }
}

/// One advertisement as reported by the platform scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScanResult {
    /// Address as the platform spells it
    pub address: String,
    pub name: Option<String>,
    pub rssi: i32,
    pub scan_record: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCallback {
    ScanResult {
        callback_type: i32,
        result: RawScanResult,
    },
    BatchScanResults(Vec<RawScanResult>),
    ScanFailed {
        error_code: i32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCallback {
    Gatt(GattCallback),
    Scan(ScanCallback),
}

impl From<GattCallback> for PlatformCallback {
    fn from(callback: GattCallback) -> Self {
        Self::Gatt(callback)
    }
}

impl From<ScanCallback> for PlatformCallback {
    fn from(callback: ScanCallback) -> Self {
        Self::Scan(callback)
    }
}
