//! Bridge between a host application runtime and a BLE GATT client.
//!
//! The host issues operations through [`BluetoothService`]; the platform
//! stack is plugged in as a [`BleTransport`] and its callbacks are fed to a
//! [`CallbackRouter`]. Results of asynchronous operations come back as
//! [`BridgeEvent`]s on the channel handed to the service.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::address::DeviceAddress;
pub use domain::codec::DecodedValue;
pub use domain::events::{BridgeEvent, EventMessage};
pub use domain::models::{Dispatch, ReadOptions, ScanFilter, ScanMode, ScanSettings, WriteRequest};
pub use domain::settings::{BridgeSettings, SettingsService};
pub use error::{BridgeError, Result};
pub use infrastructure::bluetooth::transport::{
    BleTransport, GattCallback, GattHandle, PlatformCallback, ScanCallback,
};
pub use infrastructure::bluetooth::{BluetoothService, CallbackRouter};
