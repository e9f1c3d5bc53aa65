//! Bluetooth Module
//!
//! GATT client and scanner core of the bridge.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │       (inbound operations issued by the host)            │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌──────────────┐ ┌──────────────┐ ┌──────────┐
//! │    Scan      │ │   Session    │ │ Protocol │
//! │ Coordinator  │ │   Registry   │ │          │
//! │              │ │      │       │ │ - UUIDs  │
//! │ - filters    │ │      ▼       │ │ - status │
//! │ - projection │ │ GattSession  │ │ - events │
//! └──────▲───────┘ └──────▲───────┘ └──────────┘
//!        │                │
//!        └───────┬────────┘
//!                │
//!        ┌───────┴────────┐
//!        │ CallbackRouter │ ◄── PlatformCallback (BleTransport)
//!        └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Platform BLE stack boundary and its callbacks
//! - [`protocol`] - UUID parsing, status codes and the event-name catalog
//! - [`catalog`] - Discovered services of one session
//! - [`connection`] - Per-device GATT session and request queue
//! - [`registry`] - Address to session map
//! - [`router`] - Callback routing into sessions and the scanner
//! - [`scanner`] - BLE device discovery
//! - [`service`] - Main service facade

pub mod catalog;
pub mod connection;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod scanner;
pub mod service;
pub mod transport;

pub use router::CallbackRouter;
pub use service::BluetoothService;
