//! Bluetooth Service Module
//!
//! Main service exposing the inbound bridge operations. Every operation
//! normalizes the device address before it looks at any session state.

use crate::domain::address::{self, DeviceAddress};
use crate::domain::codec;
use crate::domain::events::BridgeEvent;
use crate::domain::gatt::AttributeTarget;
use crate::domain::models::{Dispatch, ReadOptions, ScanFilter, ScanSettings, WriteRequest};
use crate::domain::settings::BridgeSettings;
use crate::error::{BridgeError, GattOperation, RejectStage, Result};
use crate::infrastructure::bluetooth::connection::{GattSession, SessionConfig, SessionState};
use crate::infrastructure::bluetooth::protocol::{self, parse_uuid};
use crate::infrastructure::bluetooth::registry::{SessionRegistry, SharedSession};
use crate::infrastructure::bluetooth::router::CallbackRouter;
use crate::infrastructure::bluetooth::scanner::ScanCoordinator;
use crate::infrastructure::bluetooth::transport::BleTransport;
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// Main Bluetooth service coordinating all BLE operations
pub struct BluetoothService {
    transport: Arc<dyn BleTransport>,
    registry: Arc<SessionRegistry>,
    scanner: Arc<ScanCoordinator>,
    event_sender: mpsc::UnboundedSender<BridgeEvent>,
    config: SessionConfig,
    runtime: Option<Handle>,
}

impl BluetoothService {
    /// Create a new Bluetooth service
    ///
    /// Events produced by the service and by its [`CallbackRouter`] are
    /// delivered through `event_sender`. Request timeouts run on the tokio
    /// runtime current at construction, if any.
    pub fn new(
        transport: Arc<dyn BleTransport>,
        settings: &BridgeSettings,
        event_sender: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            scanner: Arc::new(ScanCoordinator::new(
                Arc::clone(&transport),
                settings.default_scan_mode,
            )),
            registry: Arc::new(SessionRegistry::new()),
            transport,
            event_sender,
            config: SessionConfig::from(settings),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Run request timeouts on `runtime` instead
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Router that feeds platform callbacks into this service's sessions
    pub fn router(&self) -> CallbackRouter {
        CallbackRouter::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.scanner),
            self.event_sender.clone(),
        )
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn is_valid(&self, address: &str) -> bool {
        address::is_valid(address)
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_enabled()
    }

    /// Scan-mode enumeration and event-name catalog for the host
    pub fn constants(&self) -> Value {
        protocol::exported_constants()
    }

    pub fn start_scan(&self, filters: Vec<ScanFilter>, settings: ScanSettings) -> Result<()> {
        self.scanner.start(filters, settings)
    }

    pub fn stop_scan(&self) -> Result<()> {
        self.scanner.stop()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Connect to a device. A second call for a registered address succeeds
    /// without issuing another platform request.
    pub fn connect_gatt(&self, address: &str, auto_connect: bool) -> Result<()> {
        let address = address::normalize(address)?;
        if !self.transport.is_enabled() {
            return Err(BridgeError::AdapterDisabled);
        }

        let Some(shared) = self.registry.get_or_create(address.clone(), |address, handle| {
            GattSession::new(
                address.clone(),
                handle,
                Arc::clone(&self.transport),
                self.event_sender.clone(),
                self.config,
            )
            .with_runtime(self.runtime.clone())
        }) else {
            debug!("{}: session already registered", address);
            return Ok(());
        };

        let handle = shared.lock().handle();
        info!("{}: connecting on {} (autoConnect={})", address, handle, auto_connect);
        if !self.transport.connect_gatt(handle, &address, auto_connect) {
            warn!("{}: platform refused to connect", address);
            self.registry.discard(&address, handle);
            return Err(BridgeError::rejected(
                GattOperation::Connect,
                RejectStage::PlatformSubmit,
            ));
        }

        // closed by another caller while the platform call was running
        if shared.lock().is_closed() {
            self.transport.close(handle);
        }
        Ok(())
    }

    pub fn discover_services(&self, address: &str, use_cache: bool) -> Result<Dispatch> {
        self.with_session(address, |session| session.discover_services(use_cache))
    }

    pub fn read_characteristic(
        &self,
        address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        options: Option<ReadOptions>,
    ) -> Result<Dispatch> {
        self.with_session(address, |session| {
            let path = session
                .resolve_characteristic(parse_uuid(service_uuid)?, parse_uuid(characteristic_uuid)?)?;
            session.read(AttributeTarget::from(path), options)
        })
    }

    pub fn read_descriptor(
        &self,
        address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        descriptor_uuid: &str,
        options: Option<ReadOptions>,
    ) -> Result<Dispatch> {
        self.with_session(address, |session| {
            let path = session.resolve_descriptor(
                parse_uuid(service_uuid)?,
                parse_uuid(characteristic_uuid)?,
                parse_uuid(descriptor_uuid)?,
            )?;
            session.read(AttributeTarget::from(path), options)
        })
    }

    pub fn write_characteristic(
        &self,
        address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        request: WriteRequest,
    ) -> Result<Dispatch> {
        self.with_session(address, |session| {
            let path = session
                .resolve_characteristic(parse_uuid(service_uuid)?, parse_uuid(characteristic_uuid)?)?;
            let value = codec::encode_json(&request.value)?;
            session.write(
                AttributeTarget::from(path),
                value,
                request.chunk_size,
                request.write_type,
            )
        })
    }

    pub fn write_descriptor(
        &self,
        address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        descriptor_uuid: &str,
        request: WriteRequest,
    ) -> Result<Dispatch> {
        self.with_session(address, |session| {
            let path = session.resolve_descriptor(
                parse_uuid(service_uuid)?,
                parse_uuid(characteristic_uuid)?,
                parse_uuid(descriptor_uuid)?,
            )?;
            let value = codec::encode_json(&request.value)?;
            session.write(AttributeTarget::from(path), value, request.chunk_size, None)
        })
    }

    /// Enable or disable change delivery. `options` project every change
    /// until notifications are disabled again.
    pub fn set_characteristic_notification(
        &self,
        address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        enable: bool,
        options: Option<ReadOptions>,
    ) -> Result<Dispatch> {
        self.with_session(address, |session| {
            let path = session
                .resolve_characteristic(parse_uuid(service_uuid)?, parse_uuid(characteristic_uuid)?)?;
            session.set_notification(path, enable, options)
        })
    }

    /// Drop the link but keep the session registered until `close_gatt`
    pub fn disconnect(&self, address: &str) -> Result<()> {
        self.with_session(address, |session| {
            session.disconnect();
            Ok(())
        })
    }

    /// Release the platform handle and forget the session
    pub fn close_gatt(&self, address: &str) -> Result<()> {
        let address = address::normalize(address)?;
        let session = self
            .registry
            .remove(&address)
            .ok_or_else(|| BridgeError::SessionNotFound(address.clone()))?;
        session.lock().close();
        Ok(())
    }

    /// Orderly teardown of one device.
    ///
    /// Disables change delivery for every notified characteristic, waits up
    /// to the configured shutdown timeout for outstanding requests (the
    /// CCCD writes included) to finish, then disconnects and closes.
    pub async fn shutdown(&self, address: &str) -> Result<()> {
        let address = address::normalize(address)?;
        let shared = self.session(&address)?;

        let idle = {
            let mut session = shared.lock();
            if session.is_closed() {
                return Err(BridgeError::SessionNotFound(address));
            }
            info!("{}: shutting down", address);
            for path in session.notified_characteristics() {
                if let Err(e) = session.set_notification(path, false, None) {
                    warn!(
                        "{}: could not disable notifications for {}: {}",
                        address, path.characteristic.uuid, e
                    );
                }
            }
            session.idle_signal()
        };

        let timeout = self.config.shutdown_timeout;
        if tokio::time::timeout(timeout, wait_idle(&shared, &idle))
            .await
            .is_err()
        {
            warn!(
                "{}: requests still pending after {:?}, closing anyway",
                address, timeout
            );
        }

        {
            let mut session = shared.lock();
            if matches!(
                session.state(),
                SessionState::Connected | SessionState::Connecting
            ) {
                session.disconnect();
            }
        }

        match self.close_gatt(address.as_str()) {
            Err(BridgeError::SessionNotFound(_)) => {
                debug!("{}: session closed during shutdown", address);
                Ok(())
            }
            other => other,
        }
    }

    fn with_session<T>(
        &self,
        address: &str,
        operation: impl FnOnce(&mut GattSession) -> Result<T>,
    ) -> Result<T> {
        let address = address::normalize(address)?;
        let shared = self.session(&address)?;
        let mut session = shared.lock();
        if session.is_closed() {
            return Err(BridgeError::SessionNotFound(address));
        }
        operation(&mut session)
    }

    fn session(&self, address: &DeviceAddress) -> Result<SharedSession> {
        self.registry
            .get(address)
            .ok_or_else(|| BridgeError::SessionNotFound(address.clone()))
    }
}

async fn wait_idle(session: &SharedSession, idle: &Notify) {
    loop {
        let notified = idle.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        {
            let session = session.lock();
            if session.is_idle() || session.is_closed() {
                return;
            }
        }
        notified.await;
    }
}
