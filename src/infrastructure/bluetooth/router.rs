//! Callback router
//!
//! Every platform callback goes through [`CallbackRouter::route`]. GATT
//! callbacks are resolved to their session through the connection handle and
//! to their attribute through the callback's own back-references; there is no
//! separate bookkeeping of which request a callback answers.

use crate::domain::events::BridgeEvent;
use crate::domain::gatt::AttributeTarget;
use crate::domain::models::ConnectionState;
use crate::infrastructure::bluetooth::connection::GattSession;
use crate::infrastructure::bluetooth::registry::SessionRegistry;
use crate::infrastructure::bluetooth::scanner::ScanCoordinator;
use crate::infrastructure::bluetooth::transport::{GattCallback, PlatformCallback};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CallbackRouter {
    registry: Arc<SessionRegistry>,
    scanner: Arc<ScanCoordinator>,
    event_sender: mpsc::UnboundedSender<BridgeEvent>,
}

impl CallbackRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        scanner: Arc<ScanCoordinator>,
        event_sender: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            registry,
            scanner,
            event_sender,
        }
    }

    /// Route one callback, emitting at most one event for it
    pub fn route(&self, callback: impl Into<PlatformCallback>) {
        match callback.into() {
            PlatformCallback::Gatt(callback) => self.route_gatt(callback),
            PlatformCallback::Scan(callback) => {
                if let Some(event) = self.scanner.on_callback(callback) {
                    self.emit(event);
                }
            }
        }
    }

    /// Consume callbacks until every sender is gone
    pub async fn run(self, mut callbacks: mpsc::UnboundedReceiver<PlatformCallback>) {
        info!("Callback router started");
        while let Some(callback) = callbacks.recv().await {
            self.route(callback);
        }
        info!("Callback router stopped");
    }

    fn route_gatt(&self, callback: GattCallback) {
        let handle = callback.handle();

        let Some(shared) = self.registry.session_for_handle(handle) else {
            debug!("Dropping callback for unregistered {}", handle);
            return;
        };

        let mut session = shared.lock();
        if session.is_closed() || session.handle() != handle {
            debug!("Dropping callback for closed {}", handle);
            return;
        }

        match callback {
            GattCallback::ConnectionStateChanged {
                status, new_state, ..
            } => {
                let Some(state) = ConnectionState::from_raw(new_state) else {
                    warn!(
                        "{}: ignoring unknown connection state {}",
                        session.address(),
                        new_state
                    );
                    return;
                };
                let event = session.on_connection_state(status, state);
                self.emit(event);
                session.auto_discover();
            }
            GattCallback::ServicesDiscovered {
                status, services, ..
            } => {
                let event = session.on_services_discovered(status, services);
                self.complete(&mut session, event);
            }
            GattCallback::CharacteristicRead {
                status,
                path,
                value,
                ..
            } => {
                let event = session.on_read(status, AttributeTarget::Characteristic(path), &value);
                self.complete(&mut session, event);
            }
            GattCallback::DescriptorRead {
                status,
                path,
                value,
                ..
            } => {
                let event = session.on_read(status, AttributeTarget::Descriptor(path), &value);
                self.complete(&mut session, event);
            }
            GattCallback::CharacteristicWrite { status, path, .. } => {
                let event = session.on_write(status, AttributeTarget::Characteristic(path));
                self.complete(&mut session, event);
            }
            GattCallback::DescriptorWrite { status, path, .. } => {
                let event = session.on_write(status, AttributeTarget::Descriptor(path));
                self.complete(&mut session, event);
            }
            GattCallback::CharacteristicChanged { path, value, .. } => {
                let event = session.on_changed(AttributeTarget::Characteristic(path), &value);
                self.emit(event);
            }
        }
    }

    // Completion events go out before the next queued request is submitted
    fn complete(&self, session: &mut GattSession, event: BridgeEvent) {
        self.emit(event);
        session.advance();
    }

    fn emit(&self, event: BridgeEvent) {
        let _ = self.event_sender.send(event);
    }
}
