//! GATT Session Module
//!
//! One session per connected device. The session owns the platform handle,
//! the discovered service catalog and the notification options, and it is
//! the serialization point for GATT requests: at most one platform
//! operation is outstanding, the rest wait in a FIFO queue until the
//! completion callback of the outstanding one arrives.

use crate::domain::address::DeviceAddress;
use crate::domain::codec;
use crate::domain::events::{
    AttributeRef, AttributeValueEvent, AttributeWrittenEvent, BridgeEvent, ConnectionStateEvent,
    EventHeader, ServicesDiscoveredEvent,
};
use crate::domain::gatt::{
    properties, AttributeTarget, CharacteristicPath, DescriptorPath, GattService, OptionsKey,
    WriteType,
};
use crate::domain::models::{ConnectionState, Dispatch, ReadOptions};
use crate::domain::settings::BridgeSettings;
use crate::error::{BridgeError, GattOperation, RejectStage, Result};
use crate::infrastructure::bluetooth::catalog::ServiceCatalog;
use crate::infrastructure::bluetooth::protocol::{
    CccdValue, CCCD_UUID, GATT_FAILURE, GATT_SUCCESS, MAX_ATTRIBUTE_LENGTH,
};
use crate::infrastructure::bluetooth::transport::{BleTransport, GattHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Per-session behaviour taken from the bridge settings
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub auto_discover_services: bool,
    pub discover_use_cache: bool,
    pub write_cccd_on_notification: bool,
    pub max_pending_requests: usize,
    pub request_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
}

impl From<&BridgeSettings> for SessionConfig {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            auto_discover_services: settings.auto_discover_services,
            discover_use_cache: settings.discover_use_cache,
            write_cccd_on_notification: settings.write_cccd_on_notification,
            max_pending_requests: settings.max_pending_requests,
            request_timeout: settings.request_timeout(),
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&BridgeSettings::default())
    }
}

/// Link state of a session as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Closed,
}

/// A platform operation owned by the session queue
#[derive(Debug, Clone, PartialEq)]
enum GattRequest {
    Discover,
    /// Options travel with the read and are consumed by its completion
    Read {
        target: AttributeTarget,
        options: Option<ReadOptions>,
    },
    Write {
        target: AttributeTarget,
        value: Vec<u8>,
        write_type: WriteType,
        /// Chunks of one chunked write share an id
        write_id: u64,
        last_chunk: bool,
    },
}

impl GattRequest {
    fn operation(&self) -> GattOperation {
        match self {
            Self::Discover => GattOperation::DiscoverServices,
            Self::Read {
                target: AttributeTarget::Characteristic(_),
                ..
            } => GattOperation::ReadCharacteristic,
            Self::Read {
                target: AttributeTarget::Descriptor(_),
                ..
            } => GattOperation::ReadDescriptor,
            Self::Write {
                target: AttributeTarget::Characteristic(_),
                ..
            } => GattOperation::WriteCharacteristic,
            Self::Write {
                target: AttributeTarget::Descriptor(_),
                ..
            } => GattOperation::WriteDescriptor,
        }
    }
}

/// The submitted request; `id` tells a stale timeout from a live one
#[derive(Debug)]
struct InFlight {
    id: u64,
    request: GattRequest,
}

pub struct GattSession {
    address: DeviceAddress,
    handle: GattHandle,
    state: SessionState,
    catalog: ServiceCatalog,
    in_flight: Option<InFlight>,
    queue: VecDeque<GattRequest>,
    notification_options: HashMap<OptionsKey, ReadOptions>,
    notified: HashSet<CharacteristicPath>,
    next_write_id: u64,
    next_request_id: u64,
    transport: Arc<dyn BleTransport>,
    event_sender: mpsc::UnboundedSender<BridgeEvent>,
    config: SessionConfig,
    runtime: Option<Handle>,
    this: Weak<Mutex<GattSession>>,
    idle: Arc<Notify>,
}

impl GattSession {
    pub fn new(
        address: DeviceAddress,
        handle: GattHandle,
        transport: Arc<dyn BleTransport>,
        event_sender: mpsc::UnboundedSender<BridgeEvent>,
        config: SessionConfig,
    ) -> Self {
        Self {
            address,
            handle,
            state: SessionState::Connecting,
            catalog: ServiceCatalog::default(),
            in_flight: None,
            queue: VecDeque::new(),
            notification_options: HashMap::new(),
            notified: HashSet::new(),
            next_write_id: 0,
            next_request_id: 0,
            transport,
            event_sender,
            config,
            runtime: None,
            this: Weak::new(),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Runtime that drives request timeouts
    pub fn with_runtime(mut self, runtime: Option<Handle>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Give the session a handle on its own lock, for timers
    pub(crate) fn bind(&mut self, this: Weak<Mutex<GattSession>>) {
        self.this = this;
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn handle(&self) -> GattHandle {
        self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Options the next outstanding read of this attribute will apply
    pub fn read_options(&self, key: &OptionsKey) -> Option<&ReadOptions> {
        self.in_flight
            .iter()
            .map(|f| &f.request)
            .chain(self.queue.iter())
            .find_map(|request| match request {
                GattRequest::Read {
                    target,
                    options: Some(options),
                } if target.options_key() == *key => Some(options),
                _ => None,
            })
    }

    /// Options applied to every change of this attribute
    pub fn notification_options(&self, key: &OptionsKey) -> Option<&ReadOptions> {
        self.notification_options.get(key)
    }

    /// Characteristics with change delivery enabled
    pub fn notified_characteristics(&self) -> Vec<CharacteristicPath> {
        self.notified.iter().copied().collect()
    }

    /// Whether a platform operation is awaiting its completion callback
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    /// Notified whenever the session runs out of work
    pub fn idle_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.idle)
    }

    pub fn queued_requests(&self) -> usize {
        self.queue.len()
    }

    // ---------------------------------------------------------------------
    // Requests
    // ---------------------------------------------------------------------

    pub fn discover_services(&mut self, use_cache: bool) -> Result<Dispatch> {
        if use_cache && self.catalog.has_services() {
            debug!("{}: answering discovery from cached catalog", self.address);
            let event = self.discovered_event(GATT_SUCCESS, Vec::new());
            self.emit(event);
            return Ok(Dispatch::Completed);
        }

        self.enqueue(vec![GattRequest::Discover])
    }

    pub fn resolve_characteristic(
        &self,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<CharacteristicPath> {
        self.require_discovered()?;
        self.catalog
            .resolve_characteristic(service_uuid, characteristic_uuid)
    }

    pub fn resolve_descriptor(
        &self,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        descriptor_uuid: Uuid,
    ) -> Result<DescriptorPath> {
        self.require_discovered()?;
        self.catalog
            .resolve_descriptor(service_uuid, characteristic_uuid, descriptor_uuid)
    }

    /// Read a characteristic or descriptor. `options` only project the
    /// completion of this read.
    pub fn read(&mut self, target: AttributeTarget, options: Option<ReadOptions>) -> Result<Dispatch> {
        self.enqueue(vec![GattRequest::Read { target, options }])
    }

    /// Write a characteristic or descriptor, optionally split into chunks
    pub fn write(
        &mut self,
        target: AttributeTarget,
        value: Vec<u8>,
        chunk_size: Option<usize>,
        write_type: Option<WriteType>,
    ) -> Result<Dispatch> {
        let operation = match target {
            AttributeTarget::Characteristic(_) => GattOperation::WriteCharacteristic,
            AttributeTarget::Descriptor(_) => GattOperation::WriteDescriptor,
        };

        let chunk_size = match chunk_size {
            Some(0) => {
                return Err(BridgeError::ValueEncodingFailed(
                    "chunkSize can't be 0".to_string(),
                ))
            }
            Some(size) => size,
            None => value.len().max(1),
        };

        if chunk_size.min(value.len()) > MAX_ATTRIBUTE_LENGTH {
            return Err(BridgeError::rejected(operation, RejectStage::LocalBuffer));
        }

        let write_type = match target {
            AttributeTarget::Characteristic(path) => write_type
                .or_else(|| self.catalog.characteristic(&path).map(|c| c.write_type))
                .unwrap_or_default(),
            AttributeTarget::Descriptor(_) => WriteType::Default,
        };

        let write_id = self.next_write_id;
        self.next_write_id += 1;

        let chunks: Vec<&[u8]> = if value.is_empty() {
            vec![&value[..]]
        } else {
            value.chunks(chunk_size).collect()
        };
        let count = chunks.len();

        let requests = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| GattRequest::Write {
                target,
                value: chunk.to_vec(),
                write_type,
                write_id,
                last_chunk: i + 1 == count,
            })
            .collect();

        self.enqueue(requests)
    }

    /// Toggle change delivery for a characteristic.
    ///
    /// Nothing changes locally unless the platform accepts the toggle. When
    /// the CCCD write that follows is refused, the toggle is reverted and
    /// the previous options come back.
    pub fn set_notification(
        &mut self,
        path: CharacteristicPath,
        enable: bool,
        options: Option<ReadOptions>,
    ) -> Result<Dispatch> {
        if !self.transport.set_notification(self.handle, &path, enable) {
            warn!(
                "{}: platform refused to {} notifications for {}",
                self.address,
                if enable { "enable" } else { "disable" },
                path.characteristic.uuid
            );
            return Err(BridgeError::rejected(
                GattOperation::SetNotification,
                RejectStage::PlatformSubmit,
            ));
        }

        let key = AttributeTarget::from(path).options_key();
        let previous_options = self.notification_options.get(&key).copied();
        let was_notified = self.notified.contains(&path);

        if enable {
            if let Some(options) = options {
                self.notification_options.insert(key, options);
            }
            self.notified.insert(path);
        } else {
            self.notification_options.remove(&key);
            self.notified.remove(&path);
        }

        let Some(cccd) = self.cccd_value(&path, enable) else {
            return Ok(Dispatch::Completed);
        };

        let target = AttributeTarget::from(DescriptorPath {
            characteristic: path,
            descriptor: CCCD_UUID,
        });
        match self.write(target, cccd.as_bytes().to_vec(), None, None) {
            Ok(dispatch) => Ok(dispatch),
            Err(e) => {
                warn!(
                    "{}: CCCD write for {} failed, reverting toggle: {}",
                    self.address, path.characteristic.uuid, e
                );
                self.transport.set_notification(self.handle, &path, !enable);
                match previous_options {
                    Some(options) => self.notification_options.insert(key, options),
                    None => self.notification_options.remove(&key),
                };
                if was_notified {
                    self.notified.insert(path);
                } else {
                    self.notified.remove(&path);
                }

                Err(match e {
                    BridgeError::OperationRejected { stage, .. } => {
                        BridgeError::rejected(GattOperation::SetNotification, stage)
                    }
                    other => other,
                })
            }
        }
    }

    pub fn disconnect(&mut self) {
        info!("{}: disconnecting", self.address);
        self.state = SessionState::Disconnecting;
        self.transport.disconnect(self.handle);
    }

    /// Release the platform handle. Callbacks still in flight are dropped
    /// by the router once the session is closed.
    pub fn close(&mut self) {
        info!("{}: closing {}", self.address, self.handle);
        self.state = SessionState::Closed;
        self.in_flight = None;
        self.queue.clear();
        self.notification_options.clear();
        self.notified.clear();
        self.transport.close(self.handle);
        self.idle.notify_waiters();
    }

    // ---------------------------------------------------------------------
    // Callbacks
    // ---------------------------------------------------------------------

    pub fn on_connection_state(&mut self, status: i32, state: ConnectionState) -> BridgeEvent {
        info!(
            "{}: connection state {:?} (status {})",
            self.address, state, status
        );

        match state {
            ConnectionState::Connected if status == GATT_SUCCESS => {
                self.state = SessionState::Connected;
            }
            ConnectionState::Connecting => self.state = SessionState::Connecting,
            ConnectionState::Disconnecting => self.state = SessionState::Disconnecting,
            ConnectionState::Connected | ConnectionState::Disconnected => {
                self.state = SessionState::Disconnected;
                let dropped = self.queue.len() + usize::from(self.in_flight.is_some());
                if dropped > 0 {
                    debug!("{}: flushing {} GATT requests", self.address, dropped);
                }
                self.in_flight = None;
                self.queue.clear();
                self.notification_options.clear();
                self.notified.clear();
                self.catalog.reset();
                self.signal_if_idle();
            }
        }

        BridgeEvent::ConnectionState(ConnectionStateEvent {
            header: self.header(status),
            state,
        })
    }

    /// Kick off discovery after the link came up, when configured to
    pub fn auto_discover(&mut self) {
        if !self.config.auto_discover_services || self.state != SessionState::Connected {
            return;
        }

        if let Err(e) = self.discover_services(self.config.discover_use_cache) {
            warn!("{}: automatic service discovery failed: {}", self.address, e);
        }
    }

    pub fn on_services_discovered(&mut self, status: i32, services: Vec<GattService>) -> BridgeEvent {
        self.take_in_flight(|r| matches!(r, GattRequest::Discover));

        if status == GATT_SUCCESS {
            info!("{}: {} services discovered", self.address, services.len());
            self.catalog.replace(services);
            self.discovered_event(status, Vec::new())
        } else {
            warn!("{}: service discovery failed with status {}", self.address, status);
            self.discovered_event(status, services)
        }
    }

    pub fn on_read(&mut self, status: i32, target: AttributeTarget, value: &[u8]) -> BridgeEvent {
        let options = match self
            .take_in_flight(|r| matches!(r, GattRequest::Read { target: t, .. } if *t == target))
        {
            Some(GattRequest::Read {
                options: Some(options),
                ..
            }) => options,
            _ => ReadOptions::default(),
        };

        let value = if status == GATT_SUCCESS {
            trace!("{}: read {:02X?}", self.address, value);
            self.catalog.buffer(&target, value);
            Some(codec::decode(value, &options))
        } else {
            None
        };

        self.value_event(target, status, value, false)
    }

    pub fn on_changed(&mut self, target: AttributeTarget, value: &[u8]) -> BridgeEvent {
        trace!("{}: changed {:02X?}", self.address, value);

        let options = self
            .notification_options
            .get(&target.options_key())
            .copied()
            .unwrap_or_default();

        self.catalog.buffer(&target, value);
        let value = codec::decode(value, &options);
        self.value_event(target, GATT_SUCCESS, Some(value), true)
    }

    pub fn on_write(&mut self, status: i32, target: AttributeTarget) -> BridgeEvent {
        let completed = match self.take_in_flight(
            |r| matches!(r, GattRequest::Write { target: t, .. } if *t == target),
        ) {
            Some(GattRequest::Write {
                write_id,
                last_chunk,
                ..
            }) => {
                if status != GATT_SUCCESS && !last_chunk {
                    self.drop_chunks(write_id);
                    true
                } else {
                    last_chunk
                }
            }
            _ => true,
        };

        self.written_event(target, status, completed)
    }

    /// Submit queued requests until one is accepted or the queue is empty
    pub fn advance(&mut self) {
        if self.in_flight.is_some() || self.is_closed() {
            return;
        }

        while let Some(next) = self.queue.pop_front() {
            match self.submit(next.clone()) {
                Ok(()) => return,
                Err(e) => {
                    warn!("{}: queued request failed: {}", self.address, e);
                    self.fail_deferred(next);
                }
            }
        }
        self.signal_if_idle();
    }

    /// Give up on request `id` if it is still the one in flight. The
    /// operation's event is reported as a failure and the queue moves on;
    /// a completion arriving afterwards no longer matches anything.
    pub fn on_timeout(&mut self, id: u64) {
        if self.is_closed() || !self.in_flight.as_ref().is_some_and(|f| f.id == id) {
            return;
        }

        if let Some(InFlight { request, .. }) = self.in_flight.take() {
            warn!(
                "{}: {} timed out waiting for the platform",
                self.address,
                request.operation()
            );
            self.fail_deferred(request);
        }
        self.advance();
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn require_discovered(&self) -> Result<()> {
        if self.catalog.is_discovered() {
            Ok(())
        } else {
            Err(BridgeError::ServicesNotDiscovered(self.address.clone()))
        }
    }

    fn enqueue(&mut self, requests: Vec<GattRequest>) -> Result<Dispatch> {
        let Some(first) = requests.first() else {
            return Ok(Dispatch::Completed);
        };

        let idle = self.in_flight.is_none();
        let waiting = requests.len() - usize::from(idle);
        if self.queue.len() + waiting > self.config.max_pending_requests {
            warn!(
                "{}: request queue full ({} waiting)",
                self.address,
                self.queue.len()
            );
            return Err(BridgeError::rejected(first.operation(), RejectStage::Busy));
        }

        if !idle {
            debug!("{}: queueing {} request(s)", self.address, requests.len());
            self.queue.extend(requests);
            return Ok(Dispatch::Queued);
        }

        let mut requests = requests.into_iter();
        if let Some(first) = requests.next() {
            self.submit(first)?;
        }
        self.queue.extend(requests);
        Ok(Dispatch::Submitted)
    }

    fn submit(&mut self, request: GattRequest) -> Result<()> {
        let operation = request.operation();

        let accepted = match &request {
            GattRequest::Discover => self.transport.discover_services(self.handle),
            GattRequest::Read { target, .. } => self.transport.read(self.handle, target),
            GattRequest::Write {
                target,
                value,
                write_type,
                ..
            } => {
                if !self.catalog.buffer(target, value) {
                    return Err(BridgeError::rejected(operation, RejectStage::LocalBuffer));
                }
                self.transport.write(self.handle, target, value, *write_type)
            }
        };

        if !accepted {
            return Err(BridgeError::rejected(operation, RejectStage::PlatformSubmit));
        }

        let id = self.next_request_id;
        self.next_request_id += 1;
        debug!("{}: {} submitted (#{})", self.address, operation, id);
        self.in_flight = Some(InFlight { id, request });
        self.arm_timeout(id);
        Ok(())
    }

    fn arm_timeout(&self, id: u64) {
        let (Some(timeout), Some(runtime)) = (self.config.request_timeout, &self.runtime) else {
            return;
        };

        let session = Weak::clone(&self.this);
        runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(session) = session.upgrade() {
                session.lock().on_timeout(id);
            }
        });
    }

    fn take_in_flight(&mut self, matches: impl Fn(&GattRequest) -> bool) -> Option<GattRequest> {
        if self.in_flight.as_ref().is_some_and(|f| matches(&f.request)) {
            self.in_flight.take().map(|f| f.request)
        } else {
            None
        }
    }

    fn signal_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }

    fn cccd_value(&self, path: &CharacteristicPath, enable: bool) -> Option<CccdValue> {
        let characteristic = self.catalog.characteristic(path)?;
        if !self.config.write_cccd_on_notification || characteristic.descriptor(&CCCD_UUID).is_none() {
            return None;
        }

        Some(if !enable {
            CccdValue::Disable
        } else if !characteristic.has_property(properties::NOTIFY)
            && characteristic.has_property(properties::INDICATE)
        {
            CccdValue::EnableIndication
        } else {
            CccdValue::EnableNotification
        })
    }

    fn drop_chunks(&mut self, write_id: u64) {
        self.queue.retain(|r| {
            !matches!(r, GattRequest::Write { write_id: id, .. } if *id == write_id)
        });
    }

    // Report a queued request the platform refused, as its own event kind
    fn fail_deferred(&mut self, request: GattRequest) {
        let event = match request {
            GattRequest::Discover => self.discovered_event(GATT_FAILURE, Vec::new()),
            GattRequest::Read { target, .. } => self.value_event(target, GATT_FAILURE, None, false),
            GattRequest::Write {
                target, write_id, ..
            } => {
                self.drop_chunks(write_id);
                self.written_event(target, GATT_FAILURE, true)
            }
        };
        self.emit(event);
    }

    fn header(&self, status: i32) -> EventHeader {
        EventHeader::new(self.address.clone(), status)
    }

    fn discovered_event(&self, status: i32, fallback: Vec<GattService>) -> BridgeEvent {
        let services = match self.catalog.services() {
            Some(services) if status == GATT_SUCCESS => services.to_vec(),
            _ => fallback,
        };

        BridgeEvent::ServicesDiscovered(ServicesDiscoveredEvent {
            header: self.header(status),
            services,
        })
    }

    fn value_event(
        &self,
        target: AttributeTarget,
        status: i32,
        value: Option<codec::DecodedValue>,
        changed: bool,
    ) -> BridgeEvent {
        let event = AttributeValueEvent {
            header: self.header(status),
            attribute: AttributeRef::from(&target),
            value,
        };

        match target {
            AttributeTarget::Characteristic(_) if changed => BridgeEvent::CharacteristicChanged(event),
            AttributeTarget::Characteristic(_) => BridgeEvent::CharacteristicRead(event),
            AttributeTarget::Descriptor(_) => BridgeEvent::DescriptorRead(event),
        }
    }

    fn written_event(&self, target: AttributeTarget, status: i32, completed: bool) -> BridgeEvent {
        let event = AttributeWrittenEvent {
            header: self.header(status),
            attribute: AttributeRef::from(&target),
            completed,
        };

        match target {
            AttributeTarget::Characteristic(_) => BridgeEvent::CharacteristicWritten(event),
            AttributeTarget::Descriptor(_) => BridgeEvent::DescriptorWritten(event),
        }
    }

    fn emit(&self, event: BridgeEvent) {
        let _ = self.event_sender.send(event);
    }
}

impl std::fmt::Debug for GattSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GattSession")
            .field("address", &self.address)
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight)
            .field("queued", &self.queue.len())
            .finish()
    }
}
