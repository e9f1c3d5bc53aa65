#![allow(dead_code)]

use gatt_bridge::domain::address::{normalize, DeviceAddress};
use gatt_bridge::domain::gatt::{
    properties, AttributeId, AttributeTarget, CharacteristicPath, DescriptorPath, GattCharacteristic,
    GattDescriptor, GattService, WriteType,
};
use gatt_bridge::infrastructure::bluetooth::protocol::{parse_uuid, CCCD_UUID, GATT_SUCCESS};
use gatt_bridge::{
    BleTransport, BluetoothService, BridgeEvent, BridgeSettings, CallbackRouter, GattCallback,
    GattHandle, ScanFilter, ScanSettings,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const DEVICE: &str = "c0:ff:ee:00:00:01";
pub const HEART_RATE: &str = "180D";
pub const MEASUREMENT: &str = "2A37";
pub const CONTROL_POINT: &str = "2A39";
pub const CCCD: &str = "2902";

/// Platform request recorded by [`FakeTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect(DeviceAddress, bool),
    Disconnect(GattHandle),
    Close(GattHandle),
    Discover(GattHandle),
    Read(GattHandle, AttributeTarget),
    Write(GattHandle, AttributeTarget, Vec<u8>, WriteType),
    SetNotification(GattHandle, CharacteristicPath, bool),
    StartScan(Vec<ScanFilter>, ScanSettings),
    StopScan,
}

/// Transport that accepts (or refuses) every request and records it
pub struct FakeTransport {
    enabled: AtomicBool,
    accepting: AtomicBool,
    calls: Mutex<Vec<Call>>,
    link_up_router: Mutex<Option<CallbackRouter>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            accepting: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
            link_up_router: Mutex::new(None),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Report the link as up through `router`, from a platform thread,
    /// before `connect_gatt` returns
    pub fn link_up_during_connect(&self, router: CallbackRouter) {
        *self.link_up_router.lock() = Some(router);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, filter: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| filter(c)).count()
    }

    pub fn writes(&self) -> Vec<(AttributeTarget, Vec<u8>, WriteType)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Write(_, target, value, write_type) => {
                    Some((*target, value.clone(), *write_type))
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> bool {
        self.calls.lock().push(call);
        self.accepting.load(Ordering::SeqCst)
    }
}

impl BleTransport for FakeTransport {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn connect_gatt(&self, handle: GattHandle, address: &DeviceAddress, auto_connect: bool) -> bool {
        if !self.record(Call::Connect(address.clone(), auto_connect)) {
            return false;
        }

        let router = self.link_up_router.lock().clone();
        if let Some(router) = router {
            thread::spawn(move || {
                router.route(GattCallback::ConnectionStateChanged {
                    handle,
                    status: GATT_SUCCESS,
                    new_state: 2,
                });
            })
            .join()
            .unwrap();
        }
        true
    }

    fn disconnect(&self, handle: GattHandle) {
        self.record(Call::Disconnect(handle));
    }

    fn close(&self, handle: GattHandle) {
        self.record(Call::Close(handle));
    }

    fn discover_services(&self, handle: GattHandle) -> bool {
        self.record(Call::Discover(handle))
    }

    fn read(&self, handle: GattHandle, target: &AttributeTarget) -> bool {
        self.record(Call::Read(handle, *target))
    }

    fn write(
        &self,
        handle: GattHandle,
        target: &AttributeTarget,
        value: &[u8],
        write_type: WriteType,
    ) -> bool {
        self.record(Call::Write(handle, *target, value.to_vec(), write_type))
    }

    fn set_notification(&self, handle: GattHandle, path: &CharacteristicPath, enable: bool) -> bool {
        self.record(Call::SetNotification(handle, *path, enable))
    }

    fn start_scan(&self, filters: &[ScanFilter], settings: &ScanSettings) -> bool {
        self.record(Call::StartScan(filters.to_vec(), settings.clone()))
    }

    fn stop_scan(&self) {
        self.record(Call::StopScan);
    }
}

pub fn uuid(short: &str) -> Uuid {
    parse_uuid(short).unwrap()
}

/// Heart rate service: a notifying measurement characteristic with a CCCD
/// and a writable control point
pub fn heart_rate_services() -> Vec<GattService> {
    vec![GattService::new(uuid(HEART_RATE), 10)
        .with_characteristic(
            GattCharacteristic::new(
                uuid(MEASUREMENT),
                11,
                properties::READ | properties::NOTIFY,
            )
            .with_descriptor(GattDescriptor::new(CCCD_UUID, 0)),
        )
        .with_characteristic(GattCharacteristic::new(
            uuid(CONTROL_POINT),
            14,
            properties::WRITE,
        ))]
}

pub fn measurement_path() -> CharacteristicPath {
    CharacteristicPath {
        service: AttributeId::new(uuid(HEART_RATE), 10),
        characteristic: AttributeId::new(uuid(MEASUREMENT), 11),
    }
}

pub fn control_point_path() -> CharacteristicPath {
    CharacteristicPath {
        service: AttributeId::new(uuid(HEART_RATE), 10),
        characteristic: AttributeId::new(uuid(CONTROL_POINT), 14),
    }
}

pub fn cccd_path() -> DescriptorPath {
    DescriptorPath {
        characteristic: measurement_path(),
        descriptor: CCCD_UUID,
    }
}

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub service: BluetoothService,
    pub router: CallbackRouter,
    pub events: mpsc::UnboundedReceiver<BridgeEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(BridgeSettings::default())
    }

    pub fn with_settings(settings: BridgeSettings) -> Self {
        let transport = Arc::new(FakeTransport::new());
        let (sender, events) = mpsc::unbounded_channel();
        let service = BluetoothService::new(transport.clone(), &settings, sender);
        let router = service.router();
        Self {
            transport,
            service,
            router,
            events,
        }
    }

    pub fn drain(&mut self) -> Vec<BridgeEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub fn handle(&self) -> GattHandle {
        let address = normalize(DEVICE).unwrap();
        self.service.registry().get(&address).unwrap().lock().handle()
    }

    /// Connect and report the link as up
    pub fn connect(&mut self) -> GattHandle {
        self.service.connect_gatt(DEVICE, false).unwrap();
        let handle = self.handle();
        self.router.route(GattCallback::ConnectionStateChanged {
            handle,
            status: GATT_SUCCESS,
            new_state: 2,
        });
        self.drain();
        handle
    }

    /// Connect and complete a discovery of the heart rate service
    pub fn connect_discovered(&mut self) -> GattHandle {
        let handle = self.connect();
        self.service.discover_services(DEVICE, false).unwrap();
        self.router.route(GattCallback::ServicesDiscovered {
            handle,
            status: GATT_SUCCESS,
            services: heart_rate_services(),
        });
        self.drain();
        self.transport.clear();
        handle
    }
}
