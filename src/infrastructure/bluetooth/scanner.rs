//! BLE Scanner Module
//!
//! Handles the process-wide device discovery session and projects scan
//! results into events.

use crate::domain::address;
use crate::domain::codec;
use crate::domain::events::{BridgeEvent, ScanFailedEvent, ScanRecord, ScanResultEvent, ScannedDevice};
use crate::domain::models::{ReadOptions, ScanFilter, ScanMode, ScanSettings};
use crate::error::{BridgeError, GattOperation, RejectStage, Result};
use crate::infrastructure::bluetooth::protocol::GATT_SUCCESS;
use crate::infrastructure::bluetooth::transport::{BleTransport, RawScanResult, ScanCallback};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration of the running scan
#[derive(Debug, Clone)]
struct ScanSession {
    filters: Vec<ScanFilter>,
    settings: ScanSettings,
}

impl ScanSession {
    fn advertisement_options(&self) -> ReadOptions {
        ReadOptions {
            value_unsigned: !self.settings.value_signed,
            ..Default::default()
        }
    }
}

/// Coordinator of the single scan the platform runs on behalf of the bridge
pub struct ScanCoordinator {
    transport: Arc<dyn BleTransport>,
    active: Mutex<Option<ScanSession>>,
    default_scan_mode: ScanMode,
}

impl ScanCoordinator {
    pub fn new(transport: Arc<dyn BleTransport>, default_scan_mode: ScanMode) -> Self {
        Self {
            transport,
            active: Mutex::new(None),
            default_scan_mode,
        }
    }

    /// Start scanning for BLE devices
    ///
    /// # Arguments
    /// * `filters` - Address/name filters; an empty list reports every device
    /// * `settings` - Scan mode, batching delay and advertisement signedness
    pub fn start(&self, filters: Vec<ScanFilter>, mut settings: ScanSettings) -> Result<()> {
        if !self.transport.is_enabled() {
            return Err(BridgeError::AdapterDisabled);
        }

        let mut active = self.active.lock();
        if active.is_some() {
            warn!("Scan already started");
            return Err(BridgeError::rejected(GattOperation::StartScan, RejectStage::Busy));
        }

        let filters = filters
            .into_iter()
            .map(|mut filter| -> Result<ScanFilter> {
                if let Some(raw) = filter.device_address.take() {
                    filter.device_address = Some(address::normalize(&raw)?.to_string());
                }
                Ok(filter)
            })
            .collect::<Result<Vec<_>>>()?;

        let mode = *settings.scan_mode.get_or_insert(self.default_scan_mode);
        info!(
            "Starting BLE scan ({} filters, mode {}, report delay {} ms)",
            filters.len(),
            mode.name(),
            settings.report_delay_ms
        );

        if !self.transport.start_scan(&filters, &settings) {
            warn!("Platform refused to start scan");
            return Err(BridgeError::rejected(
                GattOperation::StartScan,
                RejectStage::PlatformSubmit,
            ));
        }

        *active = Some(ScanSession { filters, settings });
        Ok(())
    }

    /// Stop scanning; a no-op when no scan is running
    pub fn stop(&self) -> Result<()> {
        if !self.transport.is_enabled() {
            return Err(BridgeError::AdapterDisabled);
        }

        if let Some(session) = self.active.lock().take() {
            info!("Stopping BLE scan ({} filters)", session.filters.len());
            self.transport.stop_scan();
        }
        Ok(())
    }

    /// Check if currently scanning
    pub fn is_scanning(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Project a scanner callback into its event. Results that arrive after
    /// the scan was stopped are dropped.
    pub fn on_callback(&self, callback: ScanCallback) -> Option<BridgeEvent> {
        match callback {
            ScanCallback::ScanFailed { error_code } => {
                warn!("Scan failed with error code {}", error_code);
                self.active.lock().take();
                Some(BridgeEvent::ScanFailed(ScanFailedEvent {
                    status: error_code,
                    error: true,
                    error_code,
                }))
            }
            ScanCallback::ScanResult {
                callback_type,
                result,
            } => {
                let options = self.current_options()?;
                let record = project(result, &options)?;
                Some(BridgeEvent::ScanResult(ScanResultEvent {
                    status: GATT_SUCCESS,
                    error: false,
                    callback_type: Some(callback_type),
                    results: vec![record],
                }))
            }
            ScanCallback::BatchScanResults(results) => {
                let options = self.current_options()?;
                let results = results
                    .into_iter()
                    .filter_map(|result| project(result, &options))
                    .collect();
                Some(BridgeEvent::BatchScanResults(ScanResultEvent {
                    status: GATT_SUCCESS,
                    error: false,
                    callback_type: None,
                    results,
                }))
            }
        }
    }

    fn current_options(&self) -> Option<ReadOptions> {
        let options = self
            .active
            .lock()
            .as_ref()
            .map(ScanSession::advertisement_options);
        if options.is_none() {
            debug!("Dropping scan result delivered after the scan stopped");
        }
        options
    }
}

impl Drop for ScanCoordinator {
    fn drop(&mut self) {
        if self.active.get_mut().take().is_some() {
            self.transport.stop_scan();
        }
    }
}

fn project(result: RawScanResult, options: &ReadOptions) -> Option<ScanRecord> {
    let id = match address::normalize(&result.address) {
        Ok(id) => id,
        Err(e) => {
            warn!("Ignoring scan result: {}", e);
            return None;
        }
    };

    Some(ScanRecord {
        device: ScannedDevice {
            id,
            name: result.name.filter(|name| !name.is_empty()),
        },
        rssi: result.rssi,
        advertisement: codec::decode(&result.scan_record, options),
    })
}
