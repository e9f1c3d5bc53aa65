use crate::domain::gatt::WriteType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Projection requested for a read or for notified changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOptions {
    #[serde(default = "default_true")]
    pub value_unsigned: bool,
    #[serde(default)]
    pub as_string: bool,
    #[serde(default)]
    pub offset: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            value_unsigned: true,
            as_string: false,
            offset: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Value and options of a characteristic or descriptor write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    /// Integer array (one element per byte) or a UTF-8 string
    pub value: Value,
    /// Split the value into writes of at most this many bytes
    #[serde(default)]
    pub chunk_size: Option<usize>,
    /// Overrides the characteristic's write type
    #[serde(default)]
    pub write_type: Option<WriteType>,
}

impl WriteRequest {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            chunk_size: None,
            write_type: None,
        }
    }

    pub fn bytes(bytes: &[u8]) -> Self {
        Self::new(Value::from(bytes.to_vec()))
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_write_type(mut self, write_type: WriteType) -> Self {
        self.write_type = Some(write_type);
        self
    }
}

/// Link state reported by connection-state callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Map the platform's profile state value; unknown values yield `None`
    pub fn from_raw(state: i32) -> Option<Self> {
        match state {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connecting),
            2 => Some(Self::Connected),
            3 => Some(Self::Disconnecting),
            _ => None,
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Disconnecting => 3,
        }
    }
}

/// Power/latency tradeoff of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanMode {
    LowPower,
    Balanced,
    #[default]
    LowLatency,
}

impl ScanMode {
    pub const ALL: [ScanMode; 3] = [Self::LowPower, Self::Balanced, Self::LowLatency];

    pub fn raw(self) -> i32 {
        match self {
            Self::LowPower => 0,
            Self::Balanced => 1,
            Self::LowLatency => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::LowPower => "LOW_POWER",
            Self::Balanced => "BALANCED",
            Self::LowLatency => "LOW_LATENCY",
        }
    }
}

/// Address/name filter of a scan. Empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFilter {
    #[serde(default)]
    pub device_address: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
}

impl ScanFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn by_address(address: impl Into<String>) -> Self {
        Self {
            device_address: Some(address.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSettings {
    /// Falls back to the configured default mode when absent
    #[serde(default)]
    pub scan_mode: Option<ScanMode>,
    /// Non-zero asks the platform to deliver results in batches
    #[serde(default)]
    pub report_delay_ms: u64,
    /// Signedness applied to advertisement payloads for the whole scan
    #[serde(default)]
    pub value_signed: bool,
}

/// How an accepted request was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Exactly one platform request was issued
    Submitted,
    /// Waiting behind the session's outstanding operation
    Queued,
    /// Resolved locally without a new platform round trip
    Completed,
}
