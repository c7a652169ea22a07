//! Client configuration.
//!
//! Configuration is plain serde data so it can come from a JSON file on
//! Linux or be built in code on constrained targets. Every field has a
//! default, so an empty document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration source could not be read.
    Read(String),
    /// The configuration data is invalid.
    InvalidData(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read(msg) => write!(f, "Read error: {}", msg),
            ConfigError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Transport binding advertised in "Supported Binding and Modes".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BindingMode {
    #[default]
    #[serde(rename = "U")]
    Udp,
    #[serde(rename = "T")]
    Tcp,
}

impl BindingMode {
    /// Single-letter wire form ("U" or "T").
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingMode::Udp => "U",
            BindingMode::Tcp => "T",
        }
    }

    /// Decode the stored letter. Anything other than "U"/"u" reads as TCP.
    pub fn from_letter(letter: &str) -> Self {
        if letter.eq_ignore_ascii_case("U") {
            BindingMode::Udp
        } else {
            BindingMode::Tcp
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Endpoint client name used at registration.
    pub endpoint: String,

    pub device: DeviceInfo,

    pub time: TimeSettings,

    /// Periodic Current Time notification. Disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time_notifier: Option<NotifierSettings>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "lwm2m-client".to_string(),
            device: DeviceInfo::default(),
            time: TimeSettings::default(),
            current_time_notifier: None,
        }
    }
}

impl ClientConfig {
    /// Parse configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidData(e.to_string()))
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

/// Static identity of the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model_number: String,
    pub serial_number: String,
    pub binding: BindingMode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,

    /// Total memory in KB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_total: Option<i64>,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            manufacturer: "Unknown".to_string(),
            model_number: "Unknown".to_string(),
            serial_number: "0".to_string(),
            binding: BindingMode::Udp,
            firmware_version: None,
            hardware_version: None,
            software_version: None,
            device_type: None,
            memory_total: None,
        }
    }
}

/// Time zone settings of the Device object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeSettings {
    /// IANA time zone name. The host's zone (`TZ`, then `/etc/timezone`)
    /// when absent, "UTC" if neither names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// UTC offset ("+02:00"). The host's local offset when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<String>,
}

impl Default for TimeSettings {
    fn default() -> Self {
        Self {
            timezone: None,
            utc_offset: None,
        }
    }
}

/// Timing of a periodic notifier, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierSettings {
    pub delay_ms: u64,
    pub period_ms: u64,
}

impl NotifierSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}
