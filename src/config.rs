//! Connection configuration.
//!
//! Everything the device needs to reach its network and broker: WiFi
//! credentials, MQTT broker address, and an optional explicit device ID.
//! Persisted as one postcard blob in NVS, written on provisioning save
//! and erased on factory reset.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Persisted connection configuration.
///
/// An empty string means "not configured" — the provisioning portal is the
/// only writer, and it rejects saves with required fields missing, so a
/// loaded config is either complete or never saved at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// WiFi station SSID.
    pub wifi_ssid: String,
    /// WiFi station passphrase (empty for open networks).
    pub wifi_pass: String,
    /// MQTT broker hostname or IP.
    pub mqtt_host: String,
    /// MQTT broker port.
    pub mqtt_port: u16,
    /// Explicit device ID; when empty the MAC-derived ID is used.
    pub device_id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: String::new(),
            mqtt_port: DEFAULT_MQTT_PORT,
            device_id: String::new(),
        }
    }
}

impl DeviceConfig {
    /// Minimum configuration required to enter run mode: WiFi credentials
    /// and a broker host. Everything else has a usable default.
    pub fn has_minimum(&self) -> bool {
        !self.wifi_ssid.is_empty() && !self.mqtt_host.is_empty()
    }
}

/// Field-level validation applied before a provisioning save is persisted.
///
/// Returns the name of the first offending field so the portal can report
/// it in the 422 response body.
pub fn validate(cfg: &DeviceConfig) -> Result<(), &'static str> {
    if cfg.wifi_ssid.is_empty() || cfg.wifi_ssid.len() > 32 {
        return Err("wifi_ssid");
    }
    if !cfg.wifi_pass.is_empty() && (cfg.wifi_pass.len() < 8 || cfg.wifi_pass.len() > 64) {
        return Err("wifi_pass");
    }
    if cfg.mqtt_host.is_empty() || cfg.mqtt_host.len() > 128 {
        return Err("mqtt_host");
    }
    if cfg.mqtt_port == 0 {
        return Err("mqtt_port");
    }
    if cfg.device_id.is_empty() || cfg.device_id.len() > 48 {
        return Err("device_id");
    }
    Ok(())
}
