//! Device identity derived from the ESP32 factory MAC address.
//!
//! Produces a stable device ID in the form `dev-XXYYZZ` (last 3 bytes of
//! the 6-byte MAC in uppercase hex). The ID is deterministic across
//! reboots (factory-burned eFuse MAC), used as the MQTT client ID and
//! topic segment, and overridable by an explicitly provisioned
//! `device_id`. The setup AP name uses the last 2 bytes.

/// Fixed-size device ID string: "dev-XXYYZZ".
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Derive the short device ID from the last 3 MAC bytes.
/// Format: `dev-XXYYZZ` (e.g., `dev-EFCAFE`).
pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    use core::fmt::Write;
    let _ = write!(id, "dev-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// Derive the provisioning AP SSID from the last 2 MAC bytes.
/// Format: `MCP-SETUP-YYZZ` (e.g., `MCP-SETUP-CAFE`).
pub fn ap_ssid(mac: &MacAddress) -> heapless::String<24> {
    let mut ssid = heapless::String::<24>::new();
    use core::fmt::Write;
    let _ = write!(ssid, "MCP-SETUP-{:02X}{:02X}", mac[4], mac[5]);
    ssid
}
