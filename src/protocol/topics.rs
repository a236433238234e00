//! Per-device MQTT topic set.
//!
//! The namespace is fixed: `mcp/dev/<device_id>/<leaf>`. Topics are
//! derived once from the device identity at bridge construction and
//! reused for every publish/subscribe, so the formatting cost is paid
//! a single time.

const PREFIX: &str = "mcp/dev";

/// The seven topics a device speaks on, precomputed for one device ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    pub announce: String,
    pub status: String,
    pub cmd: String,
    pub events: String,
    pub ports_announce: String,
    pub ports_data: String,
    pub ports_set: String,
}

impl TopicSet {
    pub fn new(device_id: &str) -> Self {
        Self {
            announce: format!("{PREFIX}/{device_id}/announce"),
            status: format!("{PREFIX}/{device_id}/status"),
            cmd: format!("{PREFIX}/{device_id}/cmd"),
            events: format!("{PREFIX}/{device_id}/events"),
            ports_announce: format!("{PREFIX}/{device_id}/ports/announce"),
            ports_data: format!("{PREFIX}/{device_id}/ports/data"),
            ports_set: format!("{PREFIX}/{device_id}/ports/set"),
        }
    }
}
