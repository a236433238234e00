//! JSON payload envelopes.
//!
//! Inbound: `device.command` (tool invocation) and `ports/set` writes.
//! Outbound: `device.status` heartbeats, `ports/data` samples, and the
//! per-invocation `device.observation` built by
//! [`ObservationBuilder`](crate::registry::tool::ObservationBuilder).
//!
//! Parsing is deliberately tolerant on optional fields (a missing
//! `request_id` is substituted with an uptime-derived one at dispatch
//! time) and strict on the `type` discriminator — anything that is not a
//! `device.command` on the command topic is ignored upstream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound tool invocation request.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

impl CommandEnvelope {
    pub const TYPE: &'static str = "device.command";

    /// Decode a raw payload. `None` for malformed JSON or a foreign
    /// `type` discriminator — both are dropped by the caller with a log
    /// line, never dispatched.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let env: Self = serde_json::from_slice(payload).ok()?;
        (env.kind == Self::TYPE).then_some(env)
    }
}

/// Inbound InPort write: `{port, value}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PortSetEnvelope {
    pub port: String,
    pub value: f32,
}

impl PortSetEnvelope {
    pub fn decode(payload: &[u8]) -> Option<Self> {
        serde_json::from_slice(payload).ok()
    }
}

/// Outbound OutPort sample: `{port, value, timestamp}`.
#[derive(Debug, Clone, Serialize)]
pub struct PortDataEnvelope<'a> {
    pub port: &'a str,
    pub value: f32,
    pub timestamp: &'a str,
}

/// Outbound status heartbeat. The same shape doubles as the retained
/// last-will payload with `online: false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub device_id: String,
    pub online: bool,
    pub uptime_ms: u64,
    pub rssi: i32,
    pub ts: String,
}

impl StatusEnvelope {
    pub const TYPE: &'static str = "device.status";

    pub fn new(device_id: &str, online: bool, uptime_ms: u64, rssi: i32, ts: String) -> Self {
        Self {
            kind: Self::TYPE.to_string(),
            device_id: device_id.to_string(),
            online,
            uptime_ms,
            rssi,
            ts,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Rewrite relative asset URLs in a serialized observation to absolute
/// ones using the device's current reachable address. Observations
/// without assets pass through untouched, as does anything that fails to
/// re-parse (published verbatim — the orchestrator sees what the tool
/// produced).
pub fn absolutize_asset_urls(observation_json: &str, http_base: &str) -> String {
    let Ok(mut doc) = serde_json::from_str::<Value>(observation_json) else {
        return observation_json.to_string();
    };

    let Some(assets) = doc
        .get_mut("result")
        .and_then(|r| r.get_mut("assets"))
        .and_then(Value::as_array_mut)
    else {
        return observation_json.to_string();
    };

    let mut touched = false;
    for asset in assets.iter_mut() {
        if let Some(url) = asset.get("url").and_then(Value::as_str) {
            if url.starts_with('/') {
                let absolute = format!("{http_base}{url}");
                asset["url"] = Value::String(absolute);
                touched = true;
            }
        }
    }

    if touched {
        serde_json::to_string(&doc).unwrap_or_else(|_| observation_json.to_string())
    } else {
        observation_json.to_string()
    }
}
