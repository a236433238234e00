//! Transport bridge — owner of the single MQTT session.
//!
//! ```text
//!   foreground loop ──┐
//!   dispatch worker ──┼──▶ Mutex<MqttSession> ──▶ broker
//!   HTTP handlers  ───┘
//! ```
//!
//! The session object is not safe for concurrent use, so every publish,
//! subscribe, and service call goes through the bridge's mutex. The lock
//! is held for the duration of one session call only — announce documents
//! are built (under the registry lock) *before* the session lock is
//! taken, so the two locks never nest.
//!
//! Connect sequence, in protocol order: retained last-will registration →
//! subscriptions → retained announce → online status → retained ports
//! announce. The announce-before-status ordering after every
//! (re)connection is what lets the orchestrator treat a status as "the
//! capability list I hold is current".

use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::error::CommsError;
use crate::protocol::envelope::{PortDataEnvelope, StatusEnvelope};
use crate::protocol::topics::TopicSet;
use crate::registry::ToolRegistry;
use crate::registry::ports::PortRegistry;
use crate::transport::session::{ConnectOptions, InboundMessage, MqttSession};

/// Periodic status heartbeat interval.
pub const STATUS_INTERVAL_MS: u64 = 30_000;
/// Periodic retained-announce refresh interval.
pub const ANNOUNCE_INTERVAL_MS: u64 = 300_000;
/// Fixed backoff between broker reconnect attempts.
pub const MQTT_RETRY_MS: u64 = 3_000;
/// Fixed backoff between WiFi reconnect attempts.
pub const WIFI_RETRY_MS: u64 = 5_000;

// ---------------------------------------------------------------------------
// Device identity
// ---------------------------------------------------------------------------

/// Stable device identity plus the current reachable address.
///
/// `device_id` never changes after boot; `http_base` follows the station
/// IP and may change across reconnects, so readers fetch it per use.
pub struct DeviceIdentity {
    device_id: String,
    firmware_version: &'static str,
    http_base: Mutex<String>,
}

impl DeviceIdentity {
    pub fn new(device_id: String) -> Self {
        Self {
            device_id,
            firmware_version: env!("CARGO_PKG_VERSION"),
            http_base: Mutex::new(String::new()),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn firmware_version(&self) -> &'static str {
        self.firmware_version
    }

    pub fn http_base(&self) -> String {
        self.http_base.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Update the reachable address (after station join / IP change).
    pub fn set_http_base(&self, base: &str) {
        if let Ok(mut g) = self.http_base.lock() {
            if *g != base {
                info!("Identity: http_base = {base}");
                *g = base.to_string();
            }
        }
    }
}

/// Point-in-time values a status publish needs, sampled by the caller.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub uptime_ms: u64,
    pub rssi: i32,
    pub ts: String,
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

pub struct TransportBridge<S: MqttSession> {
    session: Mutex<S>,
    topics: TopicSet,
    identity: Arc<DeviceIdentity>,
    broker_host: String,
    broker_port: u16,
    tools: Arc<Mutex<ToolRegistry>>,
    ports: Arc<Mutex<PortRegistry>>,
}

impl<S: MqttSession> TransportBridge<S> {
    pub fn new(
        session: S,
        identity: Arc<DeviceIdentity>,
        broker_host: String,
        broker_port: u16,
        tools: Arc<Mutex<ToolRegistry>>,
        ports: Arc<Mutex<PortRegistry>>,
    ) -> Self {
        let topics = TopicSet::new(identity.device_id());
        Self {
            session: Mutex::new(session),
            topics,
            identity,
            broker_host,
            broker_port,
            tools,
            ports,
        }
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn identity(&self) -> &Arc<DeviceIdentity> {
        &self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.session.lock().map(|s| s.is_connected()).unwrap_or(false)
    }

    /// Open the session and run the full (re)connect sequence.
    ///
    /// Failures are non-fatal — the caller retries on
    /// [`MQTT_RETRY_MS`] backoff from the main loop.
    pub fn connect(&self, snap: &StatusSnapshot) -> Result<(), CommsError> {
        let will = StatusEnvelope::new(
            self.identity.device_id(),
            false,
            snap.uptime_ms,
            snap.rssi,
            snap.ts.clone(),
        )
        .to_json();

        {
            let mut session = self.session.lock().map_err(|_| CommsError::MqttConnectFailed)?;
            session.connect(&ConnectOptions {
                client_id: self.identity.device_id(),
                host: &self.broker_host,
                port: self.broker_port,
                will_topic: &self.topics.status,
                will_payload: &will,
            })?;

            for topic in [&self.topics.cmd, &self.topics.ports_set] {
                if let Err(e) = session.subscribe(topic) {
                    warn!("Bridge: subscribe '{topic}' failed ({e})");
                }
            }
        }

        info!(
            "Bridge: connected to {}:{} as '{}'",
            self.broker_host,
            self.broker_port,
            self.identity.device_id()
        );

        // Protocol ordering: announce precedes the first status.
        self.publish_announce()?;
        self.publish_status(true, snap)?;
        self.publish_ports_announce(&snap.ts)?;
        Ok(())
    }

    /// Service the session and pull the next inbound message.
    /// Foreground loop only; never blocks.
    pub fn service(&self) -> Option<InboundMessage> {
        self.session.lock().ok()?.service()
    }

    pub fn disconnect(&self) {
        if let Ok(mut s) = self.session.lock() {
            s.disconnect();
        }
    }

    /// Regenerate and publish the retained capability announce.
    pub fn publish_announce(&self) -> Result<(), CommsError> {
        let doc = {
            let tools = self.tools.lock().map_err(|_| CommsError::MqttPublishFailed)?;
            tools.build_announce(self.identity.device_id(), &self.identity.http_base())
        };
        self.publish_logged(&self.topics.announce, doc.as_bytes(), true, "announce")
    }

    /// Publish a status heartbeat (not retained — the retained copy on
    /// this topic is the broker-held last-will).
    pub fn publish_status(&self, online: bool, snap: &StatusSnapshot) -> Result<(), CommsError> {
        let doc = StatusEnvelope::new(
            self.identity.device_id(),
            online,
            snap.uptime_ms,
            snap.rssi,
            snap.ts.clone(),
        )
        .to_json();
        self.publish_logged(&self.topics.status, doc.as_bytes(), false, "status")
    }

    /// Regenerate and publish the retained ports announce.
    pub fn publish_ports_announce(&self, ts: &str) -> Result<(), CommsError> {
        let doc = {
            let ports = self.ports.lock().map_err(|_| CommsError::MqttPublishFailed)?;
            ports.build_announce(self.identity.device_id(), ts)
        };
        self.publish_logged(&self.topics.ports_announce, doc.as_bytes(), true, "ports announce")
    }

    /// Publish one completed-command observation on the events topic.
    pub fn publish_events(&self, observation_json: &str) -> Result<(), CommsError> {
        self.publish_logged(&self.topics.events, observation_json.as_bytes(), false, "events")
    }

    /// Publish one OutPort sample.
    pub fn publish_port_data(&self, port: &str, value: f32, ts: &str) -> Result<(), CommsError> {
        let doc = serde_json::to_string(&PortDataEnvelope {
            port,
            value,
            timestamp: ts,
        })
        .unwrap_or_default();
        self.publish_logged(&self.topics.ports_data, doc.as_bytes(), false, "port data")
    }

    /// Erase orchestrator-visible retained state: empty retained payloads
    /// to announce, status, and ports announce.
    pub fn clear_retained(&self) -> Result<(), CommsError> {
        let mut session = self.session.lock().map_err(|_| CommsError::MqttPublishFailed)?;
        session.publish(&self.topics.announce, b"", true)?;
        session.publish(&self.topics.status, b"", true)?;
        session.publish(&self.topics.ports_announce, b"", true)?;
        info!("Bridge: cleared retained announce/status/ports");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn publish_logged(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
        label: &str,
    ) -> Result<(), CommsError> {
        let result = {
            let mut session = self.session.lock().map_err(|_| CommsError::MqttPublishFailed)?;
            session.publish(topic, payload, retain)
        };
        match &result {
            Ok(()) => info!("Bridge: {label} sent ({} bytes, retain={retain})", payload.len()),
            // At-most-once: log and drop, no outbound retry queue.
            Err(e) => warn!("Bridge: {label} publish failed ({e})"),
        }
        result
    }
}
