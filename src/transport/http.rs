//! Run-mode local HTTP surface.
//!
//! Endpoints are modeled as an explicit request type handled by a pure
//! function — the platform HTTP server (see `adapters::http_server`) is
//! a thin translation layer, and host tests exercise the handler
//! directly with no sockets involved.
//!
//! The surface is unauthenticated and device-resident: it exists so an
//! operator on the local network can force a resync or reset without
//! waiting for a timer.

use crate::transport::bridge::{StatusSnapshot, TransportBridge};
use crate::transport::session::MqttSession;

// ---------------------------------------------------------------------------
// Reply and routes
// ---------------------------------------------------------------------------

/// One HTTP response, transport-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Send no-store cache headers (operator endpoints must never be
    /// served stale by a captive-portal-happy phone).
    pub no_cache: bool,
}

impl HttpReply {
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.as_bytes().to_vec(),
            no_cache: true,
        }
    }

    pub fn binary(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
            no_cache: true,
        }
    }
}

/// Capability-registered extra endpoints (e.g. `/camera/last`).
/// Populated once at boot by `Tool::register_http`, read-only afterwards.
pub struct HttpRoutes {
    entries: Vec<(String, Box<dyn Fn() -> HttpReply + Send>)>,
}

impl HttpRoutes {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, path: &str, handler: Box<dyn Fn() -> HttpReply + Send>) {
        self.entries.push((path.to_string(), handler));
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    /// Resolve a request path against the registered tool endpoints.
    pub fn dispatch(&self, path: &str) -> Option<HttpReply> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, h)| h())
    }
}

impl Default for HttpRoutes {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Operator endpoints
// ---------------------------------------------------------------------------

/// The fixed operator endpoints of the run-mode surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRequest {
    Help,
    StatusNow,
    Reannounce,
    ClearRetained,
    FactoryReset,
}

impl StatusRequest {
    /// Map a request path to an operator endpoint.
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/" => Some(Self::Help),
            "/status_now" => Some(Self::StatusNow),
            "/reannounce" => Some(Self::Reannounce),
            "/clear_retained" => Some(Self::ClearRetained),
            "/factory_reset" => Some(Self::FactoryReset),
            _ => None,
        }
    }
}

/// Side effect the caller must carry out after replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    None,
    /// Restart the device (provisioning save completed).
    Restart,
    /// Erase the configuration store and restart the device.
    FactoryReset,
}

const HELP_TEXT: &str = "Caphost Device API\n\n\
Endpoints:\n\
  GET /               - This help\n\
  GET /status_now     - Publish status immediately\n\
  GET /reannounce     - Re-publish announce + ports (retain)\n\
  GET /clear_retained - Clear retained messages\n\
  GET /factory_reset  - Factory reset & reboot\n";

/// Handle one operator request. Publish-triggering endpoints answer 503
/// while the MQTT session is down; factory reset always succeeds locally
/// and returns the follow-up for the caller to execute.
pub fn handle_status_request<S: MqttSession>(
    req: StatusRequest,
    bridge: &TransportBridge<S>,
    snap: &StatusSnapshot,
) -> (HttpReply, FollowUp) {
    match req {
        StatusRequest::Help => (HttpReply::text(200, HELP_TEXT), FollowUp::None),

        StatusRequest::StatusNow => {
            if !bridge.is_connected() {
                return (HttpReply::text(503, "MQTT not connected"), FollowUp::None);
            }
            match bridge.publish_status(true, snap) {
                Ok(()) => (HttpReply::text(200, "Status published"), FollowUp::None),
                Err(e) => (HttpReply::text(503, &e.to_string()), FollowUp::None),
            }
        }

        StatusRequest::Reannounce => {
            if !bridge.is_connected() {
                return (HttpReply::text(503, "MQTT not connected"), FollowUp::None);
            }
            let announce = bridge.publish_announce();
            let ports = bridge.publish_ports_announce(&snap.ts);
            match announce.and(ports) {
                Ok(()) => (
                    HttpReply::text(200, "Announce + ports re-published (retain)"),
                    FollowUp::None,
                ),
                Err(e) => (HttpReply::text(503, &e.to_string()), FollowUp::None),
            }
        }

        StatusRequest::ClearRetained => {
            if !bridge.is_connected() {
                return (HttpReply::text(503, "MQTT not connected"), FollowUp::None);
            }
            match bridge.clear_retained() {
                Ok(()) => (
                    HttpReply::text(200, "Retained messages cleared"),
                    FollowUp::None,
                ),
                Err(e) => (HttpReply::text(503, &e.to_string()), FollowUp::None),
            }
        }

        StatusRequest::FactoryReset => {
            // Best effort: wipe orchestrator-visible state while the
            // session is still up, then disconnect cleanly.
            if bridge.is_connected() {
                let _ = bridge.clear_retained();
                bridge.disconnect();
            }
            (
                HttpReply::text(200, "Factory reset done. Rebooting..."),
                FollowUp::FactoryReset,
            )
        }
    }
}
