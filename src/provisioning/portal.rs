//! Captive-portal request handling.
//!
//! The portal serves four things: the configuration form (optionally
//! with a WiFi scan listing), the two captive-portal probe endpoints
//! that keep phones from tearing the AP connection down, and the save
//! handler. Like the run-mode surface, requests are explicit values
//! handled by a pure function; the platform HTTP server and the DNS
//! catch-all live in the adapters.
//!
//! Save semantics: all required fields present → persist as a group and
//! restart into a fresh boot; anything missing → HTTP 422 and nothing is
//! persisted.

use log::{info, warn};

use crate::config::{self, DEFAULT_MQTT_PORT, DeviceConfig};
use crate::provisioning::service::{StoragePort, save_config};
use crate::transport::http::{FollowUp, HttpReply};

/// One scanned WiFi network, for the form's picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanNetwork {
    pub ssid: String,
    pub rssi: i8,
    pub secured: bool,
}

/// Raw form submission, straight from the POST body fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveForm {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: String,
    pub device_id: String,
}

/// The portal's request surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalRequest {
    /// `GET /` — the configuration form; `scan` adds the network list.
    Page { scan: bool },
    /// `GET /generate_204` — Android connectivity probe.
    Probe204,
    /// `GET /hotspot-detect.html` — Apple connectivity probe.
    ProbeHotspot,
    /// `POST /save`.
    Save(SaveForm),
}

/// Handle one portal request.
pub fn handle_portal_request(
    req: &PortalRequest,
    store: &mut impl StoragePort,
    default_device_id: &str,
    networks: &[ScanNetwork],
) -> (HttpReply, FollowUp) {
    match req {
        PortalRequest::Page { scan } => {
            let html = build_portal_page(default_device_id, *scan, networks);
            (
                HttpReply {
                    status: 200,
                    content_type: "text/html; charset=utf-8",
                    body: html.into_bytes(),
                    no_cache: true,
                },
                FollowUp::None,
            )
        }

        PortalRequest::Probe204 => (HttpReply::text(204, ""), FollowUp::None),

        PortalRequest::ProbeHotspot => (HttpReply::text(200, "OK"), FollowUp::None),

        PortalRequest::Save(form) => handle_save(form, store),
    }
}

fn handle_save(form: &SaveForm, store: &mut impl StoragePort) -> (HttpReply, FollowUp) {
    let mqtt_port = form.mqtt_port.trim().parse::<u16>().unwrap_or(0);

    let cfg = DeviceConfig {
        wifi_ssid: form.wifi_ssid.clone(),
        wifi_pass: form.wifi_pass.clone(),
        mqtt_host: form.mqtt_host.clone(),
        mqtt_port: if mqtt_port == 0 && form.mqtt_port.is_empty() {
            DEFAULT_MQTT_PORT
        } else {
            mqtt_port
        },
        device_id: form.device_id.clone(),
    };

    // Reject before persisting — a failed save leaves the store untouched.
    if let Err(field) = config::validate(&cfg) {
        warn!("Portal: save rejected, invalid field '{field}'");
        return (
            HttpReply::text(422, &format!("Missing or invalid field: {field}")),
            FollowUp::None,
        );
    }

    match save_config(store, &cfg) {
        Ok(()) => {
            info!("Portal: config saved, restarting");
            (
                HttpReply::text(200, "Saved. Rebooting..."),
                FollowUp::Restart,
            )
        }
        Err(e) => {
            warn!("Portal: config persist failed ({e})");
            (HttpReply::text(500, "Failed to persist configuration"), FollowUp::None)
        }
    }
}

// ---------------------------------------------------------------------------
// Page markup
// ---------------------------------------------------------------------------

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn build_portal_page(default_device_id: &str, scan: bool, networks: &[ScanNetwork]) -> String {
    let mut body = String::with_capacity(4096);
    body.push_str(
        "<!doctype html><html><head><meta charset='utf-8'>\
         <meta name='viewport' content='width=device-width,initial-scale=1'>\
         <title>Caphost Setup</title></head><body><h2>Caphost Provisioning</h2>",
    );

    if scan {
        body.push_str("<details open><summary>Scan Wi-Fi</summary><select id='ssid'>");
        for n in networks {
            let ssid = html_escape(&n.ssid);
            let lock = if n.secured { "locked" } else { "open" };
            body.push_str(&format!(
                "<option value='{ssid}'>{ssid} ({} dBm, {lock})</option>",
                n.rssi
            ));
        }
        if networks.is_empty() {
            body.push_str("<option value=''>No networks found (rescan)</option>");
        }
        body.push_str(
            "</select><button onclick=\"document.getElementById('ssidText').value=\
             document.getElementById('ssid').value\">Use selected</button></details>",
        );
    } else {
        body.push_str("<p><a href='/?scan=1'>Scan Wi-Fi</a> (recommended)</p>");
    }

    body.push_str(
        "<form method='POST' action='/save'>\
         <label>Wi-Fi SSID</label><input id='ssidText' name='wifi_ssid' required>\
         <label>Wi-Fi Password</label><input name='wifi_pass' type='password'>\
         <label>MQTT Host</label><input name='mqtt_host' required>\
         <label>MQTT Port</label><input name='mqtt_port' type='number' value='1883' required>\
         <label>Device ID</label><input name='device_id' value='",
    );
    body.push_str(&html_escape(default_device_id));
    body.push_str("' required><button type='submit'>Save &amp; Reboot</button></form></body></html>");
    body
}
