//! Caphost Firmware — Main Entry Point
//!
//! Boot → mode decision → foreground loop, one worker thread.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ boot: NVS → DeviceConfig → RunMode                          │
//! │                                                             │
//! │ Provision:  AP + captive portal (foreground only)           │
//! │     save → restart → fresh boot                             │
//! │                                                             │
//! │ Run:        STA join → SNTP → TransportBridge               │
//! │                                                             │
//! │   foreground loop            worker thread                  │
//! │   ─ MQTT service/reconnect   ─ recv job (blocking)          │
//! │   ─ WiFi reconnect           ─ registry dispatch            │
//! │   ─ periodic status/announce ─ asset URL rewrite            │
//! │   ─ OutPort ticks            ─ publish events               │
//! │   ─ HTTP follow-ups                                         │
//! │        └────── Mutex<MqttSession> serializes both ──────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{info, warn};

use caphost::adapters::device_id;
use caphost::adapters::nvs::NvsStore;
use caphost::adapters::time::Clock;
use caphost::adapters::wifi::{ConnectivityPort, WifiAdapter};
use caphost::dispatch::{Dispatcher, run_worker};
use caphost::protocol::envelope::PortSetEnvelope;
use caphost::provisioning::{self, RunMode, portal, service};
use caphost::registry::ToolRegistry;
use caphost::registry::ports::PortRegistry;
use caphost::tools;
use caphost::transport::bridge::{
    ANNOUNCE_INTERVAL_MS, DeviceIdentity, MQTT_RETRY_MS, STATUS_INTERVAL_MS, StatusSnapshot,
    TransportBridge, WIFI_RETRY_MS,
};
use caphost::transport::http::HttpRoutes;

#[cfg(target_os = "espidf")]
type Session = caphost::adapters::mqtt::EspMqttSession;
#[cfg(not(target_os = "espidf"))]
type Session = caphost::transport::session::SimSession;

/// Foreground loop pace. Small fixed sleep to yield the CPU between
/// non-blocking service passes.
const LOOP_TICK_MS: u64 = 20;

fn restart_device() -> ! {
    info!("Restarting...");
    #[cfg(target_os = "espidf")]
    unsafe {
        esp_idf_svc::sys::esp_restart();
    }
    #[cfg(not(target_os = "espidf"))]
    std::process::exit(0);
}

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }

    info!("╔══════════════════════════════════════╗");
    info!("║  Caphost v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration store ────────────────────────────────
    // An unusable NVS partition leaves nothing to run with — fail the
    // boot and let the supervisor restart us into another attempt.
    let mut nvs =
        NvsStore::new().map_err(|e| anyhow::anyhow!("NVS initialisation failed: {e}"))?;
    let config = service::load_config(&nvs);

    // ── 3. Device identity ────────────────────────────────────
    let mac = device_id::read_mac();
    let did = if config.device_id.is_empty() {
        device_id::device_id(&mac).as_str().to_string()
    } else {
        config.device_id.clone()
    };
    info!("Device ID: {did}");

    let clock = Arc::new(Clock::new());
    let mut wifi = WifiAdapter::new();

    // ── 4. Mode decision ──────────────────────────────────────
    if provisioning::boot_mode(&config) == RunMode::Provision {
        run_provisioning(&mut nvs, &mut wifi, &did, &mac, &clock);
    }

    // ── 5. Station join (bounded) ─────────────────────────────
    if let Err(e) = wifi.set_credentials(&config.wifi_ssid, &config.wifi_pass) {
        warn!("Stored credentials invalid ({e}), falling back to provisioning");
        run_provisioning(&mut nvs, &mut wifi, &did, &mac, &clock);
    }
    if let Err(e) = wifi.connect(provisioning::STA_JOIN_TIMEOUT_MS) {
        warn!("Station join failed ({e}), falling back to provisioning");
        run_provisioning(&mut nvs, &mut wifi, &did, &mac, &clock);
    }

    let identity = Arc::new(DeviceIdentity::new(did));
    if let Some(ip) = wifi.ip_address() {
        identity.set_http_base(&format!("http://{ip}"));
    }

    #[cfg(target_os = "espidf")]
    let _sntp = caphost::adapters::time::start_sntp();

    // ── 6. Registries and reference capability set ────────────
    let ports = Arc::new(Mutex::new(PortRegistry::new()));
    tools::register_ports(&mut ports.lock().expect("boot-time lock"));
    let pattern_state = tools::make_pattern_state(&ports);

    let mut registry = ToolRegistry::new();
    tools::register_tools(&mut registry, Arc::clone(&pattern_state), Arc::clone(&clock));
    if !registry.init_all() {
        warn!("Some tools failed to init");
    }

    let mut routes = HttpRoutes::new();
    for tool in registry.tools_mut() {
        tool.register_http(&mut routes);
    }
    let routes = Arc::new(routes);
    let tools_shared = Arc::new(Mutex::new(registry));

    // ── 7. Transport bridge ───────────────────────────────────
    let bridge = Arc::new(TransportBridge::new(
        Session::default(),
        Arc::clone(&identity),
        config.mqtt_host.clone(),
        config.mqtt_port,
        Arc::clone(&tools_shared),
        Arc::clone(&ports),
    ));

    // ── 8. Dispatch worker ────────────────────────────────────
    let (dispatcher, job_rx) = Dispatcher::new();
    {
        let tools_worker = Arc::clone(&tools_shared);
        let bridge_worker = Arc::clone(&bridge);
        let clock_worker = Arc::clone(&clock);
        std::thread::Builder::new()
            .name("tool_worker".into())
            .stack_size(12 * 1024)
            .spawn(move || {
                run_worker(&job_rx, &tools_worker, &bridge_worker, move || {
                    clock_worker.uptime_ms()
                });
            })?;
    }

    // ── 9. Local HTTP surface ─────────────────────────────────
    #[cfg(target_os = "espidf")]
    let pending_follow_up = caphost::adapters::http_server::new_pending();
    #[cfg(target_os = "espidf")]
    let _http_server = start_status_server(
        Arc::clone(&bridge),
        Arc::clone(&routes),
        Arc::clone(&clock),
        &pending_follow_up,
    )?;
    #[cfg(not(target_os = "espidf"))]
    let _ = &routes;

    info!("System ready. Entering run loop.");
    run_loop(
        &bridge,
        &dispatcher,
        &ports,
        &pattern_state,
        &clock,
        &mut wifi,
        &mut nvs,
        #[cfg(target_os = "espidf")]
        &pending_follow_up,
    )
}

// ── Run mode foreground loop ──────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run_loop(
    bridge: &Arc<TransportBridge<Session>>,
    dispatcher: &Dispatcher,
    ports: &Arc<Mutex<PortRegistry>>,
    pattern_state: &Arc<tools::pattern::PatternState>,
    clock: &Arc<Clock>,
    wifi: &mut WifiAdapter,
    nvs: &mut NvsStore,
    #[cfg(target_os = "espidf")] pending: &caphost::adapters::http_server::PendingFollowUp,
) -> Result<()> {
    let mut last_status_ms: u64 = 0;
    let mut last_announce_ms: u64 = 0;
    let mut last_mqtt_try_ms: u64 = 0;
    let mut last_wifi_try_ms: u64 = 0;

    loop {
        let now = clock.uptime_ms();
        let snap = StatusSnapshot {
            uptime_ms: now,
            rssi: wifi.rssi().map(i32::from).unwrap_or(0),
            ts: clock.iso_now(),
        };

        // HTTP follow-ups (restart / factory reset) run here, never on
        // the server task.
        #[cfg(target_os = "espidf")]
        match caphost::adapters::http_server::take_pending(pending) {
            caphost::transport::http::FollowUp::FactoryReset => {
                service::clear_config(nvs);
                std::thread::sleep(std::time::Duration::from_millis(800));
                restart_device();
            }
            caphost::transport::http::FollowUp::Restart => {
                std::thread::sleep(std::time::Duration::from_millis(800));
                restart_device();
            }
            caphost::transport::http::FollowUp::None => {}
        }
        #[cfg(not(target_os = "espidf"))]
        let _ = &*nvs;

        // Link recovery, fixed cadence, independent of the broker session.
        if !wifi.is_connected() {
            if now.saturating_sub(last_wifi_try_ms) > WIFI_RETRY_MS {
                last_wifi_try_ms = now;
                wifi.reconnect();
                if let Some(ip) = wifi.ip_address() {
                    bridge.identity().set_http_base(&format!("http://{ip}"));
                }
            }
        } else if !bridge.is_connected() {
            // Broker session recovery, its own cadence.
            if now.saturating_sub(last_mqtt_try_ms) > MQTT_RETRY_MS {
                last_mqtt_try_ms = now;
                match bridge.connect(&snap) {
                    Ok(()) => {
                        last_announce_ms = now;
                        last_status_ms = now;
                    }
                    Err(e) => warn!("MQTT connect failed ({e}), will retry"),
                }
            }
        } else {
            // Inbound routing: commands to the job queue, port writes
            // straight to the port registry.
            while let Some(msg) = bridge.service() {
                if msg.topic == bridge.topics().cmd {
                    let _ = dispatcher.enqueue(&msg.payload);
                } else if msg.topic == bridge.topics().ports_set {
                    match PortSetEnvelope::decode(&msg.payload) {
                        Some(set) => {
                            if let Ok(ports) = ports.lock() {
                                ports.set_in_port(&set.port, set.value);
                            }
                        }
                        None => warn!("Malformed ports/set payload, dropped"),
                    }
                } else {
                    warn!("Unknown topic '{}', ignored", msg.topic);
                }
            }

            // Periodic republish.
            if now.saturating_sub(last_status_ms) > STATUS_INTERVAL_MS {
                last_status_ms = now;
                let _ = bridge.publish_status(true, &snap);
            }
            if now.saturating_sub(last_announce_ms) > ANNOUNCE_INTERVAL_MS {
                last_announce_ms = now;
                let _ = bridge.publish_announce();
            }

            // OutPort ticks push samples through the bridge.
            if let Ok(mut ports) = ports.lock() {
                let mut emit =
                    |name: &str, value: f32| bridge.publish_port_data(name, value, &snap.ts).is_ok();
                ports.tick_all(now, &mut emit);
            }
        }

        // LED pattern rendering.
        if pattern_state.is_playing() {
            if let Some(frame) = pattern_state.render(now) {
                write_led_frame(&frame);
            }
        }

        std::thread::sleep(std::time::Duration::from_millis(LOOP_TICK_MS));
    }
}

#[cfg(target_os = "espidf")]
fn write_led_frame(_frame: &[(u8, u8, u8); tools::pattern::NUM_LEDS]) {
    // RMT-driven WS2812 write; wired in on the device build with the
    // ring's data GPIO.
}

#[cfg(not(target_os = "espidf"))]
fn write_led_frame(frame: &[(u8, u8, u8); tools::pattern::NUM_LEDS]) {
    log::trace!("LED frame: {frame:?}");
}

// ── Provisioning mode ─────────────────────────────────────────

/// Provisioning never returns: the portal runs in the foreground until a
/// successful save restarts the device.
fn run_provisioning(
    nvs: &mut NvsStore,
    wifi: &mut WifiAdapter,
    did: &str,
    mac: &device_id::MacAddress,
    clock: &Arc<Clock>,
) -> ! {
    let ap = device_id::ap_ssid(mac);
    info!("Provisioning: AP '{ap}' pass '{}'", provisioning::AP_PASSPHRASE);

    if let Err(e) = wifi.start_ap(ap.as_str(), provisioning::AP_PASSPHRASE) {
        // Without an AP nothing can configure us; restart and retry.
        warn!("Provisioning: AP start failed ({e})");
        std::thread::sleep(std::time::Duration::from_secs(5));
        restart_device();
    }

    // One scan up front; the portal serves the cached listing.
    let networks = wifi.scan();
    info!("Provisioning: {} networks in scan cache", networks.len());

    // Captive-portal plumbing on the device build:
    // - DNS catch-all answering every A query with 192.168.4.1
    // - EspHttpServer routes mapping onto PortalRequest (GET /,
    //   /generate_204, /hotspot-detect.html, POST /save)
    // Each handler funnels into portal::handle_portal_request and a
    // FollowUp::Restart from a save lands in `pending` below.
    #[cfg(target_os = "espidf")]
    {
        let _ = (&nvs, &did, &clock, &networks);
        let pending = caphost::adapters::http_server::new_pending();
        loop {
            if caphost::adapters::http_server::take_pending(&pending)
                == caphost::transport::http::FollowUp::Restart
            {
                std::thread::sleep(std::time::Duration::from_millis(800));
                restart_device();
            }
            std::thread::sleep(std::time::Duration::from_millis(LOOP_TICK_MS));
        }
    }

    // Host simulation: exercise the portal once so the flow is visible
    // in logs, then idle.
    #[cfg(not(target_os = "espidf"))]
    {
        let (reply, _) = portal::handle_portal_request(
            &portal::PortalRequest::Page { scan: true },
            nvs,
            did,
            &networks,
        );
        info!(
            "Provisioning(sim): portal page ready ({} bytes), uptime {}s",
            reply.body.len(),
            clock.uptime_ms() / 1000
        );
        loop {
            std::thread::sleep(std::time::Duration::from_secs(1));
        }
    }
}

// ── Run-mode HTTP server (device build) ───────────────────────

#[cfg(target_os = "espidf")]
fn start_status_server(
    bridge: Arc<TransportBridge<Session>>,
    routes: Arc<HttpRoutes>,
    clock: Arc<Clock>,
    pending: &caphost::adapters::http_server::PendingFollowUp,
) -> Result<esp_idf_svc::http::server::EspHttpServer<'static>> {
    use caphost::adapters::http_server::{make_server, on_route};
    use caphost::transport::http::{HttpReply, StatusRequest, handle_status_request};
    use esp_idf_svc::http::Method;

    let mut server = make_server()?;

    for path in ["/", "/status_now", "/reannounce", "/clear_retained", "/factory_reset"] {
        let bridge = Arc::clone(&bridge);
        let clock = Arc::clone(&clock);
        on_route(
            &mut server,
            path,
            Method::Get,
            Arc::clone(pending),
            move |req| {
                let snap = StatusSnapshot {
                    uptime_ms: clock.uptime_ms(),
                    rssi: 0,
                    ts: clock.iso_now(),
                };
                match StatusRequest::from_path(req.uri()) {
                    Some(r) => handle_status_request(r, &bridge, &snap),
                    None => (
                        HttpReply::text(404, "not found"),
                        caphost::transport::http::FollowUp::None,
                    ),
                }
            },
        )?;
    }

    // Capability-registered asset endpoints.
    let paths: Vec<String> = routes.paths().map(str::to_string).collect();
    for path in paths {
        let routes = Arc::clone(&routes);
        let path_for_handler = path.clone();
        on_route(
            &mut server,
            &path,
            Method::Get,
            caphost::adapters::http_server::new_pending(),
            move |_req| {
                let reply = routes
                    .dispatch(&path_for_handler)
                    .unwrap_or_else(|| HttpReply::text(404, "not found"));
                (reply, caphost::transport::http::FollowUp::None)
            },
        )?;
    }

    Ok(server)
}
