//! Provisioning flow: boot-mode invariant, portal save validation,
//! factory-reset storage effects.

use caphost::config::DeviceConfig;
use caphost::provisioning::portal::{PortalRequest, SaveForm, handle_portal_request};
use caphost::provisioning::service::{clear_config, load_config, save_config};
use caphost::provisioning::{RunMode, boot_mode};
use caphost::transport::http::FollowUp;

use crate::mocks::MemStore;

fn good_form() -> SaveForm {
    SaveForm {
        wifi_ssid: "HomeNet".into(),
        wifi_pass: "secret123".into(),
        mqtt_host: "192.168.0.100".into(),
        mqtt_port: "1883".into(),
        device_id: "dev-AABBCC".into(),
    }
}

/// The provisioning invariant: run mode iff both credentials and broker
/// host are stored.
#[test]
fn boot_mode_follows_stored_minimum_config() {
    let mut store = MemStore::new();
    assert_eq!(boot_mode(&load_config(&store)), RunMode::Provision);

    // Full save → Run.
    let (_, follow) = handle_portal_request(
        &PortalRequest::Save(good_form()),
        &mut store,
        "dev-X",
        &[],
    );
    assert_eq!(follow, FollowUp::Restart);
    assert_eq!(boot_mode(&load_config(&store)), RunMode::Run);
}

#[test]
fn partial_config_still_boots_into_provision() {
    let mut store = MemStore::new();
    let cfg = DeviceConfig {
        wifi_ssid: "OnlySsid".into(),
        ..DeviceConfig::default()
    };
    save_config(&mut store, &cfg).unwrap();
    assert_eq!(boot_mode(&load_config(&store)), RunMode::Provision);
}

/// Scenario D: an empty SSID is rejected with 422 and nothing lands in
/// the store.
#[test]
fn empty_ssid_rejected_before_persistence() {
    let mut store = MemStore::new();
    let form = SaveForm {
        wifi_ssid: String::new(),
        ..good_form()
    };

    let (reply, follow) =
        handle_portal_request(&PortalRequest::Save(form), &mut store, "dev-X", &[]);

    assert_eq!(reply.status, 422);
    assert_eq!(follow, FollowUp::None);
    assert_eq!(load_config(&store), DeviceConfig::default());
    assert_eq!(boot_mode(&load_config(&store)), RunMode::Provision);
}

#[test]
fn missing_broker_host_rejected() {
    let mut store = MemStore::new();
    let form = SaveForm {
        mqtt_host: String::new(),
        ..good_form()
    };
    let (reply, _) = handle_portal_request(&PortalRequest::Save(form), &mut store, "dev-X", &[]);
    assert_eq!(reply.status, 422);
    assert_eq!(load_config(&store), DeviceConfig::default());
}

/// Scenario E (storage side): factory reset erases the config so the
/// next boot re-enters provisioning.
#[test]
fn factory_reset_returns_device_to_provisioning() {
    let mut store = MemStore::new();
    handle_portal_request(&PortalRequest::Save(good_form()), &mut store, "dev-X", &[]);
    assert_eq!(boot_mode(&load_config(&store)), RunMode::Run);

    clear_config(&mut store);
    assert_eq!(boot_mode(&load_config(&store)), RunMode::Provision);
}

/// A save round-trips through a power cycle: what the portal persisted
/// is what the next boot loads.
#[test]
fn saved_config_survives_reload() {
    let mut store = MemStore::new();
    handle_portal_request(&PortalRequest::Save(good_form()), &mut store, "dev-X", &[]);

    let cfg = load_config(&store);
    assert_eq!(cfg.wifi_ssid, "HomeNet");
    assert_eq!(cfg.wifi_pass, "secret123");
    assert_eq!(cfg.mqtt_host, "192.168.0.100");
    assert_eq!(cfg.mqtt_port, 1883);
    assert_eq!(cfg.device_id, "dev-AABBCC");
}

#[test]
fn captive_portal_probes_served_in_provision_mode() {
    let mut store = MemStore::new();

    let (reply, _) = handle_portal_request(&PortalRequest::Probe204, &mut store, "dev-X", &[]);
    assert_eq!(reply.status, 204);

    let (reply, _) = handle_portal_request(&PortalRequest::ProbeHotspot, &mut store, "dev-X", &[]);
    assert_eq!(reply.status, 200);
}
