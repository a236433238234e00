//! Registry-level dispatch semantics: exact-name routing, miss
//! handling, announce document shape.

use serde_json::{Value, json};
use std::sync::atomic::Ordering;

use caphost::protocol::envelope::CommandEnvelope;
use caphost::registry::ERR_UNSUPPORTED_TOOL;

use crate::mocks::{self, MockCameraTool, SideEffectTool};

fn decode(payload: &[u8]) -> CommandEnvelope {
    CommandEnvelope::decode(payload).unwrap()
}

#[test]
fn dispatch_invokes_exactly_the_named_tool() {
    let (probe, probe_count) = SideEffectTool::new();
    let camera = MockCameraTool::new();
    let camera_count = std::sync::Arc::clone(&camera.captures);

    let harness = mocks::make_harness(|tools, _| {
        tools.register(Box::new(camera));
        tools.register(Box::new(probe));
    });

    let payload = mocks::command_payload("r1", "capture_image", json!({ "quality": "mid" }));
    let (ok, _) = harness
        .tools
        .lock()
        .unwrap()
        .dispatch(&decode(&payload), "fb");

    assert!(ok);
    assert_eq!(camera_count.load(Ordering::SeqCst), 1);
    assert_eq!(probe_count.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_tool_reports_unsupported_and_runs_nothing() {
    let (probe, probe_count) = SideEffectTool::new();
    let harness = mocks::make_harness(|tools, _| {
        tools.register(Box::new(probe));
    });

    let payload = mocks::command_payload("r2", "nonexistent", json!({}));
    let (ok, obs) = harness
        .tools
        .lock()
        .unwrap()
        .dispatch(&decode(&payload), "fb");

    assert!(!ok);
    let v: Value = serde_json::from_str(&obs).unwrap();
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"]["code"], ERR_UNSUPPORTED_TOOL);
    assert_eq!(probe_count.load(Ordering::SeqCst), 0);
}

#[test]
fn announce_lists_every_tool_exactly_once() {
    let harness = mocks::make_harness(|tools, _| {
        tools.register(Box::new(MockCameraTool::new()));
        let (probe, _) = SideEffectTool::new();
        tools.register(Box::new(probe));
        // Duplicate name: rejected, must not appear twice.
        tools.register(Box::new(MockCameraTool::new()));
    });

    let ann = harness
        .tools
        .lock()
        .unwrap()
        .build_announce(mocks::TEST_DEVICE_ID, mocks::TEST_HTTP_BASE);
    let v: Value = serde_json::from_str(&ann).unwrap();

    let names: Vec<&str> = v["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["capture_image", "probe"]);
    assert_eq!(v["device_id"], mocks::TEST_DEVICE_ID);
    assert_eq!(v["http_base"], mocks::TEST_HTTP_BASE);
}

#[test]
fn ports_announce_reflects_registered_ports() {
    let harness = mocks::make_harness(|_, ports| {
        ports.create_in_port("threshold", "float");
    });

    let ann = harness
        .ports
        .lock()
        .unwrap()
        .build_announce(mocks::TEST_DEVICE_ID, "2025-06-01T10:00:00Z");
    let v: Value = serde_json::from_str(&ann).unwrap();
    assert_eq!(v["type"], "ports.announce");
    assert_eq!(v["inports"][0]["name"], "threshold");
    assert!(v["outports"].as_array().unwrap().is_empty());
}
