//! Transport bridge protocol semantics: connect sequencing, retention,
//! reconnect ordering, clear/reannounce idempotence, operator HTTP
//! surface.

use caphost::transport::http::{FollowUp, StatusRequest, handle_status_request};

use crate::mocks::{self, MockCameraTool};

fn connected_harness() -> mocks::Harness {
    let harness = mocks::make_harness(|tools, ports| {
        tools.register(Box::new(MockCameraTool::new()));
        ports.create_in_port("brightness", "float");
    });
    harness.bridge.connect(&mocks::snap(0)).unwrap();
    harness
}

#[test]
fn connect_leaves_retained_announce_and_ports_announce() {
    let harness = connected_harness();
    let topics = harness.bridge.topics();

    assert!(harness.broker.retained(&topics.announce).is_some());
    assert!(harness.broker.retained(&topics.ports_announce).is_some());
    // Status itself is not retained; only the will copy would be.
    assert!(harness.broker.retained(&topics.status).is_none());
}

/// Scenario C: after an unexpected session drop, the reconnect
/// republishes announce (retained) before the next status.
#[test]
fn reconnect_republishes_announce_before_status() {
    let harness = connected_harness();
    let topics = harness.bridge.topics().clone();

    harness.broker.drop_session();
    assert!(!harness.bridge.is_connected());
    // The broker now holds the offline will as the retained status.
    let will = harness.broker.retained(&topics.status).unwrap();
    assert!(String::from_utf8(will).unwrap().contains(r#""online":false"#));

    harness.broker.clear_published();
    harness.bridge.connect(&mocks::snap(60_000)).unwrap();

    let order = harness.broker.publish_order();
    let announce_at = order.iter().position(|t| t == &topics.announce).unwrap();
    let status_at = order.iter().position(|t| t == &topics.status).unwrap();
    assert!(announce_at < status_at);
}

/// Clear-retained followed by reannounce restores identical announce
/// content.
#[test]
fn clear_then_reannounce_is_idempotent() {
    let harness = connected_harness();
    let topics = harness.bridge.topics().clone();

    let before = harness.broker.retained(&topics.announce).unwrap();

    harness.bridge.clear_retained().unwrap();
    assert!(harness.broker.retained(&topics.announce).is_none());

    harness.bridge.publish_announce().unwrap();
    harness
        .bridge
        .publish_ports_announce("2025-06-01T10:00:00Z")
        .unwrap();

    let after = harness.broker.retained(&topics.announce).unwrap();
    assert_eq!(before, after);
}

/// A connect failure is reported, not fatal; the next attempt succeeds.
#[test]
fn connect_failure_is_retryable() {
    let harness = mocks::make_harness(|tools, _| {
        tools.register(Box::new(MockCameraTool::new()));
    });
    harness.broker.fail_next_connects(1);

    assert!(harness.bridge.connect(&mocks::snap(0)).is_err());
    assert!(!harness.bridge.is_connected());

    assert!(harness.bridge.connect(&mocks::snap(3000)).is_ok());
    assert!(harness.bridge.is_connected());
}

/// A new reachable address shows up in the next announce without a
/// restart.
#[test]
fn announce_follows_http_base_changes() {
    let harness = connected_harness();
    let topics = harness.bridge.topics().clone();

    harness.identity.set_http_base("http://10.1.1.9");
    harness.bridge.publish_announce().unwrap();

    let ann = harness.broker.retained(&topics.announce).unwrap();
    assert!(String::from_utf8(ann).unwrap().contains("http://10.1.1.9"));
}

// ── Operator HTTP surface ─────────────────────────────────────

#[test]
fn status_endpoints_return_503_when_session_down() {
    let harness = mocks::make_harness(|tools, _| {
        tools.register(Box::new(MockCameraTool::new()));
    });

    for req in [
        StatusRequest::StatusNow,
        StatusRequest::Reannounce,
        StatusRequest::ClearRetained,
    ] {
        let (reply, follow) = handle_status_request(req, &harness.bridge, &mocks::snap(0));
        assert_eq!(reply.status, 503, "{req:?}");
        assert_eq!(follow, FollowUp::None);
    }
}

#[test]
fn status_now_forces_immediate_publish() {
    let harness = connected_harness();
    harness.broker.clear_published();

    let (reply, _) =
        handle_status_request(StatusRequest::StatusNow, &harness.bridge, &mocks::snap(5000));
    assert_eq!(reply.status, 200);

    let order = harness.broker.publish_order();
    assert_eq!(order, vec![harness.bridge.topics().status.clone()]);
}

#[test]
fn reannounce_refreshes_both_retained_documents() {
    let harness = connected_harness();
    harness.bridge.clear_retained().unwrap();

    let (reply, _) =
        handle_status_request(StatusRequest::Reannounce, &harness.bridge, &mocks::snap(0));
    assert_eq!(reply.status, 200);

    let topics = harness.bridge.topics();
    assert!(harness.broker.retained(&topics.announce).is_some());
    assert!(harness.broker.retained(&topics.ports_announce).is_some());
}

#[test]
fn help_works_even_when_disconnected() {
    let harness = mocks::make_harness(|_, _| {});
    let (reply, follow) = handle_status_request(StatusRequest::Help, &harness.bridge, &mocks::snap(0));
    assert_eq!(reply.status, 200);
    assert_eq!(follow, FollowUp::None);
    assert!(String::from_utf8(reply.body).unwrap().contains("/reannounce"));
}

/// Scenario E (broker side): factory reset wipes retained state and
/// requests the reset follow-up.
#[test]
fn factory_reset_clears_retained_and_requests_follow_up() {
    let harness = connected_harness();
    assert!(!harness.broker.retained_is_empty());

    let (reply, follow) =
        handle_status_request(StatusRequest::FactoryReset, &harness.bridge, &mocks::snap(0));
    assert_eq!(reply.status, 200);
    assert_eq!(follow, FollowUp::FactoryReset);

    assert!(harness.broker.retained_is_empty());
    assert!(!harness.bridge.is_connected());
    // Clean disconnect: the will is discarded, so no stale offline
    // status reappears either.
    assert!(harness.broker.will().is_none());
}
