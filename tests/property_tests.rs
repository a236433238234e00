//! Property-based tests (host targets only).

#![cfg(not(target_os = "espidf"))]

use proptest::prelude::*;

use caphost::protocol::envelope::CommandEnvelope;
use caphost::protocol::topics::TopicSet;
use caphost::tools::expr;

proptest! {
    /// The evaluator is total: any ASCII input yields a finite value
    /// without panicking.
    #[test]
    fn evaluator_never_panics(input in "[ -~]{0,64}", theta in -10.0f32..10.0, t in 0.0f32..1000.0, i in 0i32..64) {
        let v = expr::eval(&input, theta, t, i);
        prop_assert!(v.is_finite());
    }

    /// Well-formed arithmetic round-trips through the parser the way
    /// f32 arithmetic would compute it.
    #[test]
    fn addition_matches_f32(a in 0.0f32..1000.0, b in 0.0f32..1000.0) {
        let e = format!("{a} + {b}");
        let v = expr::eval(&e, 0.0, 0.0, 0);
        prop_assert!((v - (a + b)).abs() < 0.01);
    }

    /// Comparison results are always exactly 0 or 1.
    #[test]
    fn comparisons_are_boolean(a in -100.0f32..100.0, b in -100.0f32..100.0) {
        for op in ["<", ">", "<=", ">=", "==", "!="] {
            let v = expr::eval(&format!("{a} {op} {b}"), 0.0, 0.0, 0);
            prop_assert!(v == 0.0 || v == 1.0, "{a} {op} {b} -> {v}");
        }
    }

    /// Clamping to a channel range never leaves 0–255.
    #[test]
    fn channel_clamp_stays_in_range(input in "[ -~]{0,32}") {
        let v = expr::eval(&input, 1.0, 2.0, 3).clamp(0.0, 255.0);
        prop_assert!((0.0..=255.0).contains(&v));
    }

    /// The envelope decoder never panics on arbitrary bytes and only
    /// accepts the device.command discriminator.
    #[test]
    fn envelope_decode_is_total(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        if let Some(env) = CommandEnvelope::decode(&payload) {
            prop_assert_eq!(env.kind, "device.command");
        }
    }

    /// Topic derivation is prefix-stable and injective in the device ID.
    #[test]
    fn topics_embed_device_id(id in "[a-zA-Z0-9-]{1,32}") {
        let t = TopicSet::new(&id);
        for topic in [&t.announce, &t.status, &t.cmd, &t.events, &t.ports_announce, &t.ports_data, &t.ports_set] {
            prop_assert!(topic.starts_with("mcp/dev/"));
            prop_assert!(topic.contains(&id));
        }
    }
}
