//! `uptime_live` OutPort — periodic uptime samples.
//!
//! Emits seconds-since-boot on a 5 s period. Doubles as the liveness
//! channel an orchestrator can chart without polling `status`.

use serde_json::{Map, Value, json};

use crate::registry::ports::{OutPort, PortEmitter};

const PERIOD_MS: u32 = 5_000;

pub struct UptimeOutPort {
    last_emit_ms: u64,
}

impl UptimeOutPort {
    pub fn new() -> Self {
        Self { last_emit_ms: 0 }
    }
}

impl Default for UptimeOutPort {
    fn default() -> Self {
        Self::new()
    }
}

impl OutPort for UptimeOutPort {
    fn name(&self) -> &'static str {
        "uptime_live"
    }

    fn describe(&self, port: &mut Map<String, Value>) {
        port.insert("name".into(), json!(self.name()));
        port.insert("type".into(), json!("outport"));
        port.insert("data_type".into(), json!("float"));
        port.insert("description".into(), json!("Seconds since boot"));
        port.insert("update_rate_hz".into(), json!(1000.0 / PERIOD_MS as f32));
    }

    fn period_ms(&self) -> u32 {
        PERIOD_MS
    }

    fn tick(&mut self, now_ms: u64, emit: PortEmitter<'_>) {
        if now_ms.saturating_sub(self.last_emit_ms) < u64::from(PERIOD_MS) {
            return;
        }
        self.last_emit_ms = now_ms;
        let _ = emit(self.name(), now_ms as f32 / 1000.0);
    }
}
