//! Port registry — named device data channels.
//!
//! Two kinds of port:
//! - **OutPort**: a scheduled emitter. The foreground loop calls
//!   [`PortRegistry::tick_all`] on every iteration; each OutPort decides
//!   internally whether its period elapsed and pushes a sample through
//!   the emitter callback.
//! - **InPort**: a passive variable slot, written by inbound `ports/set`
//!   messages and read by Tool logic on the worker thread. Values are
//!   stored as f32 bit patterns in an `AtomicU32` — last-writer-wins
//!   with no torn reads, and no lock shared with the transport session.
//!
//! Ports are registered once at boot before any concurrent access
//! begins; afterwards the registry is structurally read-only and only
//! InPort values mutate.

use core::sync::atomic::{AtomicU32, Ordering};

use log::{info, warn};
use serde_json::{Map, Value, json};

/// Callback an OutPort uses to push one sample. Returns `false` when the
/// sample was dropped (session down) — the port just carries on.
pub type PortEmitter<'a> = &'a mut dyn FnMut(&str, f32) -> bool;

/// Scheduled data emitter.
pub trait OutPort: Send {
    /// Unique port name.
    fn name(&self) -> &'static str;

    /// Fill `port` with this port's announce entry.
    fn describe(&self, port: &mut Map<String, Value>);

    /// Emission period in milliseconds.
    fn period_ms(&self) -> u32;

    /// Called on every foreground tick with the current uptime; the port
    /// tracks its own last-emission time and pushes through `emit` when
    /// due.
    fn tick(&mut self, now_ms: u64, emit: PortEmitter<'_>);
}

/// Passive variable slot settable from the orchestrator side.
pub struct InPort {
    name: String,
    data_type: String,
    value_bits: AtomicU32,
}

impl InPort {
    fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            value_bits: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.value_bits.load(Ordering::Relaxed))
    }

    fn set_value(&self, value: f32) {
        self.value_bits.store(value.to_bits(), Ordering::Relaxed);
    }

    fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "type": "inport",
            "data_type": self.data_type,
            "description": "General-purpose variable slot",
        })
    }
}

// ---------------------------------------------------------------------------
// PortRegistry
// ---------------------------------------------------------------------------

pub struct PortRegistry {
    outports: Vec<Box<dyn OutPort>>,
    inports: Vec<InPort>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self {
            outports: Vec::new(),
            inports: Vec::new(),
        }
    }

    pub fn add_out_port(&mut self, port: Box<dyn OutPort>) {
        info!("Ports: registered outport '{}'", port.name());
        self.outports.push(port);
    }

    pub fn create_in_port(&mut self, name: &str, data_type: &str) {
        if self.inports.iter().any(|p| p.name == name) {
            warn!("Ports: duplicate inport name '{name}' rejected");
            return;
        }
        info!("Ports: created inport '{name}' ({data_type})");
        self.inports.push(InPort::new(name, data_type));
    }

    pub fn outport_count(&self) -> usize {
        self.outports.len()
    }

    pub fn inport_count(&self) -> usize {
        self.inports.len()
    }

    /// Apply an inbound `ports/set` write. Unknown names are logged and
    /// dropped — no observation is produced for port writes.
    pub fn set_in_port(&self, name: &str, value: f32) {
        match self.inports.iter().find(|p| p.name == name) {
            Some(p) => {
                p.set_value(value);
                info!("Ports: inport '{name}' set to {value:.3}");
            }
            None => warn!("Ports: inport '{name}' not found"),
        }
    }

    /// Current InPort value, readable from any context.
    pub fn in_port_value(&self, name: &str) -> Option<f32> {
        self.inports.iter().find(|p| p.name == name).map(InPort::value)
    }

    /// Drive every OutPort once. Foreground loop only.
    pub fn tick_all(&mut self, now_ms: u64, emit: PortEmitter<'_>) {
        for p in &mut self.outports {
            p.tick(now_ms, emit);
        }
    }

    /// Build the retained `ports.announce` document.
    pub fn build_announce(&self, device_id: &str, timestamp: &str) -> String {
        let mut doc = Map::new();
        doc.insert("type".into(), json!("ports.announce"));
        doc.insert("device_id".into(), json!(device_id));
        doc.insert("timestamp".into(), json!(timestamp));

        let mut out_entries = Vec::with_capacity(self.outports.len());
        for p in &self.outports {
            let mut entry = Map::new();
            p.describe(&mut entry);
            out_entries.push(Value::Object(entry));
        }
        doc.insert("outports".into(), Value::Array(out_entries));

        let in_entries: Vec<Value> = self.inports.iter().map(InPort::describe).collect();
        doc.insert("inports".into(), Value::Array(in_entries));

        serde_json::to_string(&Value::Object(doc)).unwrap_or_default()
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}
