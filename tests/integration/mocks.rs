//! Mock tools, storage, and a ready-made device harness.
//!
//! Records every invocation so tests can assert on side effects (or
//! their absence) without real hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};

use caphost::StorageError;
use caphost::provisioning::service::StoragePort;
use caphost::registry::ToolRegistry;
use caphost::registry::ports::PortRegistry;
use caphost::registry::tool::{ObservationBuilder, Tool};
use caphost::transport::bridge::{DeviceIdentity, StatusSnapshot, TransportBridge};
use caphost::transport::session::{SimBrokerHandle, SimSession};

// ── Mock camera tool (always succeeds) ────────────────────────

pub struct MockCameraTool {
    pub captures: Arc<AtomicU32>,
}

impl MockCameraTool {
    pub fn new() -> Self {
        Self {
            captures: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl Tool for MockCameraTool {
    fn name(&self) -> &'static str {
        "capture_image"
    }

    fn describe(&self, tool: &mut Map<String, Value>) {
        tool.insert("name".into(), json!(self.name()));
        tool.insert("description".into(), json!("Mock camera (test double)."));
        tool.insert(
            "parameters".into(),
            json!({ "type": "object", "properties": {
                "quality": { "type": "string" },
                "flash": { "type": "string" },
            }}),
        );
    }

    fn invoke(&mut self, args: &Value, out: &mut ObservationBuilder) -> bool {
        let quality = args.get("quality").and_then(Value::as_str).unwrap_or("mid");
        self.captures.fetch_add(1, Ordering::SeqCst);
        out.add_asset(json!({ "url": "/camera/last", "mime": "image/jpeg" }));
        out.success(&format!("captured ({quality})"));
        true
    }
}

// ── Side-effect probe (must NOT run on dispatch misses) ───────

pub struct SideEffectTool {
    pub invocations: Arc<AtomicU32>,
}

impl SideEffectTool {
    pub fn new() -> (Self, Arc<AtomicU32>) {
        let counter = Arc::new(AtomicU32::new(0));
        (
            Self {
                invocations: Arc::clone(&counter),
            },
            counter,
        )
    }
}

impl Tool for SideEffectTool {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn describe(&self, tool: &mut Map<String, Value>) {
        tool.insert("name".into(), json!(self.name()));
        tool.insert("parameters".into(), json!({ "type": "object" }));
    }

    fn invoke(&mut self, _args: &Value, out: &mut ObservationBuilder) -> bool {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        out.success("probed");
        true
    }
}

// ── Slow tool (worker monopolization / backpressure) ──────────

pub struct SlowTool {
    pub delay_ms: u64,
    pub completed: Arc<AtomicU32>,
}

impl SlowTool {
    pub fn new(delay_ms: u64) -> (Self, Arc<AtomicU32>) {
        let counter = Arc::new(AtomicU32::new(0));
        (
            Self {
                delay_ms,
                completed: Arc::clone(&counter),
            },
            counter,
        )
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn describe(&self, tool: &mut Map<String, Value>) {
        tool.insert("name".into(), json!(self.name()));
        tool.insert("parameters".into(), json!({ "type": "object" }));
    }

    fn invoke(&mut self, _args: &Value, out: &mut ObservationBuilder) -> bool {
        std::thread::sleep(std::time::Duration::from_millis(self.delay_ms));
        self.completed.fetch_add(1, Ordering::SeqCst);
        out.success("finally");
        true
    }
}

// ── Recorder tool (FIFO ordering) ─────────────────────────────

pub struct RecorderTool {
    pub seen: Arc<Mutex<Vec<i64>>>,
}

impl RecorderTool {
    pub fn new() -> (Self, Arc<Mutex<Vec<i64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                seen: Arc::clone(&seen),
            },
            seen,
        )
    }
}

impl Tool for RecorderTool {
    fn name(&self) -> &'static str {
        "record"
    }

    fn describe(&self, tool: &mut Map<String, Value>) {
        tool.insert("name".into(), json!(self.name()));
        tool.insert("parameters".into(), json!({ "type": "object" }));
    }

    fn invoke(&mut self, args: &Value, out: &mut ObservationBuilder) -> bool {
        let n = args.get("n").and_then(Value::as_i64).unwrap_or(-1);
        self.seen.lock().unwrap().push(n);
        out.success(&format!("recorded {n}"));
        true
    }
}

// ── In-memory storage ─────────────────────────────────────────

pub struct MemStore {
    map: HashMap<String, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

impl StoragePort for MemStore {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.map.get(&format!("{ns}::{key}")) {
            Some(v) => {
                let n = v.len().min(buf.len());
                buf[..n].copy_from_slice(&v[..n]);
                Ok(n)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.map.insert(format!("{ns}::{key}"), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.map.remove(&format!("{ns}::{key}"));
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.map.contains_key(&format!("{ns}::{key}"))
    }
}

// ── Device harness ────────────────────────────────────────────

pub const TEST_DEVICE_ID: &str = "dev-TEST01";
pub const TEST_HTTP_BASE: &str = "http://192.168.0.42";

pub struct Harness {
    pub bridge: Arc<TransportBridge<SimSession>>,
    pub broker: SimBrokerHandle,
    pub tools: Arc<Mutex<ToolRegistry>>,
    pub ports: Arc<Mutex<PortRegistry>>,
    pub identity: Arc<DeviceIdentity>,
}

/// Build a connected-ready device: registries populated with `register`,
/// bridge wired to a fresh simulated broker.
pub fn make_harness(register: impl FnOnce(&mut ToolRegistry, &mut PortRegistry)) -> Harness {
    let mut registry = ToolRegistry::new();
    let mut port_registry = PortRegistry::new();
    register(&mut registry, &mut port_registry);

    let tools = Arc::new(Mutex::new(registry));
    let ports = Arc::new(Mutex::new(port_registry));

    let identity = Arc::new(DeviceIdentity::new(TEST_DEVICE_ID.to_string()));
    identity.set_http_base(TEST_HTTP_BASE);

    let session = SimSession::new();
    let broker = session.handle();
    let bridge = Arc::new(TransportBridge::new(
        session,
        Arc::clone(&identity),
        "broker.local".to_string(),
        1883,
        Arc::clone(&tools),
        Arc::clone(&ports),
    ));

    Harness {
        bridge,
        broker,
        tools,
        ports,
        identity,
    }
}

pub fn snap(uptime_ms: u64) -> StatusSnapshot {
    StatusSnapshot {
        uptime_ms,
        rssi: -58,
        ts: "2025-06-01T10:00:00Z".to_string(),
    }
}

/// Build a raw `device.command` payload.
pub fn command_payload(request_id: &str, tool: &str, args: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "type": "device.command",
        "request_id": request_id,
        "tool": tool,
        "args": args,
    }))
    .unwrap()
}

/// Events published on the harness's events topic, parsed.
pub fn published_events(harness: &Harness) -> Vec<Value> {
    harness
        .broker
        .published()
        .into_iter()
        .filter(|(topic, _, _)| topic == &harness.bridge.topics().events)
        .map(|(_, payload, _)| serde_json::from_slice(&payload).unwrap())
        .collect()
}
