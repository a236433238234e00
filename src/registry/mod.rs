//! Capability registry — the set of Tools a device exposes.
//!
//! ```text
//!   cmd topic ──▶ Dispatch worker ──▶ ToolRegistry::dispatch ──▶ Tool::invoke
//!                                          │
//!   announce topic ◀── TransportBridge ◀── build_announce
//! ```
//!
//! Populated once at boot (before any concurrent access), read-only
//! afterwards. The registry holds no hardware state of its own; it owns
//! the tools as boxed trait objects and routes by exact name match.

pub mod ports;
pub mod tool;

use log::{error, info, warn};
use serde_json::{Map, Value, json};

use crate::protocol::envelope::CommandEnvelope;
use tool::{ObservationBuilder, Tool};

/// Error observation code for an unknown tool name.
pub const ERR_UNSUPPORTED_TOOL: &str = "unsupported_tool";

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a capability. Duplicate names are a configuration error:
    /// the new registration is rejected and logged, the existing one
    /// stays, and the process carries on.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            error!(
                "Registry: duplicate tool name '{}' rejected (first registration wins)",
                tool.name()
            );
            return;
        }
        info!("Registry: registered tool '{}'", tool.name());
        self.tools.push(tool);
    }

    /// One-time init pass over every registered tool. Individual
    /// failures are logged and non-fatal; returns `false` if any tool
    /// failed.
    pub fn init_all(&mut self) -> bool {
        let mut all_ok = true;
        for t in &mut self.tools {
            if !t.init() {
                warn!("Registry: tool '{}' failed to init", t.name());
                all_ok = false;
            }
        }
        all_ok
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Iterate tools mutably (boot-time HTTP route registration).
    pub fn tools_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Tool>> {
        self.tools.iter_mut()
    }

    /// Build the `device.announce` document: identity, reachable base
    /// address, and every capability's self-description. Regenerated on
    /// every call — never cached — so identity or address changes are
    /// always reflected.
    pub fn build_announce(&self, device_id: &str, http_base: &str) -> String {
        let mut doc = Map::new();
        doc.insert("type".into(), json!("device.announce"));
        doc.insert("device_id".into(), json!(device_id));
        doc.insert("http_base".into(), json!(http_base));

        let mut entries = Vec::with_capacity(self.tools.len());
        for t in &self.tools {
            let mut entry = Map::new();
            t.describe(&mut entry);
            entries.push(Value::Object(entry));
        }
        doc.insert("tools".into(), Value::Array(entries));

        serde_json::to_string(&Value::Object(doc)).unwrap_or_default()
    }

    /// Route a decoded command envelope to the matching tool.
    ///
    /// Returns `(invoked_ok, observation_json)`. On a name miss the
    /// observation carries [`ERR_UNSUPPORTED_TOOL`] and nothing is
    /// invoked. On a hit, whatever the tool produced is forwarded
    /// verbatim — including a `false` return with a populated payload.
    /// Runs synchronously in the caller's context; the dispatch worker
    /// is the only production caller.
    pub fn dispatch(&mut self, cmd: &CommandEnvelope, fallback_request_id: &str) -> (bool, String) {
        let mut ob = ObservationBuilder::new();
        ob.set_request_id(if cmd.request_id.is_empty() {
            fallback_request_id
        } else {
            &cmd.request_id
        });

        let Some(target) = self.tools.iter_mut().find(|t| t.name() == cmd.tool) else {
            warn!("Registry: tool '{}' not found", cmd.tool);
            ob.error(ERR_UNSUPPORTED_TOOL, "tool not found");
            return (false, ob.to_json());
        };

        info!("Registry: invoking tool '{}'", cmd.tool);
        let ok = target.invoke(&cmd.args, &mut ob);
        (ok, ob.to_json())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
