//! The capability contract — the boundary every Tool plugs into.
//!
//! A Tool is a named, remotely invokable device action with a declared
//! parameter schema. The registry owns tools as boxed trait objects and
//! never looks inside them: `describe` yields the schema fragment for the
//! announce document, `invoke` performs the action and fills an
//! [`ObservationBuilder`]. Hardware state lives entirely inside the
//! concrete Tool.

use serde_json::{Map, Value, json};

use crate::transport::http::HttpRoutes;

/// Remotely invokable device capability.
///
/// `invoke` runs on the dispatch worker thread and may block for as long
/// as the action takes; it must never touch the MQTT session directly.
/// Returning `false` signals failure — the builder's contents (error or
/// partial result) are forwarded verbatim either way.
pub trait Tool: Send {
    /// One-time hardware/state initialisation at boot. A failure is
    /// logged by the registry and the tool stays registered but broken —
    /// invocations may then report their own errors.
    fn init(&mut self) -> bool {
        true
    }

    /// Unique capability name (exact-match dispatch key).
    fn name(&self) -> &'static str;

    /// Fill `tool` with this capability's announce entry: `name`,
    /// `description`, and a JSON-schema-like `parameters` object.
    fn describe(&self, tool: &mut Map<String, Value>);

    /// Execute the action with the given arguments.
    fn invoke(&mut self, args: &Value, out: &mut ObservationBuilder) -> bool;

    /// Register capability-specific local HTTP endpoints (e.g. an asset
    /// download path). Default: none.
    fn register_http(&mut self, _routes: &mut HttpRoutes) {}
}

// ---------------------------------------------------------------------------
// Observation builder
// ---------------------------------------------------------------------------

/// Builds one `device.observation` envelope per invocation.
///
/// Starts out as a failed observation with an empty result so that every
/// path — including a tool that returns `false` without touching the
/// builder — serializes to something the orchestrator can parse.
#[derive(Debug)]
pub struct ObservationBuilder {
    doc: Map<String, Value>,
}

impl ObservationBuilder {
    pub fn new() -> Self {
        let mut doc = Map::new();
        doc.insert("type".into(), json!("device.observation"));
        doc.insert("ok".into(), json!(false));
        doc.insert("result".into(), json!({ "text": "", "assets": [] }));
        Self { doc }
    }

    pub fn set_request_id(&mut self, rid: &str) {
        self.doc.insert("request_id".into(), json!(rid));
    }

    /// Mark the observation failed with a structured error.
    pub fn error(&mut self, code: &str, message: &str) {
        self.doc.insert("ok".into(), json!(false));
        self.doc
            .insert("error".into(), json!({ "code": code, "message": message }));
    }

    pub fn set_text(&mut self, text: &str) {
        if let Some(result) = self.doc.get_mut("result") {
            result["text"] = json!(text);
        }
    }

    /// Append an asset entry and return a handle to fill it in.
    pub fn add_asset(&mut self, asset: Value) {
        if let Some(assets) = self
            .doc
            .get_mut("result")
            .and_then(|r| r.get_mut("assets"))
            .and_then(Value::as_array_mut)
        {
            assets.push(asset);
        }
    }

    /// Mark the observation successful with a result text.
    pub fn success(&mut self, text: &str) {
        self.doc.insert("ok".into(), json!(true));
        self.set_text(text);
    }

    pub fn is_ok(&self) -> bool {
        self.doc.get("ok").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&Value::Object(self.doc.clone())).unwrap_or_default()
    }
}

impl Default for ObservationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
