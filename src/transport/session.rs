//! MQTT session abstraction.
//!
//! Concrete implementations:
//! - ESP-IDF MQTT client (see `adapters::mqtt`)
//! - [`SimSession`] — an in-memory broker double for host tests
//!
//! The bridge, dispatch worker, and HTTP handlers are generic over
//! `MqttSession`, so swapping the platform client requires zero changes
//! to the protocol logic. The session object itself is NOT safe for
//! concurrent use — every caller goes through the bridge's mutex.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::CommsError;

/// Connection parameters, including the retained last-will registration.
#[derive(Debug, Clone)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub host: &'a str,
    pub port: u16,
    /// Topic the broker publishes the will on (the status topic).
    pub will_topic: &'a str,
    /// Will payload: an offline status envelope, retained by the broker.
    pub will_payload: &'a str,
}

/// One message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Poll-style MQTT session.
pub trait MqttSession: Send {
    /// Open the session, registering the retained last-will first so an
    /// unexpected drop is observable without a heartbeat timeout.
    fn connect(&mut self, opts: &ConnectOptions<'_>) -> Result<(), CommsError>;

    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, topic: &str) -> Result<(), CommsError>;

    /// Publish one message. At-most-once from the caller's perspective:
    /// failures are reported, never queued for retry.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), CommsError>;

    /// Service the connection (keep-alive) and return the next pending
    /// inbound message, if any. Non-blocking.
    fn service(&mut self) -> Option<InboundMessage>;

    fn disconnect(&mut self);
}

// ---------------------------------------------------------------------------
// Simulation session (host targets and tests)
// ---------------------------------------------------------------------------

/// Broker-side state of the simulated session.
#[derive(Default)]
pub struct SimState {
    connected: bool,
    /// Next `connect` calls that should fail, counted down.
    fail_connects: u32,
    subscriptions: Vec<String>,
    /// Every publish in order: (topic, payload, retain).
    published: Vec<(String, Vec<u8>, bool)>,
    /// Broker-side retained store.
    retained: HashMap<String, Vec<u8>>,
    /// Last-will registered at connect time: (topic, payload).
    will: Option<(String, String)>,
    inbound: VecDeque<InboundMessage>,
}

/// In-memory broker double.
///
/// Records every publish, tracks retained payloads per topic the way a
/// broker would (empty retained payload deletes the entry), and lets
/// tests inject inbound messages and force connect failures. Clone a
/// [`SimBrokerHandle`] before handing the session to the bridge — the
/// handle shares the same broker state.
pub struct SimSession {
    state: Arc<Mutex<SimState>>,
}

/// Test-side handle onto a [`SimSession`]'s broker state.
#[derive(Clone)]
pub struct SimBrokerHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimSession {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    pub fn handle(&self) -> SimBrokerHandle {
        SimBrokerHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("sim session state")
    }
}

impl Default for SimSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBrokerHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("sim broker state")
    }

    /// Queue an inbound message as if the broker delivered it.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        self.lock().inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().fail_connects = n;
    }

    /// Simulate an unexpected session drop: the broker publishes the
    /// retained last-will on the status topic.
    pub fn drop_session(&self) {
        let mut state = self.lock();
        state.connected = false;
        if let Some((topic, payload)) = state.will.clone() {
            state.retained.insert(topic, payload.into_bytes());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Topics published to since construction, in order.
    pub fn publish_order(&self) -> Vec<String> {
        self.lock().published.iter().map(|(t, _, _)| t.clone()).collect()
    }

    /// All publishes so far: (topic, payload, retain).
    pub fn published(&self) -> Vec<(String, Vec<u8>, bool)> {
        self.lock().published.clone()
    }

    /// Forget recorded publishes (not the retained store).
    pub fn clear_published(&self) {
        self.lock().published.clear();
    }

    /// Broker-held retained payload for a topic.
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.lock().retained.get(topic).cloned()
    }

    pub fn retained_is_empty(&self) -> bool {
        self.lock().retained.is_empty()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    pub fn will(&self) -> Option<(String, String)> {
        self.lock().will.clone()
    }
}

impl MqttSession for SimSession {
    fn connect(&mut self, opts: &ConnectOptions<'_>) -> Result<(), CommsError> {
        let mut state = self.lock();
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(CommsError::MqttConnectFailed);
        }
        state.connected = true;
        state.will = Some((opts.will_topic.to_string(), opts.will_payload.to_string()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), CommsError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(CommsError::MqttNotConnected);
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), CommsError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(CommsError::MqttNotConnected);
        }
        if retain {
            if payload.is_empty() {
                state.retained.remove(topic);
            } else {
                state.retained.insert(topic.to_string(), payload.to_vec());
            }
        }
        state
            .published
            .push((topic.to_string(), payload.to_vec(), retain));
        Ok(())
    }

    fn service(&mut self) -> Option<InboundMessage> {
        let mut state = self.lock();
        if !state.connected {
            return None;
        }
        state.inbound.pop_front()
    }

    fn disconnect(&mut self) {
        // Clean disconnect: the broker discards the will.
        let mut state = self.lock();
        state.will = None;
        state.connected = false;
    }
}
