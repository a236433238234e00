//! ESP-IDF MQTT session adapter.
//!
//! Wraps `esp_idf_svc`'s MQTT client behind the poll-style
//! [`MqttSession`] trait: the client's event callback pushes inbound
//! messages and connection-state changes into an internal queue, and
//! `service()` drains it from the foreground loop. The callback runs on
//! the client's own task, so the shared pieces are a mutex-guarded deque
//! and an atomic connected flag — nothing else crosses the boundary.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use esp_idf_svc::mqtt::client::{
    EspMqttClient, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
};
use log::{info, warn};

use crate::error::CommsError;
use crate::transport::session::{ConnectOptions, InboundMessage, MqttSession};

/// Outbound/inbound buffer size handed to the IDF client.
const MQTT_BUFFER_SIZE: usize = 2048;

pub struct EspMqttSession {
    client: Option<EspMqttClient<'static>>,
    connected: Arc<AtomicBool>,
    inbound: Arc<Mutex<VecDeque<InboundMessage>>>,
}

impl EspMqttSession {
    pub fn new() -> Self {
        Self {
            client: None,
            connected: Arc::new(AtomicBool::new(false)),
            inbound: Arc::new(Mutex::new(VecDeque::new())),
        }
    }
}

impl Default for EspMqttSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttSession for EspMqttSession {
    fn connect(&mut self, opts: &ConnectOptions<'_>) -> Result<(), CommsError> {
        let url = format!("mqtt://{}:{}", opts.host, opts.port);

        let conf = MqttClientConfiguration {
            client_id: Some(opts.client_id),
            lwt: Some(LwtConfiguration {
                topic: opts.will_topic,
                payload: opts.will_payload.as_bytes(),
                qos: QoS::AtMostOnce,
                retain: true,
            }),
            buffer_size: MQTT_BUFFER_SIZE,
            out_buffer_size: MQTT_BUFFER_SIZE,
            ..Default::default()
        };

        let connected = Arc::clone(&self.connected);
        let inbound = Arc::clone(&self.inbound);

        let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => {
                info!("MQTT: session up");
                connected.store(true, Ordering::Release);
            }
            EventPayload::Disconnected => {
                warn!("MQTT: session down");
                connected.store(false, Ordering::Release);
            }
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => {
                if let Ok(mut q) = inbound.lock() {
                    q.push_back(InboundMessage {
                        topic: topic.to_string(),
                        payload: data.to_vec(),
                    });
                }
            }
            EventPayload::Error(e) => warn!("MQTT: client error ({e})"),
            _ => {}
        })
        .map_err(|_| CommsError::MqttConnectFailed)?;

        self.client = Some(client);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), CommsError> {
        let client = self.client.as_mut().ok_or(CommsError::MqttNotConnected)?;
        client
            .subscribe(topic, QoS::AtMostOnce)
            .map(|_| ())
            .map_err(|_| CommsError::MqttSubscribeFailed)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), CommsError> {
        if !self.is_connected() {
            return Err(CommsError::MqttNotConnected);
        }
        let client = self.client.as_mut().ok_or(CommsError::MqttNotConnected)?;
        client
            .publish(topic, QoS::AtMostOnce, retain, payload)
            .map(|_| ())
            .map_err(|_| CommsError::MqttPublishFailed)
    }

    fn service(&mut self) -> Option<InboundMessage> {
        // The IDF client services keep-alive on its own task; this side
        // only drains the inbound queue.
        self.inbound.lock().ok()?.pop_front()
    }

    fn disconnect(&mut self) {
        // Dropping the client tears the session down cleanly (the broker
        // discards the will on a clean disconnect).
        self.client = None;
        self.connected.store(false, Ordering::Release);
    }
}
