//! Adapters — concrete implementations of the port traits and the
//! platform-facing halves of the transport layer.
//!
//! | Adapter       | Implements / provides | Connects to                |
//! |---------------|-----------------------|----------------------------|
//! | `device_id`   | identity derivation   | eFuse factory MAC          |
//! | `nvs`         | StoragePort           | NVS / in-memory store      |
//! | `wifi`        | ConnectivityPort      | ESP-IDF WiFi STA + AP      |
//! | `time`        | Clock                 | esp_timer + system clock   |
//! | `mqtt`        | MqttSession           | ESP-IDF MQTT client        |
//! | `http_server` | HTTP surface wiring   | ESP-IDF HTTP server        |

pub mod device_id;
#[cfg(target_os = "espidf")]
pub mod http_server;
#[cfg(target_os = "espidf")]
pub mod mqtt;
pub mod nvs;
pub mod time;
pub mod wifi;
