//! Transport layer — the MQTT session, the bridge that owns it, and the
//! local HTTP status surface.
//!
//! | Piece     | Role                                                  |
//! |-----------|-------------------------------------------------------|
//! | `session` | `MqttSession` trait + in-memory simulation double     |
//! | `bridge`  | connect sequence, retained publishes, periodic resync |
//! | `http`    | run-mode HTTP surface as explicit request types       |

pub mod bridge;
pub mod http;
pub mod session;
