//! Wire protocol — topic layout and JSON payload envelopes.
//!
//! Everything that crosses the MQTT session is defined here: the
//! per-device topic set and the command / observation / status / port
//! payload shapes. The registry and bridge build on these; nothing in
//! this module touches the network itself.

pub mod envelope;
pub mod topics;
