//! Provisioning state machine.
//!
//! Two modes, no terminal state:
//!
//! ```text
//!            ┌── config incomplete, or STA join failed ──┐
//!   boot ────┤                                           ▼
//!            │                                     ┌───────────┐
//!            └── minimum config + STA joined ──▶   │ Provision │
//!                          │                       │ (AP +     │
//!                          ▼                       │  portal)  │
//!                    ┌─────────┐    save+restart   └───────────┘
//!                    │   Run   │ ◀────(fresh boot)──────┘
//!                    └─────────┘
//! ```
//!
//! `Run` is left only through an explicit restart (provisioning save or
//! factory reset); link loss and broker loss are recovered in place by
//! periodic retries. The portal runs entirely in the foreground loop —
//! no worker exists before a configuration does.

pub mod portal;
pub mod service;

use crate::config::DeviceConfig;

/// Fixed passphrase of the setup access point.
pub const AP_PASSPHRASE: &str = "12345678";
/// Bounded station-join timeout at boot before falling back to Provision.
pub const STA_JOIN_TIMEOUT_MS: u64 = 30_000;

/// Which half of the state machine the device is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Provision,
    Run,
}

/// Boot-time mode decision: run mode requires the minimum configuration
/// (WiFi credentials and a broker host). Everything else falls back to
/// provisioning.
pub fn boot_mode(cfg: &DeviceConfig) -> RunMode {
    if cfg.has_minimum() {
        RunMode::Run
    } else {
        RunMode::Provision
    }
}
