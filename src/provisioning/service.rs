//! Configuration persistence over the opaque storage port.
//!
//! The connection configuration is one postcard blob in the `mcp`
//! namespace, written as a group on provisioning save and erased on
//! factory reset. A missing or corrupt blob degrades to defaults — the
//! boot decision then lands in provisioning mode, which is the correct
//! recovery for both cases.

use log::{info, warn};

use crate::config::DeviceConfig;
use crate::error::StorageError;

pub const CONFIG_NAMESPACE: &str = "mcp";
pub const CONFIG_KEY: &str = "conncfg";

/// Largest config blob we will read back.
const MAX_BLOB_SIZE: usize = 512;

/// Persistent key-value storage (NVS on the device, in-memory map on the
/// host). Write operations must be atomic — no partial state on power
/// loss.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

/// Load the connection configuration, defaulting on first boot or a
/// corrupt blob.
pub fn load_config(store: &impl StoragePort) -> DeviceConfig {
    let mut buf = [0u8; MAX_BLOB_SIZE];
    match store.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
        Ok(len) => match postcard::from_bytes::<DeviceConfig>(&buf[..len]) {
            Ok(cfg) => {
                info!("Provisioning: config loaded ({len} bytes)");
                cfg
            }
            Err(_) => {
                warn!("Provisioning: stored config corrupt, using defaults");
                DeviceConfig::default()
            }
        },
        Err(StorageError::NotFound) => {
            info!("Provisioning: no stored config, using defaults");
            DeviceConfig::default()
        }
        Err(e) => {
            warn!("Provisioning: config read failed ({e}), using defaults");
            DeviceConfig::default()
        }
    }
}

/// Persist the connection configuration as one atomic blob.
pub fn save_config(
    store: &mut impl StoragePort,
    cfg: &DeviceConfig,
) -> Result<(), StorageError> {
    let bytes = postcard::to_allocvec(cfg).map_err(|_| StorageError::IoError)?;
    store.write(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)?;
    info!("Provisioning: config saved ({} bytes)", bytes.len());
    Ok(())
}

/// Erase the persisted configuration (factory reset). The next boot
/// re-enters provisioning mode.
pub fn clear_config(store: &mut impl StoragePort) {
    if let Err(e) = store.delete(CONFIG_NAMESPACE, CONFIG_KEY) {
        warn!("Provisioning: config erase failed ({e})");
    } else {
        info!("Provisioning: config erased");
    }
}

/// Whether a configuration blob exists at all.
pub fn has_stored_config(store: &impl StoragePort) -> bool {
    store.exists(CONFIG_NAMESPACE, CONFIG_KEY)
}
