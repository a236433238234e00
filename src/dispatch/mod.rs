//! Command dispatch core — bounded job queue plus one worker thread.
//!
//! ```text
//!   cmd topic ──▶ foreground loop ──▶ Dispatcher::enqueue (try_send, drop on full)
//!                                          │
//!                                    bounded queue (4 × 768 B)
//!                                          │
//!                                    worker thread (blocking recv)
//!                                          │
//!                      ToolRegistry::dispatch ──▶ asset URL rewrite ──▶ events topic
//! ```
//!
//! Commands are never executed in the network-servicing context: the
//! foreground loop only copies the payload into a fixed-size slot and
//! pushes it. Backpressure is drop-newest — a full queue or an oversized
//! payload costs a log line, never a blocked network loop, and no
//! observation is sent (the orchestrator times out client-side). Once a
//! job is dequeued it runs to completion; there is no cancellation.

use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::protocol::envelope::{CommandEnvelope, absolutize_asset_urls};
use crate::registry::ToolRegistry;
use crate::transport::bridge::{DeviceIdentity, TransportBridge};
use crate::transport::session::MqttSession;

/// Queue depth — matches the fixed RTOS queue of the reference design.
pub const JOB_QUEUE_DEPTH: usize = 4;
/// Fixed job slot size. Larger inbound payloads are dropped.
pub const JOB_PAYLOAD_MAX: usize = 768;

/// One queued command, copied verbatim off the wire.
pub struct Job {
    payload: heapless::Vec<u8, JOB_PAYLOAD_MAX>,
}

impl Job {
    fn from_payload(payload: &[u8]) -> Option<Self> {
        heapless::Vec::from_slice(payload)
            .ok()
            .map(|payload| Self { payload })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Producer handle used by the foreground loop.
pub struct Dispatcher {
    tx: SyncSender<Job>,
}

impl Dispatcher {
    /// Create the queue. The receiver half goes to the worker.
    pub fn new() -> (Self, Receiver<Job>) {
        let (tx, rx) = sync_channel(JOB_QUEUE_DEPTH);
        (Self { tx }, rx)
    }

    /// Copy `payload` into a job slot and push it. Never blocks.
    /// Returns `false` when the job was dropped (oversized payload,
    /// full queue, or worker gone).
    pub fn enqueue(&self, payload: &[u8]) -> bool {
        let Some(job) = Job::from_payload(payload) else {
            warn!(
                "Dispatch: payload too large for job slot ({} > {JOB_PAYLOAD_MAX}), dropped",
                payload.len()
            );
            return false;
        };

        match self.tx.try_send(job) {
            Ok(()) => {
                info!("Dispatch: job enqueued ({} bytes)", payload.len());
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("Dispatch: job queue full, dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Dispatch: worker gone, dropped");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker side
// ---------------------------------------------------------------------------

/// Process a single job: decode, dispatch, rewrite asset URLs against the
/// current reachable address, publish the observation.
///
/// Split out of the worker loop so tests can drive it synchronously.
pub fn process_job<S: MqttSession>(
    job: &Job,
    tools: &Mutex<ToolRegistry>,
    identity: &DeviceIdentity,
    bridge: &TransportBridge<S>,
    uptime_ms: u64,
) {
    let Some(cmd) = CommandEnvelope::decode(job.payload()) else {
        warn!("Dispatch: malformed command payload, dropped");
        return;
    };

    // Substitute for an absent request_id, as an uptime-derived tag.
    let fallback_rid = format!("{uptime_ms:x}");

    let (ok, observation) = match tools.lock() {
        Ok(mut reg) => reg.dispatch(&cmd, &fallback_rid),
        Err(_) => return,
    };
    if !ok {
        info!("Dispatch: tool '{}' reported failure", cmd.tool);
    }

    let patched = absolutize_asset_urls(&observation, &identity.http_base());

    // Publish failures are logged by the bridge and dropped — at-most-once.
    let _ = bridge.publish_events(&patched);
}

/// Worker thread body: block on the queue, run jobs to completion, one at
/// a time, forever. Exits when the producer side is dropped (shutdown).
pub fn run_worker<S: MqttSession>(
    rx: &Receiver<Job>,
    tools: &Arc<Mutex<ToolRegistry>>,
    bridge: &Arc<TransportBridge<S>>,
    uptime_ms: impl Fn() -> u64,
) {
    info!("Dispatch: worker started");
    while let Ok(job) = rx.recv() {
        process_job(&job, tools, bridge.identity(), bridge, uptime_ms());
    }
    info!("Dispatch: worker stopped");
}
