//! Reference Tool and Port implementations.
//!
//! These are the replaceable leaves of the system — everything above
//! them (registry, dispatch, bridge) is generic over the `Tool` and
//! `OutPort` contracts. A product build swaps `register_tools` /
//! `register_ports` for its own set.

pub mod camera;
pub mod expr;
pub mod pattern;
pub mod uptime_port;

use std::sync::{Arc, Mutex};

use crate::adapters::time::Clock;
use crate::registry::ToolRegistry;
use crate::registry::ports::PortRegistry;
use pattern::PatternState;

/// Register the reference tool set. Called once at boot, before any
/// concurrent access to the registry begins.
pub fn register_tools(
    registry: &mut ToolRegistry,
    pattern_state: Arc<PatternState>,
    clock: Arc<Clock>,
) {
    registry.register(Box::new(camera::CaptureTool::new()));
    registry.register(Box::new(pattern::PlayPatternTool::new(
        pattern_state,
        clock,
    )));
}

/// Register the reference port set.
pub fn register_ports(ports: &mut PortRegistry) {
    ports.add_out_port(Box::new(uptime_port::UptimeOutPort::new()));
    ports.create_in_port("brightness", "float");
}

/// Build the shared pattern state bound to the port registry.
pub fn make_pattern_state(ports: &Arc<Mutex<PortRegistry>>) -> Arc<PatternState> {
    PatternState::new(Arc::clone(ports))
}
