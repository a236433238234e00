//! `play_led_pattern` tool — expression-driven LED ring rendering.
//!
//! Each invocation carries three expressions (one per colour channel)
//! evaluated per LED with the variables `theta` (LED angle in radians),
//! `t` (seconds since the pattern started), and `i` (LED index). Free
//! identifiers resolve against InPort values, so an orchestrator can
//! steer a running pattern by writing `ports/set` — e.g.
//! `"brightness * sin(theta + t)"`.
//!
//! The invocation renders the `t = 0` frame immediately; the foreground
//! loop keeps the animation going through [`PatternState::render`].

use std::sync::{Arc, Mutex};

use log::info;
use serde_json::{Map, Value, json};

use crate::registry::ports::PortRegistry;
use crate::registry::tool::{ObservationBuilder, Tool};
use crate::tools::expr;

/// LED count of the ring (matches the reference hardware).
pub const NUM_LEDS: usize = 12;

/// The currently playing pattern, shared between the tool (worker) and
/// the foreground renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pattern {
    pub r_expr: String,
    pub g_expr: String,
    pub b_expr: String,
    pub started_ms: u64,
}

pub struct PatternState {
    current: Mutex<Option<Pattern>>,
    ports: Arc<Mutex<PortRegistry>>,
}

impl PatternState {
    pub fn new(ports: Arc<Mutex<PortRegistry>>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(None),
            ports,
        })
    }

    pub fn set(&self, pattern: Pattern) {
        if let Ok(mut g) = self.current.lock() {
            *g = Some(pattern);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.current.lock() {
            *g = None;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Evaluate the current pattern into one RGB frame. `None` when no
    /// pattern is playing. Channel results are clamped to 0–255.
    pub fn render(&self, now_ms: u64) -> Option<[(u8, u8, u8); NUM_LEDS]> {
        let pattern = self.current.lock().ok()?.clone()?;
        let t = (now_ms.saturating_sub(pattern.started_ms)) as f32 / 1000.0;

        let ports = Arc::clone(&self.ports);
        let resolve = move |name: &str| ports.lock().ok()?.in_port_value(name);

        let mut frame = [(0u8, 0u8, 0u8); NUM_LEDS];
        for (i, led) in frame.iter_mut().enumerate() {
            let theta = (i as f32) * core::f32::consts::TAU / NUM_LEDS as f32;
            let channel = |e: &str| {
                expr::eval_with_vars(e, theta, t, i as i32, &resolve).clamp(0.0, 255.0) as u8
            };
            *led = (
                channel(&pattern.r_expr),
                channel(&pattern.g_expr),
                channel(&pattern.b_expr),
            );
        }
        Some(frame)
    }
}

// ---------------------------------------------------------------------------
// Tool
// ---------------------------------------------------------------------------

pub struct PlayPatternTool {
    state: Arc<PatternState>,
    clock: Arc<crate::adapters::time::Clock>,
}

impl PlayPatternTool {
    pub fn new(state: Arc<PatternState>, clock: Arc<crate::adapters::time::Clock>) -> Self {
        Self { state, clock }
    }
}

impl Tool for PlayPatternTool {
    fn name(&self) -> &'static str {
        "play_led_pattern"
    }

    fn describe(&self, tool: &mut Map<String, Value>) {
        tool.insert("name".into(), json!(self.name()));
        tool.insert(
            "description".into(),
            json!("Play a dynamic LED pattern from per-channel expressions of theta, t, i."),
        );
        tool.insert(
            "parameters".into(),
            json!({
                "type": "object",
                "properties": {
                    "r": { "type": "string", "description": "Red channel expression (0-255)" },
                    "g": { "type": "string", "description": "Green channel expression (0-255)" },
                    "b": { "type": "string", "description": "Blue channel expression (0-255)" },
                },
                "required": ["r", "g", "b"],
            }),
        );
    }

    fn invoke(&mut self, args: &Value, out: &mut ObservationBuilder) -> bool {
        let field = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let (Some(r_expr), Some(g_expr), Some(b_expr)) = (field("r"), field("g"), field("b"))
        else {
            out.error("bad_args", "expressions 'r', 'g', 'b' are required");
            return false;
        };

        let now_ms = self.clock.uptime_ms();
        self.state.set(Pattern {
            r_expr,
            g_expr,
            b_expr,
            started_ms: now_ms,
        });

        // First frame now; the foreground renderer takes it from here.
        let lit = self
            .state
            .render(now_ms)
            .map(|frame| {
                frame
                    .iter()
                    .filter(|(r, g, b)| *r > 0 || *g > 0 || *b > 0)
                    .count()
            })
            .unwrap_or(0);

        info!("Pattern: playing ({lit}/{NUM_LEDS} LEDs lit at t=0)");
        out.success(&format!("pattern playing, {lit} of {NUM_LEDS} LEDs lit"));
        true
    }
}
