//! `capture_image` tool — still-frame capture with HTTP asset serving.
//!
//! The captured JPEG lives in an owned buffer that is replaced wholesale
//! on each capture; the previous frame is dropped when the new one lands,
//! so there is no separate free path to get wrong. The frame is shared
//! with the `/camera/last` HTTP route through an `Arc<Mutex<...>>` —
//! capture happens on the worker, serving happens on the HTTP side.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real sensor capture via the esp_camera
//!   driver (wiring deferred, see `platform_capture`).
//! - **all other targets**: deterministic fake JPEG for host tests.

use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde_json::{Map, Value, json};

use crate::registry::tool::{ObservationBuilder, Tool};
use crate::transport::http::{HttpReply, HttpRoutes};

/// One captured frame. Replacing the `Option` drops the previous buffer.
pub struct CapturedFrame {
    pub id: u32,
    pub jpeg: Box<[u8]>,
}

type SharedFrame = Arc<Mutex<Option<CapturedFrame>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quality {
    Low,
    Mid,
    High,
}

impl Quality {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "mid" => Some(Self::Mid),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

pub struct CaptureTool {
    last_frame: SharedFrame,
    capture_count: u32,
}

impl CaptureTool {
    pub fn new() -> Self {
        Self {
            last_frame: Arc::new(Mutex::new(None)),
            capture_count: 0,
        }
    }

    /// Handle to the last frame (tests and the HTTP route).
    pub fn frame_handle(&self) -> SharedFrame {
        Arc::clone(&self.last_frame)
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_capture(&mut self, _quality: Quality, _flash: bool) -> Option<Box<[u8]>> {
        // esp_camera capture path:
        // 1. sensor_t* s = esp_camera_sensor_get(); s->set_quality(...)
        // 2. optional flash GPIO high, warm-up frames (2 × 30 ms)
        // 3. camera_fb_t* fb = esp_camera_fb_get()
        // 4. copy fb->buf into an owned Box<[u8]>, esp_camera_fb_return(fb)
        // Wired in on the device build once the camera module pins are
        // fixed for the target board.
        warn!("Camera(espidf): capture path awaiting sensor wiring");
        None
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_capture(&mut self, quality: Quality, flash: bool) -> Option<Box<[u8]>> {
        // Deterministic fake JPEG: SOI marker + payload sized by quality.
        let body_len = match quality {
            Quality::Low => 256,
            Quality::Mid => 1024,
            Quality::High => 4096,
        };
        let mut jpeg = Vec::with_capacity(body_len + 4);
        jpeg.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
        jpeg.resize(body_len + 2, if flash { 0xEE } else { 0x11 });
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        Some(jpeg.into_boxed_slice())
    }
}

impl Default for CaptureTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for CaptureTool {
    fn init(&mut self) -> bool {
        // esp_camera_init on the device build; nothing to do on host.
        true
    }

    fn name(&self) -> &'static str {
        "capture_image"
    }

    fn describe(&self, tool: &mut Map<String, Value>) {
        tool.insert("name".into(), json!(self.name()));
        tool.insert(
            "description".into(),
            json!("Capture a still image and expose it as a downloadable asset."),
        );
        tool.insert(
            "parameters".into(),
            json!({
                "type": "object",
                "properties": {
                    "quality": {
                        "type": "string",
                        "description": "JPEG quality preset: low | mid | high",
                    },
                    "flash": {
                        "type": "string",
                        "description": "Flash LED during capture: on | off",
                    },
                },
            }),
        );
    }

    fn invoke(&mut self, args: &Value, out: &mut ObservationBuilder) -> bool {
        let quality_arg = args.get("quality").and_then(Value::as_str).unwrap_or("mid");
        let Some(quality) = Quality::parse(quality_arg) else {
            out.error("bad_args", "quality must be low | mid | high");
            return false;
        };
        let flash = args.get("flash").and_then(Value::as_str) == Some("on");

        let Some(jpeg) = self.platform_capture(quality, flash) else {
            out.error("capture_failed", "camera did not produce a frame");
            return false;
        };

        self.capture_count += 1;
        let id = self.capture_count;
        let size = jpeg.len();

        // Replacing the option drops the previous frame's buffer.
        if let Ok(mut slot) = self.last_frame.lock() {
            *slot = Some(CapturedFrame { id, jpeg });
        }

        info!("Camera: frame {id} captured ({size} bytes, quality={quality_arg})");
        out.add_asset(json!({
            "url": "/camera/last",
            "mime": "image/jpeg",
            "size": size,
            "capture_id": id,
        }));
        out.success(&format!("captured frame {id} ({size} bytes)"));
        true
    }

    fn register_http(&mut self, routes: &mut HttpRoutes) {
        let frame = Arc::clone(&self.last_frame);
        routes.add(
            "/camera/last",
            Box::new(move || match frame.lock() {
                Ok(guard) => match guard.as_ref() {
                    Some(f) => HttpReply::binary(200, "image/jpeg", f.jpeg.to_vec()),
                    None => HttpReply::text(404, "no frame captured yet"),
                },
                Err(_) => HttpReply::text(500, "frame lock poisoned"),
            }),
        );
    }
}
