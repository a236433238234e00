//! Time adapter.
//!
//! Provides monotonic uptime for timers and wall-clock ISO-8601 UTC
//! timestamps for wire payloads.
//!
//! - **`target_os = "espidf"`** — uptime wraps `esp_timer_get_time()`;
//!   wall time comes from the system clock once SNTP has synced.
//! - **all other targets** — `std::time::Instant` / `SystemTime`.
//!
//! Before the first SNTP sync the wall clock sits near the epoch; the
//! resulting timestamps are obviously wrong and harmless, matching the
//! behavior orchestrators already tolerate from freshly booted devices.

pub struct Clock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Current wall-clock time as an ISO-8601 UTC timestamp,
    /// `YYYY-MM-DDTHH:MM:SSZ`.
    pub fn iso_now(&self) -> String {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format_iso8601(secs)
    }
}

/// Start SNTP so wall-clock timestamps become real. Idempotent enough
/// for a single call after station join.
#[cfg(target_os = "espidf")]
pub fn start_sntp() -> Option<esp_idf_svc::sntp::EspSntp<'static>> {
    match esp_idf_svc::sntp::EspSntp::new_default() {
        Ok(sntp) => {
            log::info!("Time: SNTP started");
            Some(sntp)
        }
        Err(e) => {
            log::warn!("Time: SNTP init failed ({e})");
            None
        }
    }
}

/// Format seconds-since-epoch as `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Civil-from-days conversion, valid for the entire u64 range we can
/// encounter in practice.
pub fn format_iso8601(epoch_secs: u64) -> String {
    let days = epoch_secs / 86_400;
    let secs_of_day = epoch_secs % 86_400;

    // Days since 1970-01-01 to civil date, via the era decomposition.
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        m,
        d,
        secs_of_day / 3_600,
        (secs_of_day / 60) % 60,
        secs_of_day % 60
    )
}
