//! ESP32 time adapters.
//!
//! - [`Esp32TimeAdapter`]: monotonic uptime for the control loop.
//! - [`SystemRtc`]: wall clock set by the bus master through SET_TIME.
//!
//! On `target_os = "espidf"` both wrap ESP-IDF calls (`esp_timer_get_time`,
//! `settimeofday`). On the host they use `std::time::Instant` and an
//! in-memory record for simulation and tests.

use log::info;

use crate::app::ports::{ClockPort, RtcError, RtcPort};

/// Monotonic time source.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn uptime_secs(&self) -> u64 {
        self.uptime_us() / 1_000_000
    }
}

impl ClockPort for Esp32TimeAdapter {
    fn now_ms(&self) -> u64 {
        self.uptime_us() / 1_000
    }
}

/// System wall clock.
#[derive(Debug, Default)]
pub struct SystemRtc {
    #[cfg(not(target_os = "espidf"))]
    unix_secs: Option<u64>,
}

impl SystemRtc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last time set through [`RtcPort::set_unix_time`].
    #[cfg(not(target_os = "espidf"))]
    pub fn unix_secs(&self) -> Option<u64> {
        self.unix_secs
    }
}

impl RtcPort for SystemRtc {
    #[cfg(target_os = "espidf")]
    fn set_unix_time(&mut self, unix_secs: u64) -> Result<(), RtcError> {
        let tv_sec = esp_idf_svc::sys::time_t::try_from(unix_secs)
            .map_err(|_| RtcError::OutOfRange)?;
        let tv = esp_idf_svc::sys::timeval { tv_sec, tv_usec: 0 };
        // SAFETY: `tv` outlives the call; a null timezone is accepted.
        let rc = unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) };
        if rc != 0 {
            return Err(RtcError::SetFailed(rc));
        }
        info!("RTC: wall clock set to {}", unix_secs);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn set_unix_time(&mut self, unix_secs: u64) -> Result<(), RtcError> {
        if i64::try_from(unix_secs).is_err() {
            return Err(RtcError::OutOfRange);
        }
        self.unix_secs = Some(unix_secs);
        info!("RTC(sim): wall clock set to {}", unix_secs);
        Ok(())
    }
}
