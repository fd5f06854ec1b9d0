//! Task watchdog for the control loop.
//!
//! The control loop subscribes its own task and calls [`Watchdog::feed`]
//! once per tick. A loop stalled for [`WATCHDOG_TIMEOUT_MS`] panics the
//! firmware, which reboots the minion with the relay released.
//!
//! The host build only counts feeds.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::config::WATCHDOG_TIMEOUT_MS;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
    #[cfg(not(target_os = "espidf"))]
    feeds: core::cell::Cell<u64>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Arm the TWDT and subscribe the calling task.
    ///
    /// Failures are logged rather than fatal: a minion without a watchdog
    /// still serves the bus.
    pub fn new() -> Self {
        #[cfg(target_os = "espidf")]
        {
            let cfg = esp_task_wdt_config_t {
                timeout_ms: WATCHDOG_TIMEOUT_MS,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            // SAFETY: plain FFI calls with a config that outlives them; a null
            // task handle subscribes the caller.
            let reconfigured = unsafe { esp_task_wdt_reconfigure(&cfg) };
            if reconfigured != ESP_OK {
                // The IDF may have armed the TWDT with its own defaults already.
                warn!("Watchdog: reconfigure returned {}", reconfigured);
            }
            let added = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
            let subscribed = added == ESP_OK;
            if subscribed {
                info!("Watchdog: control task subscribed, {} ms", WATCHDOG_TIMEOUT_MS);
            } else {
                warn!("Watchdog: subscribe failed ({}), running unguarded", added);
            }
            Self { subscribed }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("Watchdog(sim): {} ms timeout not enforced", WATCHDOG_TIMEOUT_MS);
            Self {
                feeds: core::cell::Cell::new(0),
            }
        }
    }

    /// Reset the countdown. Call from the subscribed task only.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                // SAFETY: the calling task subscribed in `new`.
                unsafe { esp_task_wdt_reset() };
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.feeds.set(self.feeds.get() + 1);
        }
    }

    pub fn is_armed(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            self.subscribed
        }

        #[cfg(not(target_os = "espidf"))]
        {
            false
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn feed_count(&self) -> u64 {
        self.feeds.get()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                // SAFETY: removes the subscription made in `new` from the same task.
                let ret = unsafe { esp_task_wdt_delete(core::ptr::null_mut()) };
                if ret != ESP_OK {
                    warn!("Watchdog: unsubscribe failed ({})", ret);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_counts_feeds() {
        let wd = Watchdog::new();
        assert!(!wd.is_armed());
        for _ in 0..3 {
            wd.feed();
        }
        assert_eq!(wd.feed_count(), 3);
    }
}
