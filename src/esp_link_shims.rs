//! ESP-IDF runtime symbols required by third-party crates.
//!
//! `embassy-sync`'s blocking mutex goes through `critical-section`, which
//! expects the final binary to provide an acquire/release pair. Console
//! and control loop are plain std threads, so a process-wide lock flag
//! guarded by a std `Mutex` and `Condvar` serves as the critical section.
//!
//! The token handed back by acquire records whether that call took the
//! lock (`1`) or found it already held by the same thread (`0`). Only the
//! outermost release frees it.

#[cfg(target_os = "espidf")]
use core::cell::Cell;
#[cfg(target_os = "espidf")]
use std::sync::{Condvar, Mutex, PoisonError};

#[cfg(target_os = "espidf")]
static LOCKED: Mutex<bool> = Mutex::new(false);
#[cfg(target_os = "espidf")]
static RELEASED: Condvar = Condvar::new();

#[cfg(target_os = "espidf")]
thread_local! {
    static HELD_HERE: Cell<bool> = const { Cell::new(false) };
}

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
    if HELD_HERE.with(Cell::get) {
        return 0;
    }
    // The flag is a plain bool, so a poisoned lock is still consistent.
    let mut locked = LOCKED.lock().unwrap_or_else(PoisonError::into_inner);
    while *locked {
        locked = RELEASED.wait(locked).unwrap_or_else(PoisonError::into_inner);
    }
    *locked = true;
    HELD_HERE.with(|held| held.set(true));
    1
}

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_release(token: u8) {
    if token == 0 {
        return;
    }
    HELD_HERE.with(|held| held.set(false));
    *LOCKED.lock().unwrap_or_else(PoisonError::into_inner) = false;
    RELEASED.notify_one();
}
