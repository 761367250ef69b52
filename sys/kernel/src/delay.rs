// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cooperative yield points.
//!
//! Long-running operations (bit-poll retries, EEPROM settle waits, table
//! dump pagination) must yield at one of the three durations named in the
//! concurrency model instead of busy-looping, so lower-priority tasks still
//! get scheduled. The actual timer (SysTick, a hardware watchdog kick, or a
//! real RTOS `sleep`) is a chip-specific primitive outside this crate; what
//! is provided here is the registration point a board support package plugs
//! into, following the same `critical_section::Mutex<RefCell<_>>` idiom
//! used throughout the embedded Rust ecosystem for sharing a singleton set
//! up once at boot.

use crate::Delay;
use core::cell::RefCell;
use critical_section::Mutex as CsMutex;

/// Implemented by the board support layer to provide the actual wait.
pub trait CooperativeDelay: Sync {
    fn delay(&self, which: Delay);
}

static DELAY_IMPL: CsMutex<RefCell<Option<&'static dyn CooperativeDelay>>> =
    CsMutex::new(RefCell::new(None));

/// Registers the board's delay implementation. Must be called once, before
/// boot restore runs and before any task starts.
pub fn set_delay_impl(imp: &'static dyn CooperativeDelay) {
    critical_section::with(|cs| {
        *DELAY_IMPL.borrow(cs).borrow_mut() = Some(imp);
    });
}

/// Yields for the named cooperative delay. Panics if no board delay
/// implementation has been registered, since that would mean the
/// scheduler contract is being violated at the very first call site.
pub fn cooperative_delay(which: Delay) {
    let imp = critical_section::with(|cs| *DELAY_IMPL.borrow(cs).borrow());
    match imp {
        Some(imp) => imp.delay(which),
        None => panic!("cooperative_delay called before board delay registered"),
    }
}
