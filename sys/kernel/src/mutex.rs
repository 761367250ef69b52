// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mutual exclusion for shared device channels (EEPROM SPI, switch
//! controller SPI, UART TX, I2C bus).
//!
//! A [`Mutex`] is held for the full duration of a logical operation on its
//! resource -- per the concurrency model, "held from opcode through
//! post-settle verify" for the EEPROM channel, and "held across the
//! request/response pair" for the I2C bus. Ordering across callers
//! contending for the same mutex is FIFO-ish in practice because the
//! underlying critical section only ever has one owner at a time and
//! callers spin-wait; no global ordering is promised across distinct
//! mutexes.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// A spinlock-backed mutex appropriate for a single-core microcontroller
/// where the contending parties are cooperative tasks and, occasionally, an
/// ISR. Acquisition briefly enters a critical section (interrupts masked)
/// only to test-and-set the lock flag; the lock is then held with
/// interrupts re-enabled so a long SPI transaction never extends the
/// interrupt-disabled window.
pub struct Mutex<T> {
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(value),
        }
    }

    /// Blocks (busy-waits) until the resource is free, then returns a guard
    /// granting exclusive access. The guard releases the lock on drop,
    /// guaranteeing release on every exit path including early returns from
    /// `?`.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        loop {
            let acquired = critical_section::with(|_| {
                if self.locked.load(Ordering::Relaxed) {
                    false
                } else {
                    self.locked.store(true, Ordering::Release);
                    true
                }
            });
            if acquired {
                return MutexGuard { mutex: self };
            }
        }
    }

    /// Attempts to acquire the mutex without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let acquired = critical_section::with(|_| {
            if self.locked.load(Ordering::Relaxed) {
                false
            } else {
                self.locked.store(true, Ordering::Release);
                true
            }
        });
        acquired.then_some(MutexGuard { mutex: self })
    }
}

impl<T> core::ops::Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.inner.get() }
    }
}

impl<T> core::ops::DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.inner.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_access_round_trips() {
        let m = Mutex::new(0u32);
        {
            let mut g = m.lock();
            *g += 1;
        }
        assert_eq!(*m.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let m = Mutex::new(());
        let guard = m.lock();
        assert!(m.try_lock().is_none());
        drop(guard);
        assert!(m.try_lock().is_some());
    }
}
