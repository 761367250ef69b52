// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![cfg_attr(not(test), no_std)]

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(armv6m)]
use armv6m_atomic_hack::AtomicBoolExt;

/// A RefCell-style container that can be used in a static for cases where only
/// a single borrow needs to happen at any given time.
///
/// This only provides `mut` access because that's what we've needed so far. It
/// does _not_ provide the many-reader one-writer behavior of `RefCell`, only
/// the one-writer part.
#[derive(Default)]
pub struct StaticCell<T> {
    borrowed: AtomicBool,
    cell: UnsafeCell<T>,
}

impl<T> StaticCell<T> {
    /// Creates a `StaticCell` containing `contents`.
    pub const fn new(contents: T) -> Self {
        Self {
            borrowed: AtomicBool::new(false),
            cell: UnsafeCell::new(contents),
        }
    }

    /// Gets mutable access to the contents of `self`.
    ///
    /// If a `StaticRef` for `self` still exists anywhere in the program, this
    /// will panic.
    pub fn borrow_mut(&self) -> StaticRef<'_, T> {
        let already_borrowed = self.borrowed.swap(true, Ordering::Acquire);
        if already_borrowed {
            panic!();
        }
        // Safety: the check above ensures that we are not producing an aliasing
        // &mut to our contents.
        unsafe {
            StaticRef {
                contents: &mut *self.cell.get(),
                borrow: &self.borrowed,
            }
        }
    }
}

unsafe impl<T> Sync for StaticCell<T> where for<'a> &'a mut T: Send {}

pub struct StaticRef<'a, T> {
    contents: &'a mut T,
    borrow: &'a AtomicBool,
}

impl<'a, T> Drop for StaticRef<'a, T> {
    fn drop(&mut self) {
        self.borrow.store(false, Ordering::Release);
    }
}

impl<'a, T> core::ops::Deref for StaticRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &*self.contents
    }
}

impl<'a, T> core::ops::DerefMut for StaticRef<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.contents
    }
}

/// A write-once-at-boot cell: starts empty, is filled exactly once by
/// [`WriteCell::init`], and from then on hands out a `'static` reference
/// good for the rest of the program's life.
///
/// This is the pattern board bring-up uses to turn a peripheral value that
/// can only be constructed at runtime (it needs a `Peripherals::take()` or
/// similar) into the `'static` references that driver and handler structs
/// are built around, without reaching for an allocator.
pub struct WriteCell<T> {
    initialized: AtomicBool,
    cell: UnsafeCell<MaybeUninit<T>>,
}

impl<T> WriteCell<T> {
    pub const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            cell: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Writes `value` into the cell and returns a `'static` reference to it.
    ///
    /// Panics if called more than once on the same cell -- board bring-up
    /// happens exactly once, before the scheduler starts.
    pub fn init(&'static self, value: T) -> &'static mut T {
        if self.initialized.swap(true, Ordering::AcqRel) {
            panic!("WriteCell::init called more than once");
        }
        // Safety: the swap above guarantees only one caller ever reaches
        // this point, so there is no other live reference to `cell`.
        unsafe {
            let slot = &mut *self.cell.get();
            slot.write(value);
            slot.assume_init_mut()
        }
    }
}

impl<T> Default for WriteCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T> Sync for WriteCell<T> where T: Send {}
