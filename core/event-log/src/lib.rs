// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The logger task: drains a bounded queue of event codes into a 400-entry
//! circular ring in EEPROM, subject to a 32-bit enable mask and
//! same-as-previous suppression.

#![cfg_attr(not(test), no_std)]

use eeprom_hal::{EepromHal, SpiBus};
use kernel::Queue;
use ringbuf::*;
use switchfw_proto::log::{LogRecord, RECORD_LEN};

pub const LOG_REGION_BASE: u32 = 0x1600;
pub const LOG_CAPACITY_ENTRIES: u32 = 400;
const QUEUE_DEPTH: usize = 32;

/// Provides the tick counter used to timestamp log records. Out of scope
/// per the core's own boundary (no real-time clock; ticks since boot only).
pub trait TickSource {
    fn now(&self) -> u32;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LogStatusFlags(pub u32);

impl LogStatusFlags {
    pub const fn all_enabled() -> Self {
        Self(u32::MAX)
    }

    /// Codes 32 and above have no enable bit and are never logged; this
    /// mirrors the 32-bit flags word's shape rather than widening it.
    pub fn is_enabled(&self, code: u8) -> bool {
        code < 32 && self.0 & (1 << code) != 0
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Enqueued(u8),
    Dropped(u8),
    Suppressed(u8),
    Written(u32, u8),
    Wrapped,
}
ringbuf!(Trace, 32, Trace::None);

pub struct EventLogger<'a, B: SpiBus> {
    eeprom: &'a EepromHal<B>,
    queue: Queue<u8, QUEUE_DEPTH>,
    status_flags: LogStatusFlags,
    next_log_slot: u32,
    last_written_code: Option<u8>,
}

impl<'a, B: SpiBus> EventLogger<'a, B> {
    pub const fn new(eeprom: &'a EepromHal<B>, status_flags: LogStatusFlags, next_log_slot: u32) -> Self {
        Self {
            eeprom,
            queue: Queue::new(),
            status_flags,
            next_log_slot: clamp_slot(next_log_slot),
            last_written_code: None,
        }
    }

    /// Non-blocking; intended for ISR and handler call sites alike. Silently
    /// drops the code if the queue is saturated, per the propagation rule
    /// that writers never block on the logger.
    pub fn enqueue(&self, code: u8) {
        match self.queue.enqueue(code) {
            Ok(()) => ringbuf_entry!(Trace::Enqueued(code)),
            Err(_) => ringbuf_entry!(Trace::Dropped(code)),
        }
    }

    pub fn next_log_slot(&self) -> u32 {
        self.next_log_slot
    }

    pub fn status_flags(&self) -> LogStatusFlags {
        self.status_flags
    }

    /// Drains at most one queued code, following the three-step rule: test
    /// the enable bit, suppress same-as-previous, then write. Returns
    /// whether a code was processed (queued or not) so the caller's task
    /// loop can decide whether to yield or keep draining.
    pub fn drain_one(&mut self, ticks: &dyn TickSource) -> Result<bool, eeprom_hal::Error<B::Error>> {
        let Some(code) = self.queue.dequeue() else {
            return Ok(false);
        };

        if !self.status_flags.is_enabled(code) {
            return Ok(true);
        }
        if self.last_written_code == Some(code) {
            ringbuf_entry!(Trace::Suppressed(code));
            return Ok(true);
        }

        let record = LogRecord { tick_timestamp: ticks.now(), code };
        let bytes = record.to_bytes();
        self.eeprom.bulk_write(self.next_log_slot, &bytes)?;
        ringbuf_entry!(Trace::Written(self.next_log_slot, code));
        self.last_written_code = Some(code);
        self.advance_slot();
        Ok(true)
    }

    fn advance_slot(&mut self) {
        self.next_log_slot += RECORD_LEN as u32;
        if self.next_log_slot >= LOG_REGION_BASE + LOG_CAPACITY_ENTRIES * RECORD_LEN as u32 {
            self.next_log_slot = LOG_REGION_BASE;
            ringbuf_entry!(Trace::Wrapped);
        }
    }
}

const fn clamp_slot(slot: u32) -> u32 {
    if slot < LOG_REGION_BASE {
        LOG_REGION_BASE
    } else {
        slot
    }
}
