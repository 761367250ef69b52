// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for the 128 KiB page-structured serial EEPROM.
//!
//! Every byte is inverted on disk (logical 0xAB stored as 0x54); this is
//! invariant and must be preserved for bit-exact migration from the
//! original firmware. All operations serialize through one [`kernel::Mutex`]
//! held from opcode through post-write verify.

#![cfg_attr(not(test), no_std)]

use kernel::{cooperative_delay, Delay, Mutex};
use ringbuf::*;

pub const CAPACITY: u32 = 131_072;
const MAX_RETRY: u32 = 10_000;

const OPCODE_WRITE_ENABLE: u8 = 0x06;
const OPCODE_READ: u8 = 0x03;
const OPCODE_WRITE: u8 = 0x02;
const OPCODE_PAGE_ERASE: u8 = 0x20;
const OPCODE_CHIP_ERASE: u8 = 0xC7;
const OPCODE_READ_STATUS: u8 = 0x05;
const STATUS_WIP: u8 = 0x01;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error<E> {
    Bus(E),
    OutOfRange,
    VerifyMismatch { address: u32, expected: u8, got: u8 },
    EraseTimedOut,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Bus(e)
    }
}

/// The byte-level SPI transport this driver runs over. Chip-select framing
/// and the actual clocking of bits is the board support package's concern;
/// this trait is the seam the spec calls out of scope.
pub trait SpiBus {
    type Error: Copy;

    /// Asserts chip-select, writes `tx`, reads `rx.len()` bytes immediately
    /// following, deasserts chip-select.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error>;

    /// Asserts chip-select, writes `tx`, deasserts chip-select. Equivalent
    /// to `transfer(tx, &mut [])` but avoids the empty-slice ceremony.
    fn write(&mut self, tx: &[u8]) -> Result<(), Self::Error> {
        self.transfer(tx, &mut [])
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    SingleWrite(u32),
    SingleRead(u32),
    BulkWrite(u32, usize),
    BulkRead(u32, usize),
    PageErase(u32),
    ChipErase,
    VerifyFailed(u32),
}
ringbuf!(Trace, 32, Trace::None);

/// Tallied separately from [`Trace`]: the trace ring only holds the most
/// recent 32 operations, but a failing part can rack up verify failures
/// over a much longer run than that ring retains.
#[derive(Copy, Clone, Debug, Eq, PartialEq, counters::Count)]
enum Event {
    VerifyFailed,
}
counters::counters!(COUNTERS, Event);

fn address_bytes(addr: u32) -> [u8; 3] {
    [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

fn invert(byte: u8) -> u8 {
    !byte
}

pub struct EepromHal<B: SpiBus> {
    bus: Mutex<B>,
}

impl<B: SpiBus> EepromHal<B> {
    pub const fn new(bus: B) -> Self {
        Self { bus: Mutex::new(bus) }
    }

    fn check_range(start: u32, len: usize) -> Result<(), Error<B::Error>> {
        if start >= CAPACITY || start as u64 + len as u64 > CAPACITY as u64 {
            Err(Error::OutOfRange)
        } else {
            Ok(())
        }
    }

    /// Writes one byte, settles, and reads it back for verification.
    pub fn single_write(&self, addr: u32, byte: u8) -> Result<(), Error<B::Error>> {
        Self::check_range(addr, 1)?;
        ringbuf_entry!(Trace::SingleWrite(addr));
        let mut bus = self.bus.lock();
        bus.write(&[OPCODE_WRITE_ENABLE])?;
        let a = address_bytes(addr);
        bus.write(&[OPCODE_WRITE, a[0], a[1], a[2], invert(byte)])?;
        cooperative_delay(Delay::Short);
        let readback = Self::raw_read(&mut bus, addr)?;
        if readback != byte {
            ringbuf_entry!(Trace::VerifyFailed(addr));
            counters::count!(COUNTERS, Event::VerifyFailed);
            return Err(Error::VerifyMismatch { address: addr, expected: byte, got: readback });
        }
        Ok(())
    }

    fn raw_read(bus: &mut B, addr: u32) -> Result<u8, B::Error> {
        let a = address_bytes(addr);
        let mut rx = [0u8; 1];
        bus.transfer(&[OPCODE_READ, a[0], a[1], a[2], 0x00], &mut rx)?;
        Ok(invert(rx[0]))
    }

    pub fn single_read(&self, addr: u32) -> Result<u8, Error<B::Error>> {
        Self::check_range(addr, 1)?;
        ringbuf_entry!(Trace::SingleRead(addr));
        let mut bus = self.bus.lock();
        Ok(Self::raw_read(&mut bus, addr)?)
    }

    /// Writes `data` starting at `start`, one byte at a time; stops and
    /// returns the first failure.
    pub fn bulk_write(&self, start: u32, data: &[u8]) -> Result<(), Error<B::Error>> {
        Self::check_range(start, data.len())?;
        ringbuf_entry!(Trace::BulkWrite(start, data.len()));
        for (i, &byte) in data.iter().enumerate() {
            self.single_write(start + i as u32, byte)?;
        }
        Ok(())
    }

    pub fn bulk_read(&self, start: u32, out: &mut [u8]) -> Result<(), Error<B::Error>> {
        Self::check_range(start, out.len())?;
        ringbuf_entry!(Trace::BulkRead(start, out.len()));
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.single_read(start + i as u32)?;
        }
        Ok(())
    }

    /// Erases the page containing `page_addr`, polling the status register's
    /// write-in-progress bit until it clears.
    pub fn page_erase(&self, page_addr: u32) -> Result<(), Error<B::Error>> {
        Self::check_range(page_addr, 1)?;
        ringbuf_entry!(Trace::PageErase(page_addr));
        let mut bus = self.bus.lock();
        bus.write(&[OPCODE_WRITE_ENABLE])?;
        let a = address_bytes(page_addr);
        bus.write(&[OPCODE_PAGE_ERASE, a[0], a[1], a[2]])?;
        Self::poll_wip_clear(&mut bus)
    }

    pub fn chip_erase(&self) -> Result<(), Error<B::Error>> {
        ringbuf_entry!(Trace::ChipErase);
        let mut bus = self.bus.lock();
        bus.write(&[OPCODE_WRITE_ENABLE])?;
        bus.write(&[OPCODE_CHIP_ERASE])?;
        cooperative_delay(Delay::Long);
        Self::poll_wip_clear(&mut bus)
    }

    fn poll_wip_clear(bus: &mut B) -> Result<(), Error<B::Error>> {
        for _ in 0..MAX_RETRY {
            let mut status = [0u8; 1];
            bus.transfer(&[OPCODE_READ_STATUS], &mut status)?;
            if status[0] & STATUS_WIP == 0 {
                return Ok(());
            }
            cooperative_delay(Delay::Short);
        }
        Err(Error::EraseTimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    struct FakeBus {
        cells: [u8; CAPACITY as usize],
        wip_reads_remaining: u32,
        log: Vec<u8>,
    }

    impl FakeBus {
        fn new() -> Self {
            Self { cells: [0xFFu8; CAPACITY as usize], wip_reads_remaining: 0, log: Vec::new() }
        }
    }

    impl SpiBus for FakeBus {
        type Error = ();

        fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), ()> {
            self.log.extend_from_slice(tx);
            match tx[0] {
                OPCODE_READ => {
                    let addr = ((tx[1] as u32) << 16) | ((tx[2] as u32) << 8) | tx[3] as u32;
                    rx[0] = self.cells[addr as usize];
                }
                OPCODE_READ_STATUS => {
                    rx[0] = if self.wip_reads_remaining > 0 {
                        self.wip_reads_remaining -= 1;
                        STATUS_WIP
                    } else {
                        0
                    };
                }
                OPCODE_WRITE => {
                    let addr = ((tx[1] as u32) << 16) | ((tx[2] as u32) << 8) | tx[3] as u32;
                    self.cells[addr as usize] = tx[4];
                }
                _ => {}
            }
            Ok(())
        }
    }

    struct NoopDelay;
    impl kernel::CooperativeDelay for NoopDelay {
        fn delay(&self, _which: Delay) {}
    }
    static NOOP_DELAY: NoopDelay = NoopDelay;

    fn init_delay() {
        kernel::delay::set_delay_impl(&NOOP_DELAY);
    }

    #[test]
    fn single_write_then_read_round_trips() {
        init_delay();
        let hal = EepromHal::new(FakeBus::new());
        hal.single_write(0x300, 0x5A).unwrap();
        assert_eq!(hal.single_read(0x300).unwrap(), 0x5A);
    }

    #[test]
    fn bytes_are_stored_inverted_on_disk() {
        init_delay();
        let hal = EepromHal::new(FakeBus::new());
        hal.single_write(0x10, 0xAB).unwrap();
        let raw = hal.bus.lock().cells[0x10];
        assert_eq!(raw, !0xABu8);
    }

    #[test]
    fn bulk_round_trip_matches_original_buffer() {
        init_delay();
        let hal = EepromHal::new(FakeBus::new());
        let data = [1u8, 2, 3, 4, 5];
        hal.bulk_write(0x1000, &data).unwrap();
        let mut out = [0u8; 5];
        hal.bulk_read(0x1000, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn out_of_range_write_is_rejected() {
        init_delay();
        let hal = EepromHal::new(FakeBus::new());
        assert_eq!(hal.single_write(CAPACITY, 0).unwrap_err(), Error::OutOfRange);
        assert_eq!(hal.bulk_write(CAPACITY - 2, &[1, 2, 3]).unwrap_err(), Error::OutOfRange);
    }

    #[test]
    fn page_erase_polls_until_wip_clears() {
        init_delay();
        let mut bus = FakeBus::new();
        bus.wip_reads_remaining = 3;
        let hal = EepromHal::new(bus);
        hal.page_erase(0x2000).unwrap();
    }
}
