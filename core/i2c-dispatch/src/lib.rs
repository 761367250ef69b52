// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The binary I2C command protocol: an ISR-side frame reassembler feeding a
//! bounded queue, and a task-side dispatcher that looks the reassembled
//! frame up in a 256-entry code table and invokes its handler.

#![cfg_attr(not(test), no_std)]

use kernel::{cooperative_delay, Delay, Mutex, Queue, QueueFull};
use ringbuf::*;
use switchfw_proto::i2c_code::I2cCodeEntry;

/// Largest custom-param payload a single transaction can carry. Matches
/// the static-param ceiling in the code-table entry shape.
pub const BUFFER_CAPACITY: usize = 20;
pub const CODE_TABLE_SIZE: usize = 256;
pub const QUEUE_DEPTH: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    pub bytes: [u8; BUFFER_CAPACITY + 1],
    pub len: usize,
}

impl Packet {
    const fn empty() -> Self {
        Self { bytes: [0; BUFFER_CAPACITY + 1], len: 0 }
    }

    pub fn code(&self) -> u8 {
        self.bytes[0]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Started,
    Appended(usize),
    Enqueued,
    Overflowed,
    Dropped,
    DroppedFull,
}
ringbuf!(Trace, 32, Trace::None);

/// Reassembles I2C slave transactions byte-by-byte from interrupt context.
/// The lookup table tells the reassembler how many custom bytes to expect
/// once it has the command code (the first byte of the transaction).
pub struct Reassembler {
    buffer: [u8; BUFFER_CAPACITY + 1],
    index: usize,
    consumed: bool,
}

impl Reassembler {
    pub const fn new() -> Self {
        Self { buffer: [0; BUFFER_CAPACITY + 1], index: 0, consumed: true }
    }

    pub fn on_start(&mut self) {
        self.index = 0;
        self.consumed = false;
        ringbuf_entry!(Trace::Started);
    }

    /// Appends one byte to the in-flight transaction. If the transaction
    /// is already fully reassembled (and awaiting dispatch), or the buffer
    /// would overflow, the byte is dropped and the index wraps to zero.
    ///
    /// Returns `Some(Packet)` once `index` reaches the expected length for
    /// the code in `buffer[0]`, looked up in `code_table`.
    pub fn on_data(&mut self, byte: u8, code_table: &[I2cCodeEntry; CODE_TABLE_SIZE]) -> Option<Packet> {
        if self.consumed {
            return None;
        }
        if self.index >= self.buffer.len() {
            self.index = 0;
            ringbuf_entry!(Trace::Overflowed);
            return None;
        }
        self.buffer[self.index] = byte;
        self.index += 1;
        ringbuf_entry!(Trace::Appended(self.index));

        if self.index == 1 {
            return None;
        }
        let entry = &code_table[self.buffer[0] as usize];
        let expected_len = 1 + entry.custom_param_count;
        if self.index == expected_len {
            self.consumed = true;
            ringbuf_entry!(Trace::Enqueued);
            let mut bytes = [0u8; BUFFER_CAPACITY + 1];
            bytes[..self.index].copy_from_slice(&self.buffer[..self.index]);
            Some(Packet { bytes, len: self.index })
        } else {
            None
        }
    }

    pub fn on_stop(&mut self) {}
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// ISR-safe enqueue of a reassembled packet onto the dispatcher's work
/// queue. Never blocks. The queue is sized for worst-case occupancy (the
/// dispatcher task drains faster than a single I2C master can generate
/// transactions), so a full queue here means that invariant has been
/// violated and is treated as fatal rather than silently dropped.
pub fn enqueue_from_isr(queue: &Queue<Packet, QUEUE_DEPTH>, packet: Packet) {
    if queue.enqueue(packet) == Err(QueueFull) {
        ringbuf_entry!(Trace::DroppedFull);
        panic!("i2c dispatch queue full");
    }
}

pub trait I2cBus {
    type Error: Copy;
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;
}

/// Looks a reassembled packet up in the code table and runs its handler,
/// transmitting the response over `bus`.
///
/// A packet whose code-table slot doesn't actually carry that code (an
/// unused slot) is dropped rather than mistakenly dispatched.
pub fn dispatch_one<B: I2cBus>(
    bus: &Mutex<B>,
    code_table: &'static [I2cCodeEntry; CODE_TABLE_SIZE],
    packet: &Packet,
) -> Result<(), B::Error> {
    let entry = &code_table[packet.code() as usize];
    if entry.code != packet.code() {
        ringbuf_entry!(Trace::Dropped);
        return Ok(());
    }

    let mut params: [u8; BUFFER_CAPACITY] = [0; BUFFER_CAPACITY];
    let total = entry.total_param_count();
    params[..entry.static_param_count].copy_from_slice(entry.static_params);
    let custom = &packet.as_slice()[1..1 + entry.custom_param_count];
    params[entry.static_param_count..total].copy_from_slice(custom);

    let mut guard = bus.lock();
    cooperative_delay(Delay::Short);
    guard.write_byte(entry.return_count as u8)?;
    let result = entry.handler.invoke(&params[..total]);
    if entry.return_count == 1 {
        guard.write_byte(result)?;
    }
    Ok(())
}
