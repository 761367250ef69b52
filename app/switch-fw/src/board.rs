// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The chip-specific seam: byte-level SPI/I2C/UART transport, plus the
//! cooperative delay and tick-source primitives a concrete board plugs
//! into the generic task wiring in [`crate`].
//!
//! Every transport type here is zero-sized -- the state they operate on
//! lives in the MCU's own peripheral registers, not in Rust-owned memory,
//! which is what lets [`crate::run`] declare the HAL wrappers around them
//! as plain `static`s. Driving the actual peripheral (clocking SPI bits,
//! answering an I2C slave address match, framing UART bytes) is a real
//! board support package's job; the methods below are that job's marked
//! boundary, not a working driver.

use core::convert::Infallible;
use cortex_m::peripheral::DWT;
use kernel::{CooperativeDelay, Delay};
use switchfw_event_log::TickSource;

pub struct EepromBus;

impl eeprom_hal::SpiBus for EepromBus {
    type Error = Infallible;
    fn transfer(&mut self, _tx: &[u8], _rx: &mut [u8]) -> Result<(), Self::Error> {
        unimplemented!("board support package must drive the EEPROM SPI peripheral")
    }
}

pub struct CtrlBus;

impl switchctrl_hal::SpiBus for CtrlBus {
    type Error = Infallible;
    fn transfer(&mut self, _tx: &[u8], _rx: &mut [u8]) -> Result<(), Self::Error> {
        unimplemented!("board support package must drive the switch controller SPI peripheral")
    }
}

pub struct I2cTransport;

impl switchfw_i2c_dispatch::I2cBus for I2cTransport {
    type Error = Infallible;
    fn write_byte(&mut self, _byte: u8) -> Result<(), Self::Error> {
        unimplemented!("board support package must drive the I2C slave peripheral")
    }
}

pub struct Uart;

impl crate::UartIo for Uart {
    fn try_read_byte(&mut self) -> Option<u8> {
        unimplemented!("board support package must drive the UART RX peripheral")
    }

    fn write_bytes(&mut self, _bytes: &[u8]) {
        unimplemented!("board support package must drive the UART TX peripheral")
    }
}

/// The table/menu/progress handlers in `switchfw-handlers` address the UART
/// through `&self`, unlike [`crate::UartIo`]'s `&mut self` shape, since they
/// are invoked through a shared `&'static` handler rather than a task that
/// owns the transport exclusively. Both traits end up on the same
/// zero-sized [`Uart`] with no conflict.
impl switchfw_handlers::Console for Uart {
    fn write_bytes(&self, _bytes: &[u8]) {
        unimplemented!("board support package must drive the UART TX peripheral")
    }

    fn read_byte(&self) -> Option<u8> {
        unimplemented!("board support package must drive the UART RX peripheral")
    }
}

/// Cooperative delay backed by the Cortex-M core's own cycle-accurate
/// `asm::delay`, so every board gets a working delay from nothing more
/// than its core clock frequency.
pub struct CycleDelay {
    pub core_clock_hz: u32,
}

impl CooperativeDelay for CycleDelay {
    fn delay(&self, which: Delay) {
        let ms = match which {
            Delay::Short => 5,
            Delay::Medium => 10,
            Delay::Long => 40,
        };
        cortex_m::asm::delay((self.core_clock_hz / 1_000) * ms);
    }
}

/// Event-log timestamp source backed by the DWT cycle counter, scaled down
/// to whole ticks so a `u32` doesn't wrap for a long time at typical core
/// clock speeds.
pub struct DwtTicks {
    pub cycles_per_tick: u32,
}

impl DwtTicks {
    /// Enables the cycle counter. Must run once at boot, before any task
    /// reads a timestamp.
    pub fn enable(dcb: &mut cortex_m::peripheral::DCB, dwt: &mut DWT) {
        dcb.enable_trace();
        dwt.enable_cycle_counter();
    }
}

impl TickSource for DwtTicks {
    fn now(&self) -> u32 {
        DWT::cycle_count() / self.cycles_per_tick.max(1)
    }
}
