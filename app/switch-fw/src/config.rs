// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Board- and deployment-specific constants, collected in one place the
//! way the teacher's per-board `app.toml` collects chip and pin
//! assignments -- without the build-time TOML/Idol generation step this
//! pack doesn't carry, these are plain compile-time constants instead.

/// UART baud rate the CLI transport is configured for.
pub const UART_BAUD_RATE: u32 = 115_200;

/// The I2C address this board answers slave transactions on.
pub const I2C_SLAVE_ADDRESS: u8 = 0x5A;

/// Password the root account starts with on a freshly reinitialized board.
/// Never used once a save has persisted a different one.
pub const ROOT_DEFAULT_PASSWORD: &str = "password";

/// Core clock, used to turn the three cooperative delay durations into a
/// cycle count for [`crate::board::CycleDelay`].
pub const CORE_CLOCK_HZ: u32 = 48_000_000;

/// Ticks per event-log timestamp; ticks are cycles divided down by this so
/// a u32 tick counter doesn't wrap for a long time.
pub const CYCLES_PER_TICK: u32 = CORE_CLOCK_HZ / 1_000;
