// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register addresses for the external switch controller. Named by
//! function rather than by a specific chip's datasheet, since the core is
//! written against a register-and-indirect-table shaped controller in
//! general rather than one exact part.

/// Offsets of the four user ports plus the expansion port, within the
/// controller's per-port register blocks.
pub const PORT_OFFSETS: [u8; 5] = [0x10, 0x20, 0x30, 0x40, 0x00];
pub const EXPANSION_PORT_OFFSET: u8 = 0x00;

pub const GLOBAL_CONTROL_3: u8 = 0x03;
/// Bit that, when set, requests a flush of the dynamic MAC table; the
/// controller self-clears it once the flush completes.
pub const GLOBAL_CONTROL_3_FLUSH_DYNAMIC_MAC: u8 = 0x01;

pub const INTERRUPT_STATUS: u8 = 0x1B;

pub const INDIRECT_ACCESS_CONTROL: u8 = 0x6E;
pub const INDIRECT_ACCESS_ADDR: u8 = 0x6F;
pub const INDIRECT_DATA_BASE: u8 = 0x70;
pub const INDIRECT_DATA_LEN: u8 = 7;

pub const INDIRECT_TABLE_VLAN: u8 = 0b01;
pub const INDIRECT_TABLE_STATIC_MAC: u8 = 0b10;
pub const INDIRECT_TABLE_DYNAMIC_MAC: u8 = 0b11;
pub const INDIRECT_DIRECTION_READ: u8 = 0x00;
pub const INDIRECT_DIRECTION_WRITE: u8 = 0x80;

/// Per-port register offsets, relative to that port's base.
pub const PORT_STATUS_1: u8 = 0x02;
pub const PORT_STATUS_1_LINK_UP: u8 = 1 << 5;

pub const PORT_CONTROL_6: u8 = 0x07;
pub const PORT_CONTROL_6_DISABLE_LEARNING: u8 = 1 << 3;

pub const PORT_CONTROL_AUTO_NEG: u8 = 0x04;
pub const PORT_CONTROL_AUTO_NEG_ENABLE: u8 = 1 << 7;
pub const PORT_CONTROL_AUTO_MDIX_DISABLE: u8 = 1 << 6;

pub const PORT_LINKMD_CONTROL: u8 = 0x1A;
pub const PORT_LINKMD_START: u8 = 1 << 7;
pub const PORT_LINKMD_STATE_MASK: u8 = 0b0110_0000;
pub const PORT_LINKMD_STATE_SHIFT: u8 = 5;
pub const PORT_LINKMD_DISTANCE: u8 = 0x1B;

/// Tag-insertion and default-VLAN registers, relative to a port's base.
/// Not part of the per-port registers named above since only set-port-vlan
/// touches them.
pub const PORT_CONTROL_8: u8 = 0x09;
pub const PORT_CONTROL_8_TAG_INSERT: u8 = 1 << 2;
/// Upper four bits of the 12-bit default VLAN id.
pub const PORT_DEFAULT_VLAN_HIGH: u8 = 0x0C;
/// Lower eight bits of the 12-bit default VLAN id.
pub const PORT_DEFAULT_VLAN_LOW: u8 = 0x0D;

/// A user port's bit position within a 5-bit port-membership mask (four
/// user ports plus the expansion port at bit 4), indexed the same way as
/// [`PORT_OFFSETS`].
pub const fn port_bit(port_index: usize) -> u8 {
    1 << port_index
}
