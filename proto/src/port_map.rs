// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only rendering tables for port/device configuration registers:
//! which bits in a register mean what, for `show` commands to walk.

#[derive(Copy, Clone)]
pub struct PortOptionValue {
    pub masked_value: u8,
    pub human_name: &'static str,
}

#[derive(Copy, Clone)]
pub struct PortOption {
    pub bitmask: u8,
    pub description: &'static str,
    pub values: &'static [PortOptionValue],
}

impl PortOption {
    /// Renders the human name for whatever value `register` holds in this
    /// option's bit field, or `None` if the masked value isn't in the
    /// table (malformed register contents, not a programming error).
    pub fn describe(&self, register: u8) -> Option<&'static str> {
        let masked = register & self.bitmask;
        self.values.iter().find(|v| v.masked_value == masked).map(|v| v.human_name)
    }
}

#[derive(Copy, Clone)]
pub struct PortConfigMapping {
    pub base_register_offset: u8,
    pub title: &'static str,
    pub options: &'static [PortOption],
}
