// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The binary I2C command protocol's code table: one entry per command
//! code, looked up by the dispatcher after a full frame is reassembled.

/// Invoked with the frame's parameter bytes (static params from the table
/// entry followed by whatever custom bytes the master sent); returns the
/// single response byte the dispatcher writes back.
pub trait I2cHandler: Sync {
    fn invoke(&self, params: &[u8]) -> u8;
}

pub const MAX_STATIC_PARAMS: usize = 20;

#[derive(Copy, Clone)]
pub struct I2cCodeEntry {
    pub code: u8,
    pub static_param_count: usize,
    pub custom_param_count: usize,
    pub return_count: usize,
    pub static_params: &'static [u8],
    pub handler: &'static dyn I2cHandler,
}

impl I2cCodeEntry {
    /// Total bytes the dispatcher must have reassembled before invoking
    /// this entry's handler: the static params baked into the table plus
    /// whatever custom bytes the frame carries.
    pub const fn total_param_count(&self) -> usize {
        self.static_param_count + self.custom_param_count
    }

    pub fn find(table: &'static [I2cCodeEntry], code: u8) -> Option<&'static I2cCodeEntry> {
        table.iter().find(|e| e.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl I2cHandler for Echo {
        fn invoke(&self, params: &[u8]) -> u8 {
            params.first().copied().unwrap_or(0)
        }
    }
    static ECHO: Echo = Echo;

    static TABLE: [I2cCodeEntry; 1] = [I2cCodeEntry {
        code: 0x10,
        static_param_count: 1,
        custom_param_count: 2,
        return_count: 1,
        static_params: &[0xAA],
        handler: &ECHO,
    }];

    #[test]
    fn lookup_by_code_finds_entry() {
        let entry = I2cCodeEntry::find(&TABLE, 0x10).expect("0x10 is registered");
        assert_eq!(entry.total_param_count(), 3);
    }

    #[test]
    fn lookup_by_unknown_code_returns_none() {
        assert!(I2cCodeEntry::find(&TABLE, 0x11).is_none());
    }
}
