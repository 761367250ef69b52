// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The persisted system-flags byte at EEPROM address 0x1E, consulted once
//! at boot restore to decide which regions need loading.

use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct SystemFlags: u8 {
        const REINIT_REQUEST = 0b1000_0000;
        const CONFIG_SAVED   = 0b0100_0000;
        const VLAN_SAVED     = 0b0010_0000;
        const USERS_SAVED    = 0b0001_0000;
    }
}

impl SystemFlags {
    /// The flag combination `save_config` writes back after a full save:
    /// config, VLAN, and users all saved, reinit request cleared.
    pub fn after_save() -> Self {
        Self::CONFIG_SAVED | Self::VLAN_SAVED | Self::USERS_SAVED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trips_through_bits() {
        let flags = SystemFlags::REINIT_REQUEST | SystemFlags::USERS_SAVED;
        assert_eq!(SystemFlags::from_bits_truncate(flags.bits()), flags);
    }

    #[test]
    fn after_save_clears_reinit_request() {
        let flags = SystemFlags::after_save();
        assert!(!flags.contains(SystemFlags::REINIT_REQUEST));
        assert!(flags.contains(SystemFlags::CONFIG_SAVED));
        assert!(flags.contains(SystemFlags::VLAN_SAVED));
        assert!(flags.contains(SystemFlags::USERS_SAVED));
    }
}
