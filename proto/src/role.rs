// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Permission roles. These form a total order: a user may execute any
//! command whose required permission is numerically no greater than their
//! own role.

use num_derive::FromPrimitive;

#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, FromPrimitive)]
#[repr(u8)]
pub enum Role {
    ReadOnly = 0,
    ModifyPorts = 1,
    ModifySystem = 2,
    Administrator = 3,
}

impl Role {
    /// Returns whether a user holding `self` may invoke a command that
    /// requires `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }
}
