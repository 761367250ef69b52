// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User table: up to 15 configurable slots plus a built-in root slot that
//! can never be deleted.

use crate::role::Role;
use fixedstr::FixedString;

/// Number of configurable user slots (indices 0..15).
pub const USER_SLOTS: usize = 15;
/// Index of the built-in root account. Never empty, never deletable.
pub const ROOT_SLOT: usize = 15;
/// Total slots including the root account.
pub const TOTAL_SLOTS: usize = USER_SLOTS + 1;

pub const FIELD_LEN: usize = 16;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PendingAction {
    None,
    Add,
    Update,
    Delete,
}

#[derive(Copy, Clone, Debug)]
pub struct User {
    pub username: FixedString<FIELD_LEN>,
    pub first_name: FixedString<FIELD_LEN>,
    pub last_name: FixedString<FIELD_LEN>,
    pub password: FixedString<FIELD_LEN>,
    pub role: Role,
    pub marked_for_action: bool,
    pub pending_action: PendingAction,
}

const EMPTY_FIELD: FixedString<FIELD_LEN> = FixedString::from_str("");

impl User {
    pub const fn empty() -> Self {
        Self {
            username: EMPTY_FIELD,
            first_name: EMPTY_FIELD,
            last_name: EMPTY_FIELD,
            password: EMPTY_FIELD,
            role: Role::ReadOnly,
            marked_for_action: false,
            pending_action: PendingAction::None,
        }
    }

    pub fn root(password: &str) -> Self {
        let mut u = Self::empty();
        u.username = FixedString::from_str("root");
        u.password = FixedString::try_from_str(password).unwrap_or(EMPTY_FIELD);
        u.role = Role::Administrator;
        u
    }

    /// A slot is empty iff its username is the empty string.
    pub fn is_empty_slot(&self) -> bool {
        self.username.as_str().is_empty()
    }
}

/// The full user table: 15 user-manageable slots plus the root slot at
/// index [`ROOT_SLOT`]. The root slot is never overwritten by a delete
/// operation, and usernames are unique across non-empty slots.
pub struct UserTable {
    slots: [User; TOTAL_SLOTS],
}

impl UserTable {
    pub fn new(root_password: &str) -> Self {
        let mut slots = [User::empty(); TOTAL_SLOTS];
        slots[ROOT_SLOT] = User::root(root_password);
        Self { slots }
    }

    pub fn slots(&self) -> &[User; TOTAL_SLOTS] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> &User {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut User {
        &mut self.slots[index]
    }

    /// Finds the slot index matching `username` exactly (clear-text
    /// password comparison is the authentication mechanism's job, not
    /// this lookup's).
    pub fn find(&self, username: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|u| !u.is_empty_slot() && u.username.as_str() == username)
    }

    /// Finds the first empty configurable slot (excludes the root slot).
    pub fn first_empty(&self) -> Option<usize> {
        (0..USER_SLOTS).find(|&i| self.slots[i].is_empty_slot())
    }

    /// Deletes the slot at `index`, refusing to touch the root slot.
    /// Returns `false` if `index` is the root slot.
    pub fn delete(&mut self, index: usize) -> bool {
        if index == ROOT_SLOT {
            return false;
        }
        self.slots[index] = User::empty();
        true
    }

    /// Compacts the configurable slots so all occupied entries are
    /// contiguous starting at index 0, preserving relative order. Used by
    /// save-config after processing pending deletes.
    pub fn compact(&mut self) {
        let mut write = 0;
        for read in 0..USER_SLOTS {
            if !self.slots[read].is_empty_slot() {
                if write != read {
                    self.slots[write] = self.slots[read];
                    self.slots[read] = User::empty();
                }
                write += 1;
            }
        }
    }
}
