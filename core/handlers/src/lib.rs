// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Concrete command handlers binding the command-tree and I2C-code-table
//! node shapes from `switchfw-proto` to the switch-controller HAL.
//!
//! Each handler closes over a `'static` reference to the controller driver
//! at table-construction time rather than looking it up by global state,
//! per the trait-object dispatch shape the command tree is built around.

#![cfg_attr(not(test), no_std)]

use core::fmt::Write as _;

use eeprom_hal::SpiBus as EepromSpiBus;
use kernel::{cooperative_delay, Delay};
use switchfw_event_log::EventLogger;
use switchfw_proto::command::{CliError, CliHandler};
use switchfw_proto::i2c_code::I2cHandler;
use switchfw_proto::mac_table::MacTableRow;
use switchfw_proto::vlan::VlanEntry;
use switchctrl_hal::SwitchCtrlHal;

/// Log codes enqueued by the handlers in this module. Kept local since no
/// board-wide code registry is named by the persisted layout beyond "a
/// read- or write-op record" and the login event.
pub mod log_code {
    pub const WRITE_OP: u8 = 0x01;
    pub const READ_OP: u8 = 0x02;
    pub const DIAGNOSTIC_RUN: u8 = 0x03;
    pub const USER_LOGGED_IN: u8 = 0x04;
    pub const IO_EXCEPTION: u8 = 0x05;
    pub const USER_LOGGED_OUT: u8 = 0x06;
}

/// Mirrors the persisted layout's VLAN table region, without pulling in
/// `switchfw-persistence` as a dependency just for two constants.
const VLAN_REGION_BASE: u32 = 0x200;
const MAX_VLAN_ID: u16 = 4095;
const VLAN_TABLE_PAGE_SIZE: u16 = 10;
const MAC_TABLE_LEN: u16 = 0x400;

fn map_err<E>(_: switchctrl_hal::Error<E>) -> CliError {
    CliError::DeviceError
}

fn map_eeprom_err<E>(e: eeprom_hal::Error<E>) -> CliError {
    match e {
        eeprom_hal::Error::OutOfRange => CliError::InvalidParam,
        _ => CliError::DeviceError,
    }
}

fn parse_hex_u32(s: &str) -> Result<u32, CliError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|_| CliError::InvalidParam)
}

fn parse_hex_u8(s: &str) -> Result<u8, CliError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|_| CliError::InvalidParam)
}

/// The UART write/read seam that table dumps, the progress bar, and the
/// interactive checkbox menus write through. `CliHandler::invoke` itself has
/// no output channel (it only reports success or failure to the dispatcher),
/// so handlers that need to emit free-form text close over one of these
/// instead.
pub trait Console: Sync {
    fn write_bytes(&self, bytes: &[u8]);
    /// Returns the next received byte, if one is waiting. Never blocks.
    fn read_byte(&self) -> Option<u8>;
}

/// Spins on [`Console::read_byte`] at the medium cooperative delay until a
/// byte arrives, for the handlers that need one response character (the
/// vlan-table N/E prompt, the checkbox menus).
fn blocking_read_byte(console: &dyn Console) -> u8 {
    loop {
        if let Some(byte) = console.read_byte() {
            return byte;
        }
        cooperative_delay(Delay::Medium);
    }
}

fn write_vlan_row(console: &dyn Console, entry: &VlanEntry) {
    let mut line: heapless::String<48> = heapless::String::new();
    let _ = write!(line, "\r\nvlan {:>4}  membership 0x{:02X}", entry.vlan_id, entry.port_membership);
    console.write_bytes(line.as_bytes());
}

fn write_mac_row(console: &dyn Console, row: &MacTableRow) {
    let mut line: heapless::String<96> = heapless::String::new();
    let _ = write!(
        line,
        "\r\nfilter {:>3}  ports 0x{:02X}{}  {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        row.filter_id,
        row.forwarding_ports,
        if row.override_stp { " stp-override" } else { "" },
        row.mac[0],
        row.mac[1],
        row.mac[2],
        row.mac[3],
        row.mac[4],
        row.mac[5],
    );
    console.write_bytes(line.as_bytes());
}

/// set-bit / clear-bit: toggles `mask` in `register` and poll-verifies the
/// change stuck, per the handler family described for quick-control codes.
/// On success, enqueues a write-op log record (HAL operations that touch a
/// device log, not ones that merely fail to reach it).
pub struct BitToggleHandler<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
    pub logger: &'static EventLogger<'static, EB>,
    pub register: u8,
    pub mask: u8,
    pub set: bool,
}

impl<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> CliHandler for BitToggleHandler<B, EB> {
    fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
        let result = if self.set {
            self.ctrl.set_bit(self.register, self.mask)
        } else {
            self.ctrl.clear_bit(self.register, self.mask)
        };
        if result.is_ok() {
            self.logger.enqueue(log_code::WRITE_OP);
        }
        result.map_err(map_err)
    }
}

impl<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> I2cHandler for BitToggleHandler<B, EB> {
    fn invoke(&self, _params: &[u8]) -> u8 {
        CliHandler::invoke(self, &[]).is_ok() as u8
    }
}

/// self-clearing-bit family: used for the dynamic-MAC-table flush and
/// similar one-shot device-driven operations.
pub struct SelfClearingBitHandler<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
    pub logger: &'static EventLogger<'static, EB>,
    pub register: u8,
    pub mask: u8,
}

impl<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> CliHandler for SelfClearingBitHandler<B, EB> {
    fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
        let result = self.ctrl.self_clearing_bit(self.register, self.mask);
        if result.is_ok() {
            self.logger.enqueue(log_code::WRITE_OP);
        }
        result.map_err(map_err)
    }
}

impl<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> I2cHandler for SelfClearingBitHandler<B, EB> {
    fn invoke(&self, _params: &[u8]) -> u8 {
        CliHandler::invoke(self, &[]).is_ok() as u8
    }
}

/// cable diagnostics (LinkMD) on a fixed port base register.
pub struct LinkMdHandler<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
    pub logger: &'static EventLogger<'static, EB>,
    pub port_base: u8,
}

impl<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> CliHandler for LinkMdHandler<B, EB> {
    fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
        let result = self.ctrl.run_linkmd(self.port_base);
        if result.is_ok() {
            self.logger.enqueue(log_code::DIAGNOSTIC_RUN);
        }
        result.map(|_| ()).map_err(map_err)
    }
}

/// set-vlan-entry: parses a "<vlan_id> <membership_bitmap>" parameter pair,
/// programs the indirect table, and mirrors the same entry into the EEPROM
/// VLAN region so a saved/re-read config and `show-vlan-table` (which walks
/// EEPROM, not the indirect table) see it too.
pub struct SetVlanEntryHandler<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
    pub logger: &'static EventLogger<'static, EB>,
    pub eeprom: &'static eeprom_hal::EepromHal<EB>,
}

impl<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> CliHandler for SetVlanEntryHandler<B, EB> {
    fn invoke(&self, params: &[&str]) -> Result<(), CliError> {
        let [vlan_id_str, membership_str] = params else {
            return Err(CliError::WrongParamCount);
        };
        let vlan_id: u16 = vlan_id_str.parse().map_err(|_| CliError::InvalidParam)?;
        let membership: u8 = membership_str.parse().map_err(|_| CliError::InvalidParam)?;
        if vlan_id == 0 || vlan_id > 4095 {
            return Err(CliError::InvalidParam);
        }
        let entry = VlanEntry { vlan_id, port_membership: membership, valid: true };
        self.ctrl.vlan_write(entry).map_err(map_err)?;
        self.eeprom
            .single_write(VLAN_REGION_BASE + u32::from(vlan_id - 1), entry.to_eeprom_byte())
            .map_err(map_eeprom_err)?;
        self.logger.enqueue(log_code::WRITE_OP);
        Ok(())
    }
}

/// show-vlan-entry: the read half of the same pack/unpack machinery,
/// exposed as an I2C quick-control code (single-byte membership response).
pub struct ReadVlanEntryHandler<B: switchctrl_hal::SpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
}

impl<B: switchctrl_hal::SpiBus + 'static> I2cHandler for ReadVlanEntryHandler<B> {
    fn invoke(&self, params: &[u8]) -> u8 {
        let Some(&lo) = params.first() else { return 0 };
        let Some(&hi) = params.get(1) else { return 0 };
        let vlan_id = u16::from(hi) << 8 | u16::from(lo);
        self.ctrl.vlan_read(vlan_id).map(|e| e.to_eeprom_byte()).unwrap_or(0)
    }
}

/// set-port-vlan: enables tag insertion on the port, programs its 12-bit
/// default VLAN, then scans the other three user ports for a matching
/// default VLAN and OR-in's each match's membership bit to compute the
/// assertion mask written into the indirect VLAN table.
pub struct SetPortVlanHandler<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
    pub logger: &'static EventLogger<'static, EB>,
    pub port_index: usize,
    pub sibling_indices: [usize; 3],
}

impl<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> CliHandler for SetPortVlanHandler<B, EB> {
    fn invoke(&self, params: &[&str]) -> Result<(), CliError> {
        let [vlan_id_str] = params else {
            return Err(CliError::WrongParamCount);
        };
        let vlan_id: u16 = vlan_id_str.parse().map_err(|_| CliError::InvalidParam)?;
        if vlan_id == 0 || vlan_id > MAX_VLAN_ID {
            return Err(CliError::InvalidParam);
        }

        let port_base = switchctrl_hal::PORT_OFFSETS[self.port_index];
        self.ctrl.set_port_default_vlan(port_base, vlan_id).map_err(map_err)?;

        let mut mask = switchctrl_hal::port_bit(self.port_index);
        for &sibling in &self.sibling_indices {
            let sibling_base = switchctrl_hal::PORT_OFFSETS[sibling];
            let sibling_vlan = self.ctrl.port_default_vlan(sibling_base).map_err(map_err)?;
            if sibling_vlan == vlan_id {
                mask |= switchctrl_hal::port_bit(sibling);
            }
        }

        self.ctrl
            .vlan_write(VlanEntry { vlan_id, port_membership: mask, valid: true })
            .map_err(map_err)?;
        self.logger.enqueue(log_code::WRITE_OP);
        Ok(())
    }
}

/// show-vlan-table: walks the EEPROM VLAN region (not the indirect table,
/// which only holds the live image) and paginates 10 valid entries at a
/// time behind an N)ext/E)xit prompt.
pub struct ShowVlanTableHandler<EB: EepromSpiBus + 'static> {
    pub eeprom: &'static eeprom_hal::EepromHal<EB>,
    pub console: &'static dyn Console,
}

impl<EB: EepromSpiBus + 'static> CliHandler for ShowVlanTableHandler<EB> {
    fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
        let mut vlan_id: u16 = 1;
        loop {
            let mut shown_this_page = 0u16;
            while vlan_id <= MAX_VLAN_ID && shown_this_page < VLAN_TABLE_PAGE_SIZE {
                let addr = VLAN_REGION_BASE + u32::from(vlan_id - 1);
                let byte = self.eeprom.single_read(addr).map_err(map_eeprom_err)?;
                let entry = VlanEntry::from_eeprom_byte(vlan_id, byte);
                if entry.valid {
                    write_vlan_row(self.console, &entry);
                    shown_this_page += 1;
                }
                vlan_id += 1;
                cooperative_delay(Delay::Short);
            }
            if vlan_id > MAX_VLAN_ID {
                self.console.write_bytes(b"\r\n");
                return Ok(());
            }
            self.console.write_bytes(b"\r\nN)ext E)xit: ");
            if matches!(blocking_read_byte(self.console), b'E' | b'e') {
                self.console.write_bytes(b"\r\n");
                return Ok(());
            }
        }
    }
}

/// show-static-mac-table: iterates the controller's indirect static MAC
/// table over its full index range and renders every valid row.
pub struct ShowStaticMacTableHandler<B: switchctrl_hal::SpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
    pub console: &'static dyn Console,
}

impl<B: switchctrl_hal::SpiBus + 'static> CliHandler for ShowStaticMacTableHandler<B> {
    fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
        for index in 0..MAC_TABLE_LEN {
            let row = self.ctrl.read_static_mac_entry(index).map_err(map_err)?;
            if row.valid {
                write_mac_row(self.console, &row);
            }
            if index % VLAN_TABLE_PAGE_SIZE == VLAN_TABLE_PAGE_SIZE - 1 {
                cooperative_delay(Delay::Short);
            }
        }
        self.console.write_bytes(b"\r\n");
        Ok(())
    }
}

/// show-dynamic-mac-table: same row rendering as the static table, but
/// exits early once the table reports itself empty or its remaining-entry
/// count shrinks from one read to the next (the controller is still
/// learning/aging while this scan runs).
pub struct ShowDynamicMacTableHandler<B: switchctrl_hal::SpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
    pub console: &'static dyn Console,
}

impl<B: switchctrl_hal::SpiBus + 'static> CliHandler for ShowDynamicMacTableHandler<B> {
    fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
        let mut last_remaining: Option<u16> = None;
        for index in 0..MAC_TABLE_LEN {
            let status = self.ctrl.read_dynamic_mac_entry(index).map_err(map_err)?;
            if status.table_empty {
                break;
            }
            if let Some(previous) = last_remaining {
                if status.remaining_count < previous {
                    break;
                }
            }
            last_remaining = Some(status.remaining_count);
            if status.row.valid {
                write_mac_row(self.console, &status.row);
            }
            if index % VLAN_TABLE_PAGE_SIZE == VLAN_TABLE_PAGE_SIZE - 1 {
                cooperative_delay(Delay::Short);
            }
        }
        self.console.write_bytes(b"\r\n");
        Ok(())
    }
}

/// Action published to a [`ProgressBar`] handle by a long-running operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProgressAction {
    Increment,
    Decrement,
    Reset,
    Fill,
    FillError,
}

/// A named progress-bar handle. Stores the last reported percentage so that
/// an Increment/Decrement only renders the delta instead of redrawing the
/// whole bar. The percentage lives behind a [`kernel::Mutex`] rather than a
/// plain `Cell` since handles are shared `&'static` across tasks the same
/// way the other device handles in this crate are.
pub struct ProgressBar<'c> {
    console: &'c dyn Console,
    last_percent: kernel::Mutex<u8>,
}

impl<'c> ProgressBar<'c> {
    pub fn new(console: &'c dyn Console) -> Self {
        Self { console, last_percent: kernel::Mutex::new(0) }
    }

    pub fn report(&self, action: ProgressAction, percent: u8) {
        match action {
            ProgressAction::Reset => {
                *self.last_percent.lock() = 0;
                self.console.write_bytes(b"\r\n[progress reset]");
            }
            ProgressAction::Increment | ProgressAction::Decrement => self.render_delta(percent),
            ProgressAction::Fill => {
                self.render_delta(100);
                self.console.write_bytes(b" done\r\n");
            }
            ProgressAction::FillError => {
                self.console.write_bytes(b"\r\n[progress failed]\r\n");
            }
        }
    }

    fn render_delta(&self, percent: u8) {
        let mut last_percent = self.last_percent.lock();
        let from = *last_percent;
        let mut line: heapless::String<16> = heapless::String::new();
        if percent >= from {
            let _ = write!(line, "+{}%", percent - from);
        } else {
            let _ = write!(line, "-{}%", from - percent);
        }
        self.console.write_bytes(line.as_bytes());
        *last_percent = percent;
    }
}

/// Outcome of running a [`CheckboxMenu`] to completion.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CheckboxOutcome {
    Confirmed,
    Exited,
}

/// The interactive checkbox UI shared by the event and delete-users menus:
/// up/down cursor movement via the ANSI escape sequences ending in 0x41/
/// 0x42, Enter toggles the highlighted row, 'C' confirms, 'E' exits without
/// committing. Deliberately has no knowledge of what the rows mean (pending
/// actions, log filters) -- callers map `selected` back to their own state
/// after [`Self::run`] returns [`CheckboxOutcome::Confirmed`].
pub struct CheckboxMenu<'c> {
    console: &'c dyn Console,
}

impl<'c> CheckboxMenu<'c> {
    pub fn new(console: &'c dyn Console) -> Self {
        Self { console }
    }

    pub fn run(&self, labels: &[&str], selected: &mut [bool]) -> CheckboxOutcome {
        let mut cursor = 0usize;
        self.redraw(labels, selected, cursor);
        loop {
            match blocking_read_byte(self.console) {
                0x1B => {
                    let _ = blocking_read_byte(self.console); // '['
                    match blocking_read_byte(self.console) {
                        0x41 => cursor = cursor.saturating_sub(1),
                        0x42 => {
                            if cursor + 1 < labels.len() {
                                cursor += 1;
                            }
                        }
                        _ => {}
                    }
                }
                b'\r' | b'\n' => {
                    if let Some(slot) = selected.get_mut(cursor) {
                        *slot = !*slot;
                    }
                }
                b'C' | b'c' => return CheckboxOutcome::Confirmed,
                b'E' | b'e' => return CheckboxOutcome::Exited,
                _ => {}
            }
            self.redraw(labels, selected, cursor);
        }
    }

    fn redraw(&self, labels: &[&str], selected: &[bool], cursor: usize) {
        self.console.write_bytes(b"\r\n");
        for (i, label) in labels.iter().enumerate() {
            self.console.write_bytes(if i == cursor { b"> [" } else { b"  [" });
            self.console.write_bytes(if selected.get(i).copied().unwrap_or(false) { b"x] " } else { b" ] " });
            self.console.write_bytes(label.as_bytes());
        }
        self.console.write_bytes(b"\r\n(C)onfirm (E)xit: ");
    }
}

/// `system eeprom write-reg <addr> <byte>`: raw EEPROM register poke, both
/// fields given in hex.
pub struct EepromWriteRegHandler<EB: EepromSpiBus + 'static> {
    pub eeprom: &'static eeprom_hal::EepromHal<EB>,
    pub logger: &'static EventLogger<'static, EB>,
}

impl<EB: EepromSpiBus + 'static> CliHandler for EepromWriteRegHandler<EB> {
    fn invoke(&self, params: &[&str]) -> Result<(), CliError> {
        let [addr_str, byte_str] = params else {
            return Err(CliError::WrongParamCount);
        };
        let addr = parse_hex_u32(addr_str)?;
        let byte = parse_hex_u8(byte_str)?;
        self.eeprom.single_write(addr, byte).map_err(map_eeprom_err)?;
        self.logger.enqueue(log_code::WRITE_OP);
        Ok(())
    }
}

/// `system eeprom read-reg <addr>`: raw EEPROM register peek, printed as hex.
pub struct EepromReadRegHandler<EB: EepromSpiBus + 'static> {
    pub eeprom: &'static eeprom_hal::EepromHal<EB>,
    pub logger: &'static EventLogger<'static, EB>,
    pub console: &'static dyn Console,
}

impl<EB: EepromSpiBus + 'static> CliHandler for EepromReadRegHandler<EB> {
    fn invoke(&self, params: &[&str]) -> Result<(), CliError> {
        let [addr_str] = params else {
            return Err(CliError::WrongParamCount);
        };
        let addr = parse_hex_u32(addr_str)?;
        let byte = self.eeprom.single_read(addr).map_err(map_eeprom_err)?;
        self.logger.enqueue(log_code::READ_OP);
        let mut line: heapless::String<8> = heapless::String::new();
        let _ = write!(line, "0x{:02X}", byte);
        self.console.write_bytes(b"\r\n");
        self.console.write_bytes(line.as_bytes());
        Ok(())
    }
}

/// `controller write-reg <reg> <byte>`: raw switch-controller register poke.
pub struct CtrlWriteRegHandler<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
    pub logger: &'static EventLogger<'static, EB>,
}

impl<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> CliHandler for CtrlWriteRegHandler<B, EB> {
    fn invoke(&self, params: &[&str]) -> Result<(), CliError> {
        let [reg_str, byte_str] = params else {
            return Err(CliError::WrongParamCount);
        };
        let reg = parse_hex_u8(reg_str)?;
        let byte = parse_hex_u8(byte_str)?;
        self.ctrl.ctrl_write(reg, byte).map_err(map_err)?;
        self.logger.enqueue(log_code::WRITE_OP);
        Ok(())
    }
}

/// `controller read-reg <reg>`: raw switch-controller register peek, printed
/// as hex.
pub struct CtrlReadRegHandler<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> {
    pub ctrl: &'static SwitchCtrlHal<B>,
    pub logger: &'static EventLogger<'static, EB>,
    pub console: &'static dyn Console,
}

impl<B: switchctrl_hal::SpiBus + 'static, EB: EepromSpiBus + 'static> CliHandler for CtrlReadRegHandler<B, EB> {
    fn invoke(&self, params: &[&str]) -> Result<(), CliError> {
        let [reg_str] = params else {
            return Err(CliError::WrongParamCount);
        };
        let reg = parse_hex_u8(reg_str)?;
        let byte = self.ctrl.ctrl_read(reg).map_err(map_err)?;
        self.logger.enqueue(log_code::READ_OP);
        let mut line: heapless::String<8> = heapless::String::new();
        let _ = write!(line, "0x{:02X}", byte);
        self.console.write_bytes(b"\r\n");
        self.console.write_bytes(line.as_bytes());
        Ok(())
    }
}
