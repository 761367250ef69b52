// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded rows from the switch controller's indirect static and dynamic
//! MAC address tables. Unlike the VLAN indirect table (§4.2), the source
//! material doesn't document an exact bit layout for these two tables, so
//! the one-entry-per-index-read window below is this core's own choice:
//! one control byte, a filter id, a 16-bit remaining-count field (dynamic
//! table only), and the six-byte MAC address.

/// Bytes read back per index from either indirect MAC table.
pub const MAC_ENTRY_LEN: usize = 11;

const VALID_BIT: u8 = 0x80;
const TABLE_EMPTY_BIT: u8 = 0x40;
const OVERRIDE_STP_BIT: u8 = 0x20;
const FORWARDING_PORTS_MASK: u8 = 0x1F;

/// One row of either MAC table: filter id, override-STP flag, the
/// forwarding-ports bitmap (four user ports plus the expansion port), and
/// the MAC address itself.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MacTableRow {
    pub valid: bool,
    pub override_stp: bool,
    pub forwarding_ports: u8,
    pub filter_id: u8,
    pub mac: [u8; 6],
}

impl MacTableRow {
    pub fn decode(data: &[u8; MAC_ENTRY_LEN]) -> Self {
        Self {
            valid: data[0] & VALID_BIT != 0,
            override_stp: data[0] & OVERRIDE_STP_BIT != 0,
            forwarding_ports: data[1] & FORWARDING_PORTS_MASK,
            filter_id: data[2],
            mac: [data[5], data[6], data[7], data[8], data[9], data[10]],
        }
    }
}

/// The dynamic table additionally reports whether it's empty and how many
/// valid entries remain as of this read, so a scanner can stop early
/// instead of walking all 1024 indices on an idle switch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DynamicMacStatus {
    pub row: MacTableRow,
    pub table_empty: bool,
    pub remaining_count: u16,
}

impl DynamicMacStatus {
    pub fn decode(data: &[u8; MAC_ENTRY_LEN]) -> Self {
        Self {
            row: MacTableRow::decode(data),
            table_empty: data[0] & TABLE_EMPTY_BIT != 0,
            remaining_count: u16::from_be_bytes([data[3], data[4]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_row_decodes_control_byte_and_mac() {
        let mut data = [0u8; MAC_ENTRY_LEN];
        data[0] = VALID_BIT | OVERRIDE_STP_BIT;
        data[1] = 0b10101;
        data[2] = 7;
        data[5..11].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let row = MacTableRow::decode(&data);
        assert!(row.valid);
        assert!(row.override_stp);
        assert_eq!(row.forwarding_ports, 0b10101);
        assert_eq!(row.filter_id, 7);
        assert_eq!(row.mac, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn dynamic_status_reports_empty_and_remaining_count() {
        let mut data = [0u8; MAC_ENTRY_LEN];
        data[0] = VALID_BIT | TABLE_EMPTY_BIT;
        data[3..5].copy_from_slice(&42u16.to_be_bytes());
        let status = DynamicMacStatus::decode(&data);
        assert!(status.table_empty);
        assert_eq!(status.remaining_count, 42);
    }
}
