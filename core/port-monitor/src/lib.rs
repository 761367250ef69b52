// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic link-event monitor: polls the controller's interrupt-status
//! register and flushes the dynamic MAC table across link transitions so
//! stale port bindings don't strand cascaded switches.

#![cfg_attr(not(test), no_std)]

use core::sync::atomic::{AtomicBool, Ordering};
use kernel::{cooperative_delay, Delay};
use ringbuf::*;
use switchctrl_hal::{
    Error, SpiBus, SwitchCtrlHal, INTERRUPT_STATUS, PORT_CONTROL_6, PORT_CONTROL_6_DISABLE_LEARNING,
    PORT_OFFSETS, PORT_STATUS_1, PORT_STATUS_1_LINK_UP,
};

/// Fixed scan order: expansion port first, then the four user ports in
/// their declared order. Index into [`PORT_OFFSETS`] (expansion is its
/// last entry).
const SCAN_ORDER: [(usize, u8); 5] = [
    (4, 1 << 4),
    (0, 1 << 0),
    (1, 1 << 1),
    (2, 1 << 2),
    (3, 1 << 3),
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkEvent {
    pub port_index: usize,
    pub link_up: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Idle,
    InterruptBits(u8),
    LinkChanged(usize, bool),
    FlushStarted(usize),
    FlushDone(usize),
}
ringbuf!(Trace, 32, Trace::None);

/// Per-transition tallies, independent of the trace ring's 32-entry depth,
/// for a postmortem look at a port that's been flapping for hours.
#[derive(Copy, Clone, Debug, Eq, PartialEq, counters::Count)]
enum LinkTransition {
    Up,
    Down,
}
counters::counters!(LINK_COUNTS, LinkTransition);

/// Runs as a periodic task, idle while `authenticated` is unset.
pub struct PortMonitor<'a, B: SpiBus> {
    ctrl: &'a SwitchCtrlHal<B>,
    authenticated: &'a AtomicBool,
}

impl<'a, B: SpiBus> PortMonitor<'a, B> {
    pub const fn new(ctrl: &'a SwitchCtrlHal<B>, authenticated: &'a AtomicBool) -> Self {
        Self { ctrl, authenticated }
    }

    /// Runs one scan iteration. No-ops while unauthenticated. `on_event` is
    /// called once per link transition found this pass, in the fixed scan
    /// order (expansion first), before learning is re-enabled on that port.
    pub fn scan_once(&self, on_event: &mut dyn FnMut(LinkEvent)) -> Result<(), Error<B::Error>> {
        if !self.authenticated.load(Ordering::Acquire) {
            ringbuf_entry!(Trace::Idle);
            return Ok(());
        }

        let status = self.ctrl.ctrl_read(INTERRUPT_STATUS)?;
        ringbuf_entry!(Trace::InterruptBits(status));

        for &(port_index, bit) in SCAN_ORDER.iter() {
            if status & bit == 0 {
                continue;
            }
            self.ctrl.ctrl_write(INTERRUPT_STATUS, bit)?;

            let port_base = PORT_OFFSETS[port_index];
            let link_status = self.ctrl.ctrl_read(port_base + PORT_STATUS_1)?;
            let link_up = link_status & PORT_STATUS_1_LINK_UP != 0;
            ringbuf_entry!(Trace::LinkChanged(port_index, link_up));
            counters::count!(LINK_COUNTS, if link_up { LinkTransition::Up } else { LinkTransition::Down });
            on_event(LinkEvent { port_index, link_up });

            ringbuf_entry!(Trace::FlushStarted(port_index));
            self.ctrl.set_bit(port_base + PORT_CONTROL_6, PORT_CONTROL_6_DISABLE_LEARNING)?;
            self.ctrl.flush_dynamic_mac_table()?;
            self.ctrl.clear_bit(port_base + PORT_CONTROL_6, PORT_CONTROL_6_DISABLE_LEARNING)?;
            ringbuf_entry!(Trace::FlushDone(port_index));
        }
        Ok(())
    }

    /// Call once per loop iteration from the task's run function; yields at
    /// the long-task cadence between scans.
    pub fn run_iteration(&self, on_event: &mut dyn FnMut(LinkEvent)) -> Result<(), Error<B::Error>> {
        self.scan_once(on_event)?;
        cooperative_delay(Delay::Long);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchctrl_hal::{GLOBAL_CONTROL_3, GLOBAL_CONTROL_3_FLUSH_DYNAMIC_MAC};

    struct FakeBus {
        regs: [u8; 256],
    }

    impl SpiBus for FakeBus {
        type Error = ();
        fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), ()> {
            match tx[0] {
                0x03 => {
                    let reg = tx[1] as usize;
                    if tx.len() == 3 {
                        // The flush bit is self-clearing on real hardware;
                        // the fake reflects that as clearing on readback.
                        if reg == GLOBAL_CONTROL_3 as usize {
                            self.regs[reg] &= !GLOBAL_CONTROL_3_FLUSH_DYNAMIC_MAC;
                        }
                        rx[0] = self.regs[reg];
                    } else {
                        for (i, slot) in rx.iter_mut().enumerate() {
                            *slot = self.regs[reg + i];
                        }
                    }
                }
                0x02 => {
                    let reg = tx[1] as usize;
                    if reg == INTERRUPT_STATUS as usize {
                        // Real hardware: write-one-to-clear status bits.
                        self.regs[reg] &= !tx[2];
                    } else {
                        self.regs[reg] = tx[2];
                    }
                }
                _ => unreachable!(),
            }
            Ok(())
        }
    }

    struct NoopDelay;
    impl kernel::CooperativeDelay for NoopDelay {
        fn delay(&self, _which: Delay) {}
    }
    static NOOP: NoopDelay = NoopDelay;
    fn init_delay() {
        kernel::delay::set_delay_impl(&NOOP);
    }

    #[test]
    fn idle_while_unauthenticated() {
        init_delay();
        let ctrl = SwitchCtrlHal::new(FakeBus { regs: [0; 256] });
        let authed = AtomicBool::new(false);
        let monitor = PortMonitor::new(&ctrl, &authed);
        let mut events = 0;
        monitor.scan_once(&mut |_| events += 1).unwrap();
        assert_eq!(events, 0);
    }

    #[test]
    fn expansion_port_scanned_before_user_ports() {
        init_delay();
        let mut regs = [0u8; 256];
        regs[INTERRUPT_STATUS as usize] = (1 << 4) | (1 << 0);
        // Expansion port's status-1 register reports link up.
        regs[(PORT_OFFSETS[4] + PORT_STATUS_1) as usize] = PORT_STATUS_1_LINK_UP;
        let ctrl = SwitchCtrlHal::new(FakeBus { regs });
        let authed = AtomicBool::new(true);
        let monitor = PortMonitor::new(&ctrl, &authed);

        let mut order = heapless::Vec::<usize, 4>::new();
        monitor
            .scan_once(&mut |ev| {
                let _ = order.push(ev.port_index);
            })
            .unwrap();
        assert_eq!(order.as_slice(), &[4, 0]);
    }

    #[test]
    fn link_change_clears_interrupt_bit_and_flushes() {
        init_delay();
        let mut regs = [0u8; 256];
        regs[INTERRUPT_STATUS as usize] = 1 << 0;
        let ctrl = SwitchCtrlHal::new(FakeBus { regs });
        let authed = AtomicBool::new(true);
        let monitor = PortMonitor::new(&ctrl, &authed);

        monitor.scan_once(&mut |_| {}).unwrap();
        assert_eq!(ctrl.ctrl_read(INTERRUPT_STATUS).unwrap(), 0);
    }
}
