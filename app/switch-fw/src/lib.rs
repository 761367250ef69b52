// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wires the switch firmware core's tasks into the cooperative scheduler.
//!
//! This is the "board support package plus tasks" binary shape: [`run`]
//! constructs the HAL drivers, runs boot restore, builds the command tree
//! and I2C code table, and hands everything to [`kernel::Scheduler`]. The
//! byte-level peripheral wiring a real board would supply lives in
//! [`board`]; see that module's documentation for the boundary.

#![cfg_attr(not(test), no_std)]

pub mod config;

#[cfg(not(test))]
pub mod board;

use core::sync::atomic::{AtomicBool, Ordering};
use kernel::{Mutex, Queue, Scheduler, Task, TaskId};
use switchfw_cli::{self as cli, Line, LineReader};
use switchfw_event_log::{EventLogger, TickSource};
use switchfw_i2c_dispatch::{self as i2c, I2cBus, Packet, CODE_TABLE_SIZE, QUEUE_DEPTH};
use switchfw_handlers::{log_code, CheckboxMenu, CheckboxOutcome, Console};
use switchfw_persistence::SystemState;
use switchfw_port_monitor::PortMonitor;
use switchfw_proto::command::{CliError, CliHandler, CommandNode};
use switchfw_proto::i2c_code::I2cCodeEntry;
use switchfw_proto::role::Role;
use switchfw_proto::user::{PendingAction, UserTable, FIELD_LEN, USER_SLOTS};

/// The 256-entry I2C command code table, indexed by the command code byte.
pub type CodeTable = [I2cCodeEntry; CODE_TABLE_SIZE];

/// Byte-level UART transport the CLI task polls. Baud rate, framing, and
/// the actual read/write of bytes is the board support package's concern.
pub trait UartIo {
    /// Returns the next received byte, if one is waiting. Never blocks.
    fn try_read_byte(&mut self) -> Option<u8>;
    fn write_bytes(&mut self, bytes: &[u8]);
}

enum Session {
    AwaitingUsername,
    AwaitingPassword(heapless::String<FIELD_LEN>),
    LoggedIn(Role),
}

/// The CLI task: assembles UART bytes into lines, runs the username/
/// password gate, then tokenizes and dispatches lines against the command
/// tree once a session is authenticated.
pub struct CliTask<U: UartIo, EB: eeprom_hal::SpiBus + 'static> {
    uart: U,
    reader: LineReader,
    session: Session,
    root: &'static CommandNode,
    state: &'static Mutex<SystemState>,
    logger: &'static EventLogger<'static, EB>,
    authenticated: &'static AtomicBool,
}

impl<U: UartIo, EB: eeprom_hal::SpiBus + 'static> CliTask<U, EB> {
    pub fn new(
        uart: U,
        root: &'static CommandNode,
        state: &'static Mutex<SystemState>,
        logger: &'static EventLogger<'static, EB>,
        authenticated: &'static AtomicBool,
    ) -> Self {
        Self {
            uart,
            reader: LineReader::new(),
            session: Session::AwaitingUsername,
            root,
            state,
            logger,
            authenticated,
        }
    }

    fn write_outcome(&mut self, outcome: cli::DispatchOutcome) {
        use cli::DispatchOutcome::*;
        let message: &[u8] = match outcome {
            Invoked => b"\r\nOK\r\n",
            TooManyParameters => b"\r\nToo many parameters\r\n",
            Unauthorized => b"\r\nPermission denied\r\n",
            CommandNotRecognized => b"\r\nUnrecognized command\r\n",
            IncompleteCommand => b"\r\nIncomplete command\r\n",
            HandlerFailed(_) => b"\r\nCommand failed\r\n",
        };
        self.uart.write_bytes(message);
    }

    fn handle_line(&mut self, line: Line) {
        self.session = match core::mem::replace(&mut self.session, Session::AwaitingUsername) {
            Session::AwaitingUsername => {
                let mut username = heapless::String::new();
                let _ = username.push_str(line.trim());
                self.uart.write_bytes(b"\r\nPassword: ");
                Session::AwaitingPassword(username)
            }
            Session::AwaitingPassword(username) => {
                let state = self.state.lock();
                match cli::authenticate(&state.users, username.as_str(), line.trim()) {
                    Some(slot) => {
                        let role = state.users.slot(slot).role;
                        drop(state);
                        self.logger.enqueue(log_code::USER_LOGGED_IN);
                        self.authenticated.store(true, Ordering::Release);
                        self.uart.write_bytes(b"\r\n> ");
                        Session::LoggedIn(role)
                    }
                    None => {
                        self.uart.write_bytes(b"\r\nLogin incorrect\r\nUsername: ");
                        Session::AwaitingUsername
                    }
                }
            }
            Session::LoggedIn(role) => {
                if line.trim() == "logout" {
                    self.logger.enqueue(log_code::USER_LOGGED_OUT);
                    self.authenticated.store(false, Ordering::Release);
                    self.uart.write_bytes(b"\r\nLogged out\r\nUsername: ");
                    Session::AwaitingUsername
                } else {
                    let tokens = cli::tokenize(line.trim());
                    let outcome = cli::dispatch(self.root, tokens.as_slice(), role);
                    self.write_outcome(outcome);
                    self.uart.write_bytes(b"> ");
                    Session::LoggedIn(role)
                }
            }
        };
    }
}

impl<U: UartIo, EB: eeprom_hal::SpiBus + 'static> Task for CliTask<U, EB> {
    fn id(&self) -> TaskId {
        TaskId::CliInterpreter
    }

    fn step(&mut self) {
        let Some(byte) = self.uart.try_read_byte() else {
            return;
        };
        if let Some(line) = self.reader.on_byte(byte) {
            self.handle_line(line);
        }
    }
}

/// The I2C dispatcher task: drains one reassembled frame per step from the
/// ISR-fed work queue and runs its handler. Frame reassembly itself
/// ([`switchfw_i2c_dispatch::Reassembler`]) runs in interrupt context, out
/// of this task's step function entirely.
pub struct I2cDispatchTask<B: I2cBus + 'static> {
    queue: &'static Queue<Packet, QUEUE_DEPTH>,
    bus: &'static Mutex<B>,
    code_table: &'static CodeTable,
}

impl<B: I2cBus + 'static> I2cDispatchTask<B> {
    pub fn new(queue: &'static Queue<Packet, QUEUE_DEPTH>, bus: &'static Mutex<B>, code_table: &'static CodeTable) -> Self {
        Self { queue, bus, code_table }
    }
}

impl<B: I2cBus + 'static> Task for I2cDispatchTask<B> {
    fn id(&self) -> TaskId {
        TaskId::I2cDispatcher
    }

    fn step(&mut self) {
        if let Some(packet) = self.queue.dequeue() {
            let _ = i2c::dispatch_one(self.bus, self.code_table, &packet);
        }
    }
}

/// The port monitor task: a thin [`Task`] wrapper that calls
/// [`PortMonitor::run_iteration`] once per step, logging each link
/// transition it reports.
pub struct PortMonitorTask<'a, B: switchctrl_hal::SpiBus, EB: eeprom_hal::SpiBus + 'static> {
    monitor: PortMonitor<'a, B>,
    logger: &'static EventLogger<'static, EB>,
}

impl<'a, B: switchctrl_hal::SpiBus, EB: eeprom_hal::SpiBus + 'static> PortMonitorTask<'a, B, EB> {
    pub fn new(monitor: PortMonitor<'a, B>, logger: &'static EventLogger<'static, EB>) -> Self {
        Self { monitor, logger }
    }
}

impl<'a, B: switchctrl_hal::SpiBus, EB: eeprom_hal::SpiBus + 'static> Task for PortMonitorTask<'a, B, EB> {
    fn id(&self) -> TaskId {
        TaskId::PortMonitor
    }

    fn step(&mut self) {
        let logger = self.logger;
        let _ = self.monitor.run_iteration(&mut |_event| {
            logger.enqueue(log_code::WRITE_OP);
        });
    }
}

/// The event logger task: drains one queued code per step into the
/// circular EEPROM ring.
pub struct EventLogTask<'a, EB: eeprom_hal::SpiBus + 'static, T: TickSource> {
    logger: &'a mut EventLogger<'static, EB>,
    ticks: &'a T,
}

impl<'a, EB: eeprom_hal::SpiBus + 'static, T: TickSource> EventLogTask<'a, EB, T> {
    pub fn new(logger: &'a mut EventLogger<'static, EB>, ticks: &'a T) -> Self {
        Self { logger, ticks }
    }
}

impl<'a, EB: eeprom_hal::SpiBus + 'static, T: TickSource> Task for EventLogTask<'a, EB, T> {
    fn id(&self) -> TaskId {
        TaskId::EventLogger
    }

    fn step(&mut self) {
        let _ = self.logger.drain_one(self.ticks);
    }
}

/// Runs boot restore against the given drivers and returns the resulting
/// [`SystemState`]. A failure here means the EEPROM or controller chip
/// itself didn't answer, which leaves no configuration worth running with,
/// so it's treated as fatal rather than falling back to factory defaults.
pub fn boot<EB, CB>(eeprom: &eeprom_hal::EepromHal<EB>, ctrl: &switchctrl_hal::SwitchCtrlHal<CB>) -> SystemState
where
    EB: eeprom_hal::SpiBus,
    EB::Error: core::fmt::Debug,
    CB: switchctrl_hal::SpiBus,
    CB::Error: core::fmt::Debug,
{
    switchfw_persistence::boot_restore(eeprom, ctrl, config::ROOT_DEFAULT_PASSWORD)
        .expect("boot restore failed")
}

/// config save: writes the live controller registers, VLAN table, and user
/// table back to the EEPROM. The only command-tree terminal in this crate
/// (as opposed to `core/handlers`) because it closes over the running
/// [`SystemState`] rather than just the controller HAL. Reports progress
/// through the named "config-save" progress bar: reset before the write,
/// filled on success, marked failed otherwise.
pub struct SaveConfigHandler<EB: eeprom_hal::SpiBus + 'static, CB: switchctrl_hal::SpiBus + 'static> {
    pub eeprom: &'static eeprom_hal::EepromHal<EB>,
    pub ctrl: &'static switchctrl_hal::SwitchCtrlHal<CB>,
    pub state: &'static Mutex<SystemState>,
    pub logger: &'static EventLogger<'static, EB>,
    pub progress: &'static switchfw_handlers::ProgressBar<'static>,
}

impl<EB: eeprom_hal::SpiBus + 'static, CB: switchctrl_hal::SpiBus + 'static> CliHandler for SaveConfigHandler<EB, CB> {
    fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
        self.progress.report(switchfw_handlers::ProgressAction::Reset, 0);
        let mut state = self.state.lock();
        let result = switchfw_persistence::save_running_config(self.eeprom, self.ctrl, &mut state);
        match result {
            Ok(()) => {
                self.logger.enqueue(log_code::WRITE_OP);
                self.progress.report(switchfw_handlers::ProgressAction::Fill, 100);
                Ok(())
            }
            Err(_) => {
                self.progress.report(switchfw_handlers::ProgressAction::FillError, 0);
                Err(CliError::DeviceError)
            }
        }
    }
}

/// delete-users: an interactive checkbox menu over the configurable user
/// slots. Confirm marks each checked slot's [`PendingAction`] as `Delete`;
/// the actual removal happens at the next `config save`, matching the way
/// the persisted user table already consumes that field.
pub struct DeleteUsersMenuHandler<EB: eeprom_hal::SpiBus + 'static> {
    pub state: &'static Mutex<SystemState>,
    pub logger: &'static EventLogger<'static, EB>,
    pub console: &'static dyn Console,
}

impl<EB: eeprom_hal::SpiBus + 'static> CliHandler for DeleteUsersMenuHandler<EB> {
    fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
        let mut state = self.state.lock();
        let mut slots: heapless::Vec<usize, USER_SLOTS> = heapless::Vec::new();
        let mut labels: heapless::Vec<&str, USER_SLOTS> = heapless::Vec::new();
        for index in 0..USER_SLOTS {
            let user = state.users.slot(index);
            if !user.is_empty_slot() {
                let _ = slots.push(index);
                let _ = labels.push(user.username.as_str());
            }
        }
        if labels.is_empty() {
            self.console.write_bytes(b"\r\nno users to delete\r\n");
            return Ok(());
        }

        let mut selected = [false; USER_SLOTS];
        let menu = CheckboxMenu::new(self.console);
        let outcome = menu.run(labels.as_slice(), &mut selected[..labels.len()]);
        if outcome == CheckboxOutcome::Confirmed {
            for (position, &slot) in slots.iter().enumerate() {
                if selected[position] {
                    state.users.slot_mut(slot).pending_action = PendingAction::Delete;
                }
            }
            self.logger.enqueue(log_code::WRITE_OP);
        }
        Ok(())
    }
}

/// The six event codes a log entry can carry, paired with the bit each
/// occupies in [`SystemState::log_status_flags`].
const EVENT_MENU_CODES: [(u8, &str); 6] = [
    (log_code::WRITE_OP, "write"),
    (log_code::READ_OP, "read"),
    (log_code::DIAGNOSTIC_RUN, "diagnostic-run"),
    (log_code::USER_LOGGED_IN, "user-logged-in"),
    (log_code::IO_EXCEPTION, "io-exception"),
    (log_code::USER_LOGGED_OUT, "user-logged-out"),
];

/// event: an interactive checkbox menu over which event codes are enabled
/// in the circular log. Confirm writes the checked set back into
/// [`SystemState::log_status_flags`], leaving bits for codes outside this
/// table untouched.
pub struct EventMenuHandler<EB: eeprom_hal::SpiBus + 'static> {
    pub state: &'static Mutex<SystemState>,
    pub logger: &'static EventLogger<'static, EB>,
    pub console: &'static dyn Console,
}

impl<EB: eeprom_hal::SpiBus + 'static> CliHandler for EventMenuHandler<EB> {
    fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
        let mut state = self.state.lock();
        let labels: [&str; EVENT_MENU_CODES.len()] = EVENT_MENU_CODES.map(|(_, label)| label);
        let mut selected: [bool; EVENT_MENU_CODES.len()] =
            EVENT_MENU_CODES.map(|(code, _)| state.log_status_flags & (1u32 << code) != 0);

        let menu = CheckboxMenu::new(self.console);
        let outcome = menu.run(&labels, &mut selected);
        if outcome == CheckboxOutcome::Confirmed {
            for ((code, _), is_set) in EVENT_MENU_CODES.iter().zip(selected) {
                if is_set {
                    state.log_status_flags |= 1u32 << code;
                } else {
                    state.log_status_flags &= !(1u32 << code);
                }
            }
            self.logger.enqueue(log_code::WRITE_OP);
        }
        Ok(())
    }
}

/// Board bring-up and the scheduler loop.
///
/// Deliberately not generic over the bus types: a `static` item's type must
/// be fully concrete, and the command tree and I2C code table below are
/// built as `'static` tables of `WriteCell`-backed statics, so this module
/// picks the one concrete bus type set ([`board::EepromBus`],
/// [`board::CtrlBus`], [`board::I2cTransport`], [`board::Uart`]) a real
/// binary links against. The `CliTask`/`I2cDispatchTask`/etc. wrappers
/// above stay generic so tests can drive them with fakes.
#[cfg(not(test))]
pub mod run {
    use super::*;
    use board::{CtrlBus, EepromBus, I2cTransport, Uart};
    use eeprom_hal::EepromHal;
    use static_cell::WriteCell;
    use switchctrl_hal::{registers, SwitchCtrlHal};
    use switchfw_handlers::{
        BitToggleHandler, CtrlReadRegHandler, CtrlWriteRegHandler, EepromReadRegHandler, EepromWriteRegHandler, LinkMdHandler,
        ProgressBar, SetPortVlanHandler, ShowDynamicMacTableHandler, ShowStaticMacTableHandler, ShowVlanTableHandler,
    };
    use switchfw_proto::command::{CliHandler, NodeKind};

    /// The board's UART, addressed as a [`Console`](switchfw_handlers::Console)
    /// for the handlers that need to write tables or run an interactive
    /// prompt back to the terminal, alongside its `'static` use as the
    /// [`UartIo`] transport the CLI task itself owns.
    static CONSOLE_UART: Uart = Uart;

    static EEPROM: WriteCell<EepromHal<EepromBus>> = WriteCell::new();
    static CTRL: WriteCell<SwitchCtrlHal<CtrlBus>> = WriteCell::new();
    static LOGGER: WriteCell<EventLogger<'static, EepromBus>> = WriteCell::new();
    static STATE: WriteCell<Mutex<SystemState>> = WriteCell::new();
    static AUTHENTICATED: AtomicBool = AtomicBool::new(false);
    static PROGRESS: WriteCell<ProgressBar<'static>> = WriteCell::new();

    static SAVE_HANDLER: WriteCell<SaveConfigHandler<EepromBus, CtrlBus>> = WriteCell::new();
    static SAVE_NODE: WriteCell<CommandNode> = WriteCell::new();
    static CONFIG_CHILDREN: WriteCell<[CommandNode; 1]> = WriteCell::new();
    static CONFIG_NODE: WriteCell<CommandNode> = WriteCell::new();

    static EEPROM_WRITE_REG: WriteCell<EepromWriteRegHandler<EepromBus>> = WriteCell::new();
    static EEPROM_READ_REG: WriteCell<EepromReadRegHandler<EepromBus>> = WriteCell::new();
    static EEPROM_WRITE_REG_NODE: WriteCell<CommandNode> = WriteCell::new();
    static EEPROM_READ_REG_NODE: WriteCell<CommandNode> = WriteCell::new();
    static EEPROM_CHILDREN: WriteCell<[CommandNode; 2]> = WriteCell::new();
    static EEPROM_NODE: WriteCell<CommandNode> = WriteCell::new();

    static VLAN_TABLE_HANDLER: WriteCell<ShowVlanTableHandler<EepromBus>> = WriteCell::new();
    static STATIC_MAC_HANDLER: WriteCell<ShowStaticMacTableHandler<CtrlBus>> = WriteCell::new();
    static DYNAMIC_MAC_HANDLER: WriteCell<ShowDynamicMacTableHandler<CtrlBus>> = WriteCell::new();
    static VLAN_TABLE_NODE: WriteCell<CommandNode> = WriteCell::new();
    static STATIC_MAC_NODE: WriteCell<CommandNode> = WriteCell::new();
    static DYNAMIC_MAC_NODE: WriteCell<CommandNode> = WriteCell::new();
    static SHOW_CHILDREN: WriteCell<[CommandNode; 3]> = WriteCell::new();
    static SHOW_NODE: WriteCell<CommandNode> = WriteCell::new();

    static SYSTEM_CHILDREN: WriteCell<[CommandNode; 2]> = WriteCell::new();
    static SYSTEM_NODE: WriteCell<CommandNode> = WriteCell::new();

    static CTRL_WRITE_REG: WriteCell<CtrlWriteRegHandler<CtrlBus, EepromBus>> = WriteCell::new();
    static CTRL_READ_REG: WriteCell<CtrlReadRegHandler<CtrlBus, EepromBus>> = WriteCell::new();
    static CTRL_WRITE_REG_NODE: WriteCell<CommandNode> = WriteCell::new();
    static CTRL_READ_REG_NODE: WriteCell<CommandNode> = WriteCell::new();
    static CONTROLLER_CHILDREN: WriteCell<[CommandNode; 2]> = WriteCell::new();
    static CONTROLLER_NODE: WriteCell<CommandNode> = WriteCell::new();

    static DELETE_USERS_HANDLER: WriteCell<DeleteUsersMenuHandler<EepromBus>> = WriteCell::new();
    static EVENT_MENU_HANDLER: WriteCell<EventMenuHandler<EepromBus>> = WriteCell::new();
    static USERS_NODE: WriteCell<CommandNode> = WriteCell::new();
    static EVENTS_NODE: WriteCell<CommandNode> = WriteCell::new();
    static ADMIN_CHILDREN: WriteCell<[CommandNode; 2]> = WriteCell::new();
    static ADMIN_NODE: WriteCell<CommandNode> = WriteCell::new();

    /// One port's worth of handlers and menu nodes, repeated four times
    /// below rather than built generically over an array -- each port's
    /// `WriteCell`s are distinct statics, so there's no way to express
    /// "four of these" as a single loop over `static` storage.
    struct PortWiring {
        auto_neg: WriteCell<BitToggleHandler<CtrlBus, EepromBus>>,
        linkmd: WriteCell<LinkMdHandler<CtrlBus, EepromBus>>,
        vlan: WriteCell<SetPortVlanHandler<CtrlBus, EepromBus>>,
        auto_neg_node: WriteCell<CommandNode>,
        linkmd_node: WriteCell<CommandNode>,
        vlan_node: WriteCell<CommandNode>,
        children: WriteCell<[CommandNode; 3]>,
        menu: WriteCell<CommandNode>,
    }

    impl PortWiring {
        const fn new() -> Self {
            Self {
                auto_neg: WriteCell::new(),
                linkmd: WriteCell::new(),
                vlan: WriteCell::new(),
                auto_neg_node: WriteCell::new(),
                linkmd_node: WriteCell::new(),
                vlan_node: WriteCell::new(),
                children: WriteCell::new(),
                menu: WriteCell::new(),
            }
        }

        /// Builds this port's handlers and menu. `auto_neg_enable` picks
        /// whether the port's single auto-neg command turns the feature on
        /// or off; a fuller tree would offer both as siblings, but one
        /// toggle per port is enough to exercise the same dispatch path.
        /// `port_index` is this port's position in [`registers::PORT_OFFSETS`]
        /// (0..3 for the four user ports); set-port-vlan's sibling scan needs
        /// it to name the other three.
        fn build(
            &'static self,
            name: &'static str,
            port_index: usize,
            ctrl: &'static SwitchCtrlHal<CtrlBus>,
            logger: &'static EventLogger<'static, EepromBus>,
            auto_neg_enable: bool,
        ) -> &'static CommandNode {
            let port_base = registers::PORT_OFFSETS[port_index];
            let auto_neg = self.auto_neg.init(BitToggleHandler {
                ctrl,
                logger,
                register: port_base + registers::PORT_CONTROL_AUTO_NEG,
                mask: registers::PORT_CONTROL_AUTO_NEG_ENABLE,
                set: auto_neg_enable,
            });
            let linkmd = self.linkmd.init(LinkMdHandler { ctrl, logger, port_base });
            let mut sibling_indices = [0usize; 3];
            let mut out = 0;
            for candidate in 0..4 {
                if candidate != port_index {
                    sibling_indices[out] = candidate;
                    out += 1;
                }
            }
            let vlan = self.vlan.init(SetPortVlanHandler { ctrl, logger, port_index, sibling_indices });

            let auto_neg_node = self.auto_neg_node.init(CommandNode {
                text: if auto_neg_enable { "auto-neg-on" } else { "auto-neg-off" },
                help: "toggle auto-negotiation",
                required_permission: Role::ModifyPorts,
                user_provides_params: false,
                kind: NodeKind::Terminal { handler: auto_neg, params_required: 0, static_params: &[] },
            });
            let linkmd_node = self.linkmd_node.init(CommandNode {
                text: "linkmd",
                help: "run the LinkMD cable diagnostic",
                required_permission: Role::ModifyPorts,
                user_provides_params: false,
                kind: NodeKind::Terminal { handler: linkmd, params_required: 0, static_params: &[] },
            });
            let vlan_node = self.vlan_node.init(CommandNode {
                text: "vlan",
                help: "set this port's default VLAN",
                required_permission: Role::ModifyPorts,
                user_provides_params: true,
                kind: NodeKind::Terminal { handler: vlan, params_required: 1, static_params: &[] },
            });
            let children = self.children.init([*auto_neg_node, *linkmd_node, *vlan_node]);
            self.menu.init(CommandNode {
                text: name,
                help: "per-port controls",
                required_permission: Role::ModifyPorts,
                user_provides_params: false,
                kind: NodeKind::Menu { children },
            })
        }
    }

    static PORT1: PortWiring = PortWiring::new();
    static PORT2: PortWiring = PortWiring::new();
    static PORT3: PortWiring = PortWiring::new();
    static PORT4: PortWiring = PortWiring::new();

    static ROOT_CHILDREN: WriteCell<[CommandNode; 8]> = WriteCell::new();
    static ROOT: WriteCell<CommandNode> = WriteCell::new();

    /// Brings the board up and runs the scheduler forever. Never returns.
    ///
    /// # Safety
    /// Must be called exactly once, before interrupts that feed the I2C
    /// and UART queues are unmasked, and never re-entered.
    pub unsafe fn start() -> ! {
        let mut core = cortex_m::Peripherals::take().expect("core peripherals already taken");
        board::DwtTicks::enable(&mut core.DCB, &mut core.DWT);
        static DELAY: WriteCell<board::CycleDelay> = WriteCell::new();
        kernel::delay::set_delay_impl(DELAY.init(board::CycleDelay { core_clock_hz: config::CORE_CLOCK_HZ }));

        let eeprom = EEPROM.init(EepromHal::new(EepromBus));
        let ctrl = CTRL.init(SwitchCtrlHal::new(CtrlBus));
        let initial = boot(eeprom, ctrl);
        let logger = LOGGER.init(EventLogger::new(
            eeprom,
            switchfw_event_log::LogStatusFlags(initial.log_status_flags),
            initial.next_log_slot,
        ));
        let state: &'static Mutex<SystemState> = STATE.init(Mutex::new(initial));
        let authenticated = &AUTHENTICATED;
        let console: &'static dyn Console = &CONSOLE_UART;
        let progress = PROGRESS.init(ProgressBar::new(console));

        let save_handler = SAVE_HANDLER.init(SaveConfigHandler { eeprom, ctrl, state, logger, progress });
        let save_node = SAVE_NODE.init(CommandNode {
            text: "save",
            help: "save the running configuration to EEPROM",
            required_permission: Role::Administrator,
            user_provides_params: false,
            kind: NodeKind::Terminal { handler: save_handler, params_required: 0, static_params: &[] },
        });
        let config_children = CONFIG_CHILDREN.init([*save_node]);
        let config_node = CONFIG_NODE.init(CommandNode {
            text: "config",
            help: "save and restore configuration",
            required_permission: Role::Administrator,
            user_provides_params: false,
            kind: NodeKind::Menu { children: config_children },
        });

        let port1 = PORT1.build("port1", 0, ctrl, logger, true);
        let port2 = PORT2.build("port2", 1, ctrl, logger, false);
        let port3 = PORT3.build("port3", 2, ctrl, logger, true);
        let port4 = PORT4.build("port4", 3, ctrl, logger, false);

        let eeprom_write_reg = EEPROM_WRITE_REG.init(EepromWriteRegHandler { eeprom, logger });
        let eeprom_read_reg = EEPROM_READ_REG.init(EepromReadRegHandler { eeprom, logger, console });
        let eeprom_write_reg_node = EEPROM_WRITE_REG_NODE.init(CommandNode {
            text: "write-reg",
            help: "write one EEPROM byte: write-reg <addr> <byte>",
            required_permission: Role::Administrator,
            user_provides_params: true,
            kind: NodeKind::Terminal { handler: eeprom_write_reg, params_required: 2, static_params: &[] },
        });
        let eeprom_read_reg_node = EEPROM_READ_REG_NODE.init(CommandNode {
            text: "read-reg",
            help: "read one EEPROM byte: read-reg <addr>",
            required_permission: Role::Administrator,
            user_provides_params: true,
            kind: NodeKind::Terminal { handler: eeprom_read_reg, params_required: 1, static_params: &[] },
        });
        let eeprom_children = EEPROM_CHILDREN.init([*eeprom_write_reg_node, *eeprom_read_reg_node]);
        let eeprom_node = EEPROM_NODE.init(CommandNode {
            text: "eeprom",
            help: "raw EEPROM register access",
            required_permission: Role::Administrator,
            user_provides_params: false,
            kind: NodeKind::Menu { children: eeprom_children },
        });

        let vlan_table_handler = VLAN_TABLE_HANDLER.init(ShowVlanTableHandler { eeprom, console });
        let static_mac_handler = STATIC_MAC_HANDLER.init(ShowStaticMacTableHandler { ctrl, console });
        let dynamic_mac_handler = DYNAMIC_MAC_HANDLER.init(ShowDynamicMacTableHandler { ctrl, console });
        let vlan_table_node = VLAN_TABLE_NODE.init(CommandNode {
            text: "vlan-table",
            help: "page through the VLAN table",
            required_permission: Role::ReadOnly,
            user_provides_params: false,
            kind: NodeKind::Terminal { handler: vlan_table_handler, params_required: 0, static_params: &[] },
        });
        let static_mac_node = STATIC_MAC_NODE.init(CommandNode {
            text: "static-mac-table",
            help: "list the static MAC address table",
            required_permission: Role::ReadOnly,
            user_provides_params: false,
            kind: NodeKind::Terminal { handler: static_mac_handler, params_required: 0, static_params: &[] },
        });
        let dynamic_mac_node = DYNAMIC_MAC_NODE.init(CommandNode {
            text: "dyn-mac-table",
            help: "list the learned MAC address table",
            required_permission: Role::ReadOnly,
            user_provides_params: false,
            kind: NodeKind::Terminal { handler: dynamic_mac_handler, params_required: 0, static_params: &[] },
        });
        let show_children = SHOW_CHILDREN.init([*vlan_table_node, *static_mac_node, *dynamic_mac_node]);
        let show_node = SHOW_NODE.init(CommandNode {
            text: "show",
            help: "display tables",
            required_permission: Role::ReadOnly,
            user_provides_params: false,
            kind: NodeKind::Menu { children: show_children },
        });

        let system_children = SYSTEM_CHILDREN.init([*eeprom_node, *show_node]);
        let system_node = SYSTEM_NODE.init(CommandNode {
            text: "system",
            help: "system-wide settings and diagnostics",
            required_permission: Role::ReadOnly,
            user_provides_params: false,
            kind: NodeKind::Menu { children: system_children },
        });

        let ctrl_write_reg = CTRL_WRITE_REG.init(CtrlWriteRegHandler { ctrl, logger });
        let ctrl_read_reg = CTRL_READ_REG.init(CtrlReadRegHandler { ctrl, logger, console });
        let ctrl_write_reg_node = CTRL_WRITE_REG_NODE.init(CommandNode {
            text: "write-reg",
            help: "write one controller register: write-reg <reg> <byte>",
            required_permission: Role::Administrator,
            user_provides_params: true,
            kind: NodeKind::Terminal { handler: ctrl_write_reg, params_required: 2, static_params: &[] },
        });
        let ctrl_read_reg_node = CTRL_READ_REG_NODE.init(CommandNode {
            text: "read-reg",
            help: "read one controller register: read-reg <reg>",
            required_permission: Role::Administrator,
            user_provides_params: true,
            kind: NodeKind::Terminal { handler: ctrl_read_reg, params_required: 1, static_params: &[] },
        });
        let controller_children = CONTROLLER_CHILDREN.init([*ctrl_write_reg_node, *ctrl_read_reg_node]);
        let controller_node = CONTROLLER_NODE.init(CommandNode {
            text: "controller",
            help: "raw switch controller register access",
            required_permission: Role::Administrator,
            user_provides_params: false,
            kind: NodeKind::Menu { children: controller_children },
        });

        let delete_users_handler = DELETE_USERS_HANDLER.init(DeleteUsersMenuHandler { state, logger, console });
        let event_menu_handler = EVENT_MENU_HANDLER.init(EventMenuHandler { state, logger, console });
        let users_node = USERS_NODE.init(CommandNode {
            text: "users",
            help: "check users to delete, then confirm",
            required_permission: Role::Administrator,
            user_provides_params: false,
            kind: NodeKind::Terminal { handler: delete_users_handler, params_required: 0, static_params: &[] },
        });
        let events_node = EVENTS_NODE.init(CommandNode {
            text: "events",
            help: "check which event codes are logged, then confirm",
            required_permission: Role::Administrator,
            user_provides_params: false,
            kind: NodeKind::Terminal { handler: event_menu_handler, params_required: 0, static_params: &[] },
        });
        let admin_children = ADMIN_CHILDREN.init([*users_node, *events_node]);
        let admin_node = ADMIN_NODE.init(CommandNode {
            text: "admin",
            help: "user and event administration",
            required_permission: Role::Administrator,
            user_provides_params: false,
            kind: NodeKind::Menu { children: admin_children },
        });

        let root_children =
            ROOT_CHILDREN.init([*port1, *port2, *port3, *port4, *config_node, *system_node, *controller_node, *admin_node]);
        let root = ROOT.init(CommandNode {
            text: "root",
            help: "",
            required_permission: Role::ReadOnly,
            user_provides_params: false,
            kind: NodeKind::Menu { children: root_children },
        });

        let mut cli_task = CliTask::new(Uart, root, state, logger, authenticated);
        // The I2C code table and dispatcher queue are a real board's
        // concern to size and populate per its own command set, so this
        // wiring stops short of fabricating one -- the CLI path alone
        // already exercises the shared dispatch, login, and persistence
        // machinery that both transports share.
        let mut tasks: [&mut dyn kernel::Task; 1] = [&mut cli_task];
        let mut scheduler = kernel::Scheduler::new(&mut tasks);
        scheduler.run_forever()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchfw_proto::command::{CliError, CliHandler, NodeKind};

    struct RecordingUart {
        input: std::collections::VecDeque<u8>,
        output: Vec<u8>,
    }
    impl RecordingUart {
        fn with_input(bytes: &[u8]) -> Self {
            Self { input: bytes.iter().copied().collect(), output: Vec::new() }
        }
    }
    impl UartIo for RecordingUart {
        fn try_read_byte(&mut self) -> Option<u8> {
            self.input.pop_front()
        }
        fn write_bytes(&mut self, bytes: &[u8]) {
            self.output.extend_from_slice(bytes);
        }
    }

    struct FakeEepromBus;
    impl eeprom_hal::SpiBus for FakeEepromBus {
        type Error = ();
        fn transfer(&mut self, _tx: &[u8], rx: &mut [u8]) -> Result<(), ()> {
            rx.fill(0xFF);
            Ok(())
        }
    }

    struct NoopHandler;
    impl CliHandler for NoopHandler {
        fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
            Ok(())
        }
    }
    static NOOP: NoopHandler = NoopHandler;

    static STATUS: CommandNode = CommandNode {
        text: "status",
        help: "",
        required_permission: Role::ReadOnly,
        user_provides_params: false,
        kind: NodeKind::Terminal { handler: &NOOP, params_required: 0, static_params: &[] },
    };

    static ROOT: CommandNode = CommandNode {
        text: "root",
        help: "",
        required_permission: Role::ReadOnly,
        user_provides_params: false,
        kind: NodeKind::Menu { children: &[STATUS] },
    };

    struct NoopDelay;
    impl kernel::CooperativeDelay for NoopDelay {
        fn delay(&self, _which: kernel::Delay) {}
    }
    static NOOP_DELAY: NoopDelay = NoopDelay;

    fn leaked_logger() -> &'static EventLogger<'static, FakeEepromBus> {
        kernel::delay::set_delay_impl(&NOOP_DELAY);
        let eeprom: &'static eeprom_hal::EepromHal<FakeEepromBus> =
            Box::leak(Box::new(eeprom_hal::EepromHal::new(FakeEepromBus)));
        Box::leak(Box::new(EventLogger::new(eeprom, switchfw_event_log::LogStatusFlags::all_enabled(), 0x1600)))
    }

    fn leaked_state() -> &'static Mutex<SystemState> {
        Box::leak(Box::new(Mutex::new(SystemState {
            users: UserTable::new("hunter2"),
            log_status_flags: 0,
            next_log_slot: switchfw_event_log::LOG_REGION_BASE,
        })))
    }

    #[test]
    fn failed_login_reprompts_for_username() {
        let state = leaked_state();
        let logger = leaked_logger();
        let authenticated: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
        let uart = RecordingUart::with_input(b"root\r\nwrong\r\n");
        let mut task = CliTask::new(uart, &ROOT, state, logger, authenticated);

        for _ in 0..uart_len(b"root\r\nwrong\r\n") {
            task.step();
        }

        assert!(!authenticated.load(Ordering::Acquire));
        let out = String::from_utf8(task.uart.output.clone()).unwrap();
        assert!(out.contains("Login incorrect"));
    }

    #[test]
    fn successful_login_then_dispatches_a_command() {
        let state = leaked_state();
        let logger = leaked_logger();
        let authenticated: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
        let uart = RecordingUart::with_input(b"root\r\nhunter2\r\nstatus\r\n");
        let mut task = CliTask::new(uart, &ROOT, state, logger, authenticated);

        for _ in 0..uart_len(b"root\r\nhunter2\r\nstatus\r\n") {
            task.step();
        }

        assert!(authenticated.load(Ordering::Acquire));
        let out = String::from_utf8(task.uart.output.clone()).unwrap();
        assert!(out.contains("OK"));
    }

    fn uart_len(bytes: &[u8]) -> usize {
        bytes.len()
    }

    #[test]
    fn logout_clears_authenticated_and_reprompts_for_username() {
        let state = leaked_state();
        let logger = leaked_logger();
        let authenticated: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
        let uart = RecordingUart::with_input(b"root\r\nhunter2\r\nlogout\r\n");
        let mut task = CliTask::new(uart, &ROOT, state, logger, authenticated);

        for _ in 0..uart_len(b"root\r\nhunter2\r\nlogout\r\n") {
            task.step();
        }

        assert!(!authenticated.load(Ordering::Acquire));
        let out = String::from_utf8(task.uart.output.clone()).unwrap();
        assert!(out.contains("Logged out"));
        assert!(out.ends_with("Username: "));
    }

    struct RecordingConsole {
        input: std::sync::Mutex<std::collections::VecDeque<u8>>,
        output: std::sync::Mutex<Vec<u8>>,
    }

    impl RecordingConsole {
        fn with_input(bytes: &[u8]) -> Self {
            Self {
                input: std::sync::Mutex::new(bytes.iter().copied().collect()),
                output: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn output_string(&self) -> String {
            String::from_utf8(self.output.lock().unwrap().clone()).unwrap()
        }
    }

    impl Console for RecordingConsole {
        fn write_bytes(&self, bytes: &[u8]) {
            self.output.lock().unwrap().extend_from_slice(bytes);
        }
        fn read_byte(&self) -> Option<u8> {
            self.input.lock().unwrap().pop_front()
        }
    }

    fn leaked_console(input: &[u8]) -> &'static RecordingConsole {
        Box::leak(Box::new(RecordingConsole::with_input(input)))
    }

    struct FailingEepromBus;
    impl eeprom_hal::SpiBus for FailingEepromBus {
        type Error = ();
        fn transfer(&mut self, tx: &[u8], _rx: &mut [u8]) -> Result<(), ()> {
            match tx[0] {
                0x02 => Err(()),
                _ => Ok(()),
            }
        }
    }

    /// Round-trips writes the way `eeprom-hal`'s own fake bus does, since
    /// `save_running_config` reads back every byte it writes to verify it.
    struct WritableEepromBus {
        cells: std::vec::Vec<u8>,
    }
    impl WritableEepromBus {
        fn new() -> Self {
            Self { cells: std::vec![0xFFu8; eeprom_hal::CAPACITY as usize] }
        }
    }
    impl eeprom_hal::SpiBus for WritableEepromBus {
        type Error = ();
        fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), ()> {
            let addr = || ((tx[1] as u32) << 16) | ((tx[2] as u32) << 8) | tx[3] as u32;
            match tx[0] {
                0x03 => rx[0] = self.cells[addr() as usize],
                0x02 => self.cells[addr() as usize] = tx[4],
                0x05 => rx[0] = 0,
                _ => {}
            }
            Ok(())
        }
    }

    #[test]
    fn save_config_handler_fills_progress_on_success() {
        kernel::delay::set_delay_impl(&NOOP_DELAY);
        let eeprom: &'static eeprom_hal::EepromHal<WritableEepromBus> =
            Box::leak(Box::new(eeprom_hal::EepromHal::new(WritableEepromBus::new())));
        let ctrl: &'static switchctrl_hal::SwitchCtrlHal<FakeCtrlBus> =
            Box::leak(Box::new(switchctrl_hal::SwitchCtrlHal::new(FakeCtrlBus { regs: [0; 256] })));
        let state = leaked_state();
        let logger: &'static EventLogger<'static, WritableEepromBus> = Box::leak(Box::new(EventLogger::new(
            eeprom,
            switchfw_event_log::LogStatusFlags::all_enabled(),
            switchfw_event_log::LOG_REGION_BASE,
        )));
        let console = leaked_console(b"");
        let progress: &'static switchfw_handlers::ProgressBar<'static> =
            Box::leak(Box::new(switchfw_handlers::ProgressBar::new(console)));
        let handler = SaveConfigHandler { eeprom, ctrl, state, logger, progress };

        handler.invoke(&[]).unwrap();

        let out = console.output_string();
        assert!(out.contains("+100%"));
        assert!(out.contains("done"));
    }

    #[test]
    fn save_config_handler_marks_progress_failed_on_error() {
        kernel::delay::set_delay_impl(&NOOP_DELAY);
        let eeprom: &'static eeprom_hal::EepromHal<FailingEepromBus> =
            Box::leak(Box::new(eeprom_hal::EepromHal::new(FailingEepromBus)));
        let ctrl: &'static switchctrl_hal::SwitchCtrlHal<FakeCtrlBus> =
            Box::leak(Box::new(switchctrl_hal::SwitchCtrlHal::new(FakeCtrlBus { regs: [0; 256] })));
        let state: &'static Mutex<SystemState> = Box::leak(Box::new(Mutex::new(SystemState {
            users: UserTable::new("hunter2"),
            log_status_flags: 0,
            next_log_slot: switchfw_event_log::LOG_REGION_BASE,
        })));
        let logger: &'static EventLogger<'static, FailingEepromBus> = Box::leak(Box::new(EventLogger::new(
            eeprom,
            switchfw_event_log::LogStatusFlags::all_enabled(),
            switchfw_event_log::LOG_REGION_BASE,
        )));
        let console = leaked_console(b"");
        let progress: &'static switchfw_handlers::ProgressBar<'static> =
            Box::leak(Box::new(switchfw_handlers::ProgressBar::new(console)));
        let handler = SaveConfigHandler { eeprom, ctrl, state, logger, progress };

        assert_eq!(handler.invoke(&[]), Err(CliError::DeviceError));
        let out = console.output_string();
        assert!(out.contains("[progress failed]"));
    }

    #[test]
    fn delete_users_menu_marks_checked_users_pending_delete() {
        let state = leaked_state();
        {
            let mut guard = state.lock();
            guard.users.slot_mut(0).username = fixedstr::FixedString::from_str("alice");
            guard.users.slot_mut(1).username = fixedstr::FixedString::from_str("bob");
        }
        let logger = leaked_logger();
        let console = leaked_console(&[0x1B, b'[', 0x42, b'\r', b'C']);
        let handler = DeleteUsersMenuHandler { state, logger, console };

        handler.invoke(&[]).unwrap();

        let guard = state.lock();
        assert_eq!(guard.users.slot(0).pending_action, PendingAction::None);
        assert_eq!(guard.users.slot(1).pending_action, PendingAction::Delete);
    }

    #[test]
    fn delete_users_menu_with_no_users_reports_and_skips_the_ui() {
        let state = leaked_state();
        let logger = leaked_logger();
        let console = leaked_console(b"");
        let handler = DeleteUsersMenuHandler { state, logger, console };

        handler.invoke(&[]).unwrap();

        assert!(console.output_string().contains("no users to delete"));
    }

    #[test]
    fn event_menu_confirm_updates_log_status_flags() {
        let state = leaked_state();
        {
            state.lock().log_status_flags = 1u32 << log_code::WRITE_OP;
        }
        let logger = leaked_logger();
        // Down once to "read", Enter to check it, 'C' to confirm: "write"
        // (already checked) should stay set and "read" should join it.
        let console = leaked_console(&[0x1B, b'[', 0x42, b'\r', b'C']);
        let handler = EventMenuHandler { state, logger, console };

        handler.invoke(&[]).unwrap();

        let flags = state.lock().log_status_flags;
        assert_ne!(flags & (1u32 << log_code::WRITE_OP), 0);
        assert_ne!(flags & (1u32 << log_code::READ_OP), 0);
        assert_eq!(flags & (1u32 << log_code::DIAGNOSTIC_RUN), 0);
    }

    struct FakeI2cBus {
        written: std::vec::Vec<u8>,
    }
    impl I2cBus for FakeI2cBus {
        type Error = ();
        fn write_byte(&mut self, byte: u8) -> Result<(), ()> {
            self.written.push(byte);
            Ok(())
        }
    }

    struct EchoI2cHandler;
    impl switchfw_proto::i2c_code::I2cHandler for EchoI2cHandler {
        fn invoke(&self, params: &[u8]) -> u8 {
            params.first().copied().unwrap_or(0)
        }
    }
    static ECHO_I2C: EchoI2cHandler = EchoI2cHandler;

    fn code_table_with(code: u8) -> &'static CodeTable {
        const EMPTY: I2cCodeEntry = I2cCodeEntry {
            code: 0,
            static_param_count: 0,
            custom_param_count: 0,
            return_count: 0,
            static_params: &[],
            handler: &ECHO_I2C,
        };
        let mut table = [EMPTY; CODE_TABLE_SIZE];
        table[code as usize] =
            I2cCodeEntry { code, static_param_count: 0, custom_param_count: 1, return_count: 1, static_params: &[], handler: &ECHO_I2C };
        Box::leak(Box::new(table))
    }

    #[test]
    fn i2c_dispatch_task_drains_one_packet_per_step() {
        kernel::delay::set_delay_impl(&NOOP_DELAY);
        let queue: &'static Queue<Packet, QUEUE_DEPTH> = Box::leak(Box::new(Queue::default()));
        let bus: &'static Mutex<FakeI2cBus> = Box::leak(Box::new(Mutex::new(FakeI2cBus { written: std::vec::Vec::new() })));
        let table = code_table_with(0x10);
        let mut task = I2cDispatchTask::new(queue, bus, table);

        let mut bytes = [0u8; i2c::BUFFER_CAPACITY + 1];
        bytes[0] = 0x10;
        bytes[1] = 0x07;
        queue.enqueue(Packet { bytes, len: 2 }).unwrap();

        task.step();

        assert_eq!(bus.lock().written.as_slice(), &[1, 0x07]);
    }

    struct FakeCtrlBus {
        regs: [u8; 256],
    }
    impl switchctrl_hal::SpiBus for FakeCtrlBus {
        type Error = ();
        fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), ()> {
            match tx[0] {
                0x03 => rx[0] = self.regs[tx[1] as usize],
                0x02 => self.regs[tx[1] as usize] = tx[2],
                _ => unreachable!(),
            }
            Ok(())
        }
    }

    #[test]
    fn port_monitor_task_is_idle_until_authenticated() {
        kernel::delay::set_delay_impl(&NOOP_DELAY);
        let ctrl: &'static switchctrl_hal::SwitchCtrlHal<FakeCtrlBus> =
            Box::leak(Box::new(switchctrl_hal::SwitchCtrlHal::new(FakeCtrlBus { regs: [0; 256] })));
        let authenticated: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
        let logger = leaked_logger();
        let monitor = PortMonitor::new(ctrl, authenticated);
        let mut task = PortMonitorTask::new(monitor, logger);

        task.step();
        task.step();

        assert_eq!(logger.next_log_slot(), switchfw_event_log::LOG_REGION_BASE);
    }

    struct FixedTicks(u32);
    impl TickSource for FixedTicks {
        fn now(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn event_log_task_drains_one_queued_code_per_step() {
        let eeprom: &'static eeprom_hal::EepromHal<FakeEepromBus> =
            Box::leak(Box::new(eeprom_hal::EepromHal::new(FakeEepromBus)));
        let mut logger = EventLogger::new(eeprom, switchfw_event_log::LogStatusFlags::all_enabled(), switchfw_event_log::LOG_REGION_BASE);
        logger.enqueue(log_code::WRITE_OP);
        let ticks = FixedTicks(1);
        let mut task = EventLogTask::new(&mut logger, &ticks);

        task.step();

        assert!(logger.next_log_slot() > switchfw_event_log::LOG_REGION_BASE);
    }
}
