// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The cooperative task runtime underneath the switch firmware core.
//!
//! This crate stands in for the RTOS kernel the firmware runs above: task
//! priorities, a mutual-exclusion primitive for shared SPI/UART/I2C
//! resources, and bounded queues used for ISR-to-task handoff. The actual
//! preemptive scheduler (timer tick, context switch, stack allocation) is a
//! chip-specific concern and lives outside this crate; what's modeled here is
//! the contract every task in the core is written against: priorities,
//! mutexes held for the duration of a device transaction, and queues that
//! never block a producer running in interrupt context.

#![cfg_attr(not(test), no_std)]

pub mod delay;
pub mod mutex;
pub mod queue;

pub use delay::{cooperative_delay, CooperativeDelay};
pub use mutex::Mutex;
pub use queue::{Queue, QueueFull};

/// The three cooperative delay durations tasks are expected to yield at.
///
/// Any operation that loops (polling a self-clearing bit, paginating a
/// table dump) must call [`cooperative_delay`] with one of these at least
/// once per iteration so that lower-priority tasks are not starved.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Delay {
    /// ~5ms: EEPROM post-write settle, short device polls.
    Short,
    /// ~10ms: bit-poll retries in command handlers.
    Medium,
    /// ~40ms: port monitor scan cadence, long-task yields.
    Long,
}

/// Priority class a task is scheduled at. Lower numeric value preempts
/// higher; tasks of equal priority are scheduled round-robin.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    Medium = 0,
    Low = 1,
    Lowest = 2,
}

/// Identifies one of the fixed set of tasks that make up the firmware core.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskId {
    CliInterpreter,
    I2cDispatcher,
    PortMonitor,
    EventLogger,
    LedBlinker,
}

impl TaskId {
    pub const fn priority(self) -> Priority {
        match self {
            TaskId::CliInterpreter | TaskId::I2cDispatcher => Priority::Medium,
            TaskId::PortMonitor | TaskId::EventLogger => Priority::Low,
            TaskId::LedBlinker => Priority::Lowest,
        }
    }
}

/// One step of cooperative work.
///
/// Every task in the core is expressed as a type implementing `Task`
/// instead of a bare `fn() -> !` loop, so that the scheduler (and unit
/// tests) can single-step it. A real task's `main` is just:
///
/// ```ignore
/// #[export_name = "main"]
/// fn main() -> ! {
///     let mut task = CliTask::new(..);
///     loop {
///         task.step();
///     }
/// }
/// ```
pub trait Task {
    /// Identifies this task for scheduling and tracing purposes.
    fn id(&self) -> TaskId;

    /// Perform one bounded unit of work. Implementations must not busy-loop
    /// without going through [`cooperative_delay`] or a queue receive.
    fn step(&mut self);
}

/// Round-robins a fixed slice of tasks, running lower-priority tasks less
/// often than higher-priority ones.
///
/// This is a cooperative approximation of the priority scheduler described
/// in the concurrency model: within a priority class, tasks get one `step`
/// each pass; a task is skipped some passes if a higher-priority task wants
/// more of the CPU. `weight` controls how many steps a task gets per full
/// scheduling pass, which is how priority is expressed here.
pub struct Scheduler<'a> {
    tasks: &'a mut [&'a mut dyn Task],
}

impl<'a> Scheduler<'a> {
    pub fn new(tasks: &'a mut [&'a mut dyn Task]) -> Self {
        Self { tasks }
    }

    fn weight(task: &dyn Task) -> u32 {
        match task.id().priority() {
            Priority::Medium => 4,
            Priority::Low => 2,
            Priority::Lowest => 1,
        }
    }

    /// Runs one scheduling pass: every task is stepped a number of times
    /// proportional to its priority weight.
    pub fn run_pass(&mut self) {
        let max_weight = self.tasks.iter().map(|t| Self::weight(*t)).max().unwrap_or(1);
        for tick in 0..max_weight {
            for task in self.tasks.iter_mut() {
                if tick < Self::weight(*task) {
                    task.step();
                }
            }
        }
    }

    /// Runs scheduling passes forever. Never returns; matches the shape of
    /// a real firmware `main`.
    pub fn run_forever(&mut self) -> ! {
        loop {
            self.run_pass();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingTask {
        id: TaskId,
        count: u32,
    }

    impl Task for CountingTask {
        fn id(&self) -> TaskId {
            self.id
        }
        fn step(&mut self) {
            self.count += 1;
        }
    }

    #[test]
    fn higher_priority_gets_more_steps_per_pass() {
        let mut medium = CountingTask { id: TaskId::CliInterpreter, count: 0 };
        let mut lowest = CountingTask { id: TaskId::LedBlinker, count: 0 };
        {
            let mut tasks: [&mut dyn Task; 2] = [&mut medium, &mut lowest];
            let mut sched = Scheduler::new(&mut tasks);
            sched.run_pass();
        }
        assert!(medium.count > lowest.count);
        assert_eq!(medium.count, 4);
        assert_eq!(lowest.count, 1);
    }

    #[test]
    fn priority_ordering_is_total() {
        assert!(Priority::Medium < Priority::Low);
        assert!(Priority::Low < Priority::Lowest);
    }
}
