//! Emulates the Alto's microprogrammed processor.
//!
//! One datapath (R and S registers, T, L, M, the ALU and the bus) is
//! time-shared by sixteen tasks.  Each microcycle the processor
//! fetches one microinstruction for the running task and executes it
//! in two phases:
//!
//! - early: the bus is driven (it starts as all ones and every
//!   source AND's onto it), F2, BS and F1 functions perform their
//!   combinational parts, then the ALU computes its result;
//! - late: BS, F1 and F2 functions latch their results (branch
//!   conditions, register loads, memory operations), then L, M and T
//!   are loaded.
//!
//! At the end of the cycle the processor may switch task.  A
//! switch requested by `TASK` takes effect after one further
//! microinstruction of the old task.
//!
//! The next-address logic keeps two values: `next`, the address from
//! the NEXT field (confined to the page of the executing
//! instruction), and `next2`, the branch bits OR'ed in by functions
//! during the late phase.  Both are saved and restored on a task
//! switch.
use std::time::Duration;

use tracing::{event, Level};

use base::prelude::*;

mod common;
mod dispatch;
mod emulator;
mod ram;
mod registers;
pub mod timing;

#[cfg(test)]
mod tests;

pub use registers::{Cpu, EmulatorState, TaskContext, TaskState, REGISTER_COUNT};
pub use timing::CYCLE;

use crate::alu::alu;
use crate::config::Configuration;
use crate::device::{Datapath, DeviceId, DeviceManager, FunctionSlot, Phase};
use crate::fault::{fatal, Fault};
use crate::memory::MainMemory;
use crate::microcode::ControlStore;
use crate::timer::Timer;

use common::{BS_READ_MD, F1_MAR, F2_STORE_MD};
use dispatch::{DispatchTables, Handler};

#[derive(Debug)]
pub struct ControlUnit {
    cpu: Cpu,
    store: ControlStore,
    dispatch: DispatchTables,
    config: Configuration,
    ram_task_mask: u16,
}

impl ControlUnit {
    #[must_use]
    pub fn new(config: Configuration, store: ControlStore) -> ControlUnit {
        let mut dispatch = DispatchTables::empty();
        let mut ram_task_mask = 0;
        for task in TaskNumber::all() {
            common::install(&mut dispatch, task);
            if config.is_ram_task(task) {
                ram::install(&mut dispatch, task);
                ram_task_mask |= task.mask();
            }
        }
        emulator::install(&mut dispatch);
        event!(Level::DEBUG, "dispatch tables: {:?}", &dispatch);
        ControlUnit {
            cpu: Cpu::new(config.s_banks),
            store,
            dispatch,
            config,
            ram_task_mask,
        }
    }

    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    #[must_use]
    pub fn store(&self) -> &ControlStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut ControlStore {
        &mut self.store
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub(crate) fn replace_cpu(&mut self, cpu: Cpu) {
        self.cpu = cpu;
    }

    /// Route a function slot to a device.
    pub(crate) fn claim(&mut self, slot: FunctionSlot, device: DeviceId, name: String) {
        self.dispatch.claim(slot, device, name);
    }

    pub(crate) fn datapath<'a>(
        &'a mut self,
        memory: &'a mut MainMemory,
        timer: &'a mut Timer,
        owner: Option<DeviceId>,
    ) -> Datapath<'a> {
        Datapath {
            cpu: &mut self.cpu,
            memory,
            timer,
            store: &self.store,
            config: &self.config,
            owner,
        }
    }

    /// Run microcycles until less than one cycle of `budget` is left
    /// or the timer asks us to stop.  Returns the simulated time
    /// consumed.
    pub(crate) fn execute(
        &mut self,
        budget: Duration,
        memory: &mut MainMemory,
        timer: &mut Timer,
        devices: &mut DeviceManager,
    ) -> Duration {
        timer.begin_slice(budget);
        let mut remaining = budget;
        while remaining >= CYCLE && !timer.leave_requested() {
            remaining -= CYCLE;
            self.cycle(memory, timer, devices);
        }
        budget - remaining
    }

    fn memory_stall(&self, mir: MicroInstruction, memory: &MainMemory) -> bool {
        let cycle = self.cpu.cycles;
        (mir.f1() == F1_MAR && memory.address_stall(cycle))
            || (mir.bs() == BS_READ_MD && !mir.constant_only() && memory.data_stall(cycle))
            || (mir.f2() == F2_STORE_MD && memory.data_stall(cycle))
    }

    fn cycle(&mut self, memory: &mut MainMemory, timer: &mut Timer, devices: &mut DeviceManager) {
        timer.advance(CYCLE);
        self.cpu.cycles += 1;
        let task = self.cpu.task;
        self.cpu.tasks[task.index()].elapsed += CYCLE;

        devices.for_each_cycling(|id, device| {
            device.cycle(&mut self.datapath(memory, timer, Some(id)));
        });

        let mpc = self.cpu.next.or_offset(self.cpu.next2);
        self.cpu.next2 = 0;
        let mir = self.store.fetch(mpc);
        self.cpu.mpc = mpc;
        self.cpu.mir = mir;
        self.cpu.rsel = mir.rsel();
        self.cpu.next = mpc.in_same_page(mir.next());
        event!(Level::TRACE, task=%task, mpc=%mpc, "{mir}");

        if self.memory_stall(mir, memory) {
            event!(Level::TRACE, "memory stall at {mpc}");
            self.cpu.next = mpc;
            return;
        }

        // Early phase.
        self.cpu.bus = 0o177777;
        self.cpu.shifter = self.cpu.l;
        self.run(Phase::Early, Field::F2, memory, timer, devices);
        if mir.uses_constant() {
            self.cpu.bus &= self.store.constant(mir.constant_address());
        }
        if self.cpu.rdram {
            self.cpu.bus &= self.store.read_for_rdram(self.cpu.cram_addr);
            self.cpu.rdram = false;
        }
        let constant_only = mir.constant_only();
        if !constant_only {
            self.run(Phase::Early, Field::Bs, memory, timer, devices);
        }
        self.run(Phase::Early, Field::F1, memory, timer, devices);

        let out = alu(self.cpu.bus, self.cpu.t, mir.aluf(), self.cpu.emulator.skip);
        self.cpu.alu = out.result;
        self.cpu.aluc0 = out.carry;
        if self.cpu.wrtram {
            // M has not yet been loaded this cycle.
            self.store
                .write_for_wrtram(self.cpu.cram_addr, self.cpu.m, self.cpu.alu);
            self.cpu.wrtram = false;
        }

        // Late phase.
        if !constant_only {
            self.run(Phase::Late, Field::Bs, memory, timer, devices);
        }
        self.run(Phase::Late, Field::F1, memory, timer, devices);
        self.run(Phase::Late, Field::F2, memory, timer, devices);

        if mir.load_l() {
            self.cpu.l = self.cpu.alu;
            self.cpu.laluc0 = self.cpu.aluc0;
            if self.ram_task_mask & task.mask() != 0 {
                self.cpu.m = self.cpu.alu;
            }
        }
        if mir.load_t() {
            self.cpu.t = if out.t_from_alu {
                self.cpu.alu
            } else {
                self.cpu.bus
            };
        }

        self.switch_task(memory, timer, devices);
    }

    fn run(
        &mut self,
        phase: Phase,
        field: Field,
        memory: &mut MainMemory,
        timer: &mut Timer,
        devices: &mut DeviceManager,
    ) {
        let slot = FunctionSlot::new(self.cpu.task, field, self.cpu.mir.code(field));
        match self.dispatch.lookup(phase, slot) {
            Handler::Idle => (),
            Handler::Core(_, run) => run(&mut self.datapath(memory, timer, None)),
            Handler::Device(id) => {
                if let Some(device) = devices.get_mut(id) {
                    let mut dp = self.datapath(memory, timer, Some(id));
                    match phase {
                        Phase::Early => device.early(slot, &mut dp),
                        Phase::Late => device.late(slot, &mut dp),
                    }
                }
            }
            Handler::Undefined => fatal(Fault::UndefinedFunction {
                task: slot.task,
                mpc: self.cpu.mpc,
                field,
                code: slot.code,
                phase,
            }),
        }
    }

    fn switch_task(
        &mut self,
        memory: &mut MainMemory,
        timer: &mut Timer,
        devices: &mut DeviceManager,
    ) {
        let current = self.cpu.task;
        let incoming = self.cpu.next_task;
        if incoming != current {
            let (next, next2) = (self.cpu.next, self.cpu.next2);
            let saved = &mut self.cpu.tasks[current.index()];
            saved.next = next;
            saved.next2 = next2;
            let restored = self.cpu.tasks[incoming.index()];
            self.cpu.task = incoming;
            self.cpu.next = restored.next;
            self.cpu.next2 = restored.next2;
            event!(
                Level::TRACE,
                "task switch {} -> {} at {}",
                current,
                incoming,
                restored.next.or_offset(restored.next2)
            );
            if let Some(owner) = devices.owner_of(incoming) {
                if let Some(device) = devices.get_mut(owner) {
                    device.activate(incoming, &mut self.datapath(memory, timer, Some(owner)));
                }
            }
        }
        self.cpu.next_task = self.cpu.next2_task;
    }
}
