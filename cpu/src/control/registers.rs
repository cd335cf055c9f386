//! The CPU context: every register of the shared datapath plus the
//! small amount of state each task keeps for itself.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use base::prelude::*;

/// Number of registers in the R file and in each S bank.
pub const REGISTER_COUNT: usize = 32;

/// What a task keeps while it is not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    /// The address of the task's next microinstruction, before
    /// branch bits are OR'ed in.
    pub next: MicroAddress,
    /// Branch bits accumulated for `next`.
    pub next2: u16,
    /// Which S register bank the task uses.
    pub s_bank: u8,
    /// Simulated time spent running this task.
    pub elapsed: Duration,
}

/// Emulator task state (the Nova instruction being emulated).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorState {
    pub ir: u16,
    pub skip: bool,
    pub carry: bool,
}

impl EmulatorState {
    /// IR[1-2] in Alto bit numbering (bit 0 is the MSB): the Nova
    /// source accumulator.
    #[must_use]
    pub fn source_ac(&self) -> u8 {
        ((self.ir >> 13) & 0o3) as u8
    }

    /// IR[3-4]: the Nova destination accumulator.
    #[must_use]
    pub fn dest_ac(&self) -> u8 {
        ((self.ir >> 11) & 0o3) as u8
    }

    /// IR[0] is set for the Nova arithmetic/logic instructions.
    #[must_use]
    pub fn is_arithmetic(&self) -> bool {
        self.ir & 0o100000 != 0
    }

    /// IR[8-9]: the shift field.
    #[must_use]
    pub fn shift_field(&self) -> u16 {
        (self.ir >> 6) & 0o3
    }

    /// IR[10-11]: the carry field.
    #[must_use]
    pub fn carry_field(&self) -> u16 {
        (self.ir >> 4) & 0o3
    }

    /// IR[12]: the no-load bit.
    #[must_use]
    pub fn no_load(&self) -> bool {
        self.ir & 0o10 != 0
    }

    /// IR[13-15]: the skip field.
    #[must_use]
    pub fn skip_field(&self) -> u16 {
        self.ir & 0o7
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    pub tasks: [TaskContext; TASK_COUNT],
    pub r: [u16; REGISTER_COUNT],
    pub s: Vec<[u16; REGISTER_COUNT]>,
    pub t: u16,
    pub l: u16,
    pub m: u16,
    pub alu: u16,
    pub aluc0: bool,
    /// The ALU carry, latched along with L.
    pub laluc0: bool,
    pub shifter: u16,
    pub bus: u16,
    pub rsel: RegisterSelect,
    pub mir: MicroInstruction,
    pub mpc: MicroAddress,
    pub next: MicroAddress,
    pub next2: u16,
    pub task: TaskNumber,
    pub next_task: TaskNumber,
    pub next2_task: TaskNumber,
    pub wakeups: u16,
    /// Control-RAM address latched by RDRAM or WRTRAM.
    pub cram_addr: u16,
    pub rdram: bool,
    pub wrtram: bool,
    pub reset_mode: u16,
    pub emulator: EmulatorState,
    pub cycles: u64,
}

/// Whether a task is running, asking to run, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Active,
    Requesting,
    Idle,
}

impl Cpu {
    /// The state after a hardware reset.  Each task starts at the
    /// ROM location equal to its task number, and only the emulator
    /// requests service.
    #[must_use]
    pub fn new(s_banks: usize) -> Cpu {
        let mut tasks = [TaskContext {
            next: MicroAddress::ZERO,
            next2: 0,
            s_bank: 0,
            elapsed: Duration::ZERO,
        }; TASK_COUNT];
        for task in TaskNumber::all() {
            tasks[task.index()].next = MicroAddress::new(0, u16::from(u8::from(task)));
        }
        Cpu {
            tasks,
            r: [0; REGISTER_COUNT],
            s: vec![[0; REGISTER_COUNT]; s_banks.max(1)],
            t: 0,
            l: 0,
            m: 0,
            alu: 0,
            aluc0: false,
            laluc0: false,
            shifter: 0,
            bus: 0,
            rsel: RegisterSelect::ZERO,
            mir: MicroInstruction::default(),
            mpc: MicroAddress::ZERO,
            next: tasks[TaskNumber::EMULATOR.index()].next,
            next2: 0,
            task: TaskNumber::EMULATOR,
            next_task: TaskNumber::EMULATOR,
            next2_task: TaskNumber::EMULATOR,
            wakeups: TaskNumber::EMULATOR.mask(),
            cram_addr: 0,
            rdram: false,
            wrtram: false,
            reset_mode: 0,
            emulator: EmulatorState::default(),
            cycles: 0,
        }
    }

    #[must_use]
    pub fn task_state(&self, task: TaskNumber) -> TaskState {
        if task == self.task {
            TaskState::Active
        } else if self.wakeups & task.mask() != 0 {
            TaskState::Requesting
        } else {
            TaskState::Idle
        }
    }

    pub fn wake(&mut self, task: TaskNumber) {
        self.wakeups |= task.mask();
    }

    pub fn block(&mut self, task: TaskNumber) {
        self.wakeups &= !task.mask();
    }

    /// The S bank used by the running task.
    #[must_use]
    pub fn s_bank(&self) -> usize {
        usize::from(self.tasks[self.task.index()].s_bank) % self.s.len()
    }

    pub(crate) fn set_s_bank(&mut self, task: TaskNumber, bank: u16) {
        let banks = self.s.len();
        self.tasks[task.index()].s_bank = (usize::from(bank) % banks) as u8;
    }
}

#[test]
fn test_reset_state() {
    let cpu = Cpu::new(8);
    assert_eq!(cpu.s.len(), 8);
    assert_eq!(cpu.tasks[7].next, MicroAddress::new(0, 7));
    assert_eq!(cpu.task_state(TaskNumber::EMULATOR), TaskState::Active);
    assert_eq!(cpu.task_state(TaskNumber::CURSOR), TaskState::Idle);
}

#[test]
fn test_task_state_follows_wakeups() {
    let mut cpu = Cpu::new(1);
    cpu.wake(TaskNumber::DISK_SECTOR);
    assert_eq!(cpu.task_state(TaskNumber::DISK_SECTOR), TaskState::Requesting);
    cpu.block(TaskNumber::DISK_SECTOR);
    assert_eq!(cpu.task_state(TaskNumber::DISK_SECTOR), TaskState::Idle);
    cpu.set_s_bank(TaskNumber::EMULATOR, 9);
    assert_eq!(cpu.s_bank(), 0);
}
