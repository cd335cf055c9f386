//! Functions shared by every task.
//!
//! | code | BS      | F1        | F2        |
//! |------|---------|-----------|-----------|
//! | 0    | ←R      |           |           |
//! | 1    | R←      | MAR←      | BUS=0     |
//! | 2    | (none)  | TASK      | SH<0      |
//! | 3    | task    | BLOCK     | SH=0      |
//! | 4    | task    | L LSH 1   | BUS       |
//! | 5    | ←MD     | L RSH 1   | ALUCY     |
//! | 6    | task    | L LCY 8   | MD←       |
//! | 7    | task    | constant  | constant  |
//!
//! Codes marked "task" (and F1/F2 codes 010 to 017) are
//! task-specific.  The emulator does not have BLOCK.
use tracing::{event, Level};

use base::prelude::*;

use super::dispatch::{CoreFunction, DispatchTables};
use super::emulator;
use crate::device::Datapath;
use crate::fault::{fatal, Fault};

pub(crate) const F1_MAR: u8 = 0o1;
pub(crate) const F1_TASK: u8 = 0o2;
pub(crate) const F1_LSH: u8 = 0o4;
pub(crate) const F1_RSH: u8 = 0o5;
pub(crate) const F1_LCY8: u8 = 0o6;
pub(crate) const BS_READ_MD: u8 = 0o5;
pub(crate) const F2_STORE_MD: u8 = 0o6;

fn read_r(dp: &mut Datapath<'_>) {
    let value = dp.cpu.r[dp.cpu.rsel.index()];
    dp.drive_bus(value);
}

fn load_r_early(dp: &mut Datapath<'_>) {
    dp.drive_bus(0);
}

fn load_r_late(dp: &mut Datapath<'_>) {
    if emulator::dns_suppresses_load(dp.cpu) {
        return;
    }
    let rsel = dp.cpu.rsel.index();
    dp.cpu.r[rsel] = dp.cpu.shifter;
}

fn read_md(dp: &mut Datapath<'_>) {
    let value = dp.memory.read();
    dp.drive_bus(value);
}

fn load_mar(dp: &mut Datapath<'_>) {
    let (alu, cycle) = (dp.cpu.alu, dp.cpu.cycles);
    dp.memory.start(alu, cycle);
}

fn task(dp: &mut Datapath<'_>) {
    let requesting = dp.cpu.wakeups;
    match highest_priority(requesting) {
        Some(winner) => {
            if winner != dp.cpu.task {
                event!(
                    Level::TRACE,
                    "TASK: {} -> {} (wakeups {:06o})",
                    dp.cpu.task,
                    winner,
                    requesting
                );
            }
            dp.cpu.next2_task = winner;
        }
        None => fatal(Fault::NoTaskRequesting {
            task: dp.cpu.task,
            mpc: dp.cpu.mpc,
        }),
    }
}

/// The priority encoder.  The highest-numbered requesting task
/// wins, so the emulator (task 0) runs only when nothing else wants
/// the processor.
pub(crate) fn highest_priority(wakeups: u16) -> Option<TaskNumber> {
    if wakeups == 0 {
        None
    } else {
        TaskNumber::try_from(15 - wakeups.leading_zeros()).ok()
    }
}

fn block(dp: &mut Datapath<'_>) {
    let me = dp.cpu.task;
    dp.cpu.block(me);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shift {
    Left,
    Right,
    Cycle8,
}

fn shift(dp: &mut Datapath<'_>, how: Shift) {
    let l = dp.cpu.l;
    let shifted = match how {
        Shift::Left => l << 1,
        Shift::Right => l >> 1,
        Shift::Cycle8 => l.rotate_left(8),
    };
    dp.cpu.shifter = shifted | emulator::shifted_in_bits(dp.cpu, how);
}

fn lsh(dp: &mut Datapath<'_>) {
    shift(dp, Shift::Left);
}

fn rsh(dp: &mut Datapath<'_>) {
    shift(dp, Shift::Right);
}

fn lcy8(dp: &mut Datapath<'_>) {
    shift(dp, Shift::Cycle8);
}

fn bus_zero(dp: &mut Datapath<'_>) {
    let bit = u16::from(dp.cpu.bus == 0);
    dp.branch(bit);
}

fn shifter_negative(dp: &mut Datapath<'_>) {
    let bit = u16::from(dp.cpu.shifter & 0o100000 != 0);
    dp.branch(bit);
}

fn shifter_zero(dp: &mut Datapath<'_>) {
    let bit = u16::from(dp.cpu.shifter == 0);
    dp.branch(bit);
}

fn bus_branch(dp: &mut Datapath<'_>) {
    let bits = dp.cpu.bus;
    dp.branch(bits);
}

fn alu_carry(dp: &mut Datapath<'_>) {
    let bit = u16::from(dp.cpu.laluc0);
    dp.branch(bit);
}

fn store_md(dp: &mut Datapath<'_>) {
    let value = dp.cpu.bus;
    dp.memory.write(value);
}

const BS_FUNCTIONS: [(u8, CoreFunction); 4] = [
    (
        0o0,
        CoreFunction {
            name: "←R",
            early: Some(read_r),
            late: None,
        },
    ),
    (
        0o1,
        CoreFunction {
            name: "R←",
            early: Some(load_r_early),
            late: Some(load_r_late),
        },
    ),
    (0o2, CoreFunction::inert("BS none")),
    (
        BS_READ_MD,
        CoreFunction {
            name: "←MD",
            early: Some(read_md),
            late: None,
        },
    ),
];

const F1_FUNCTIONS: [(u8, CoreFunction); 7] = [
    (0o0, CoreFunction::inert("F1 none")),
    (
        F1_MAR,
        CoreFunction {
            name: "MAR←",
            early: None,
            late: Some(load_mar),
        },
    ),
    (
        F1_TASK,
        CoreFunction {
            name: "TASK",
            early: Some(task),
            late: None,
        },
    ),
    (
        F1_LSH,
        CoreFunction {
            name: "L LSH 1",
            early: Some(lsh),
            late: None,
        },
    ),
    (
        F1_RSH,
        CoreFunction {
            name: "L RSH 1",
            early: Some(rsh),
            late: None,
        },
    ),
    (
        F1_LCY8,
        CoreFunction {
            name: "L LCY 8",
            early: Some(lcy8),
            late: None,
        },
    ),
    (0o7, CoreFunction::inert("F1 constant")),
];

const BLOCK: CoreFunction = CoreFunction {
    name: "BLOCK",
    early: Some(block),
    late: None,
};

const F2_FUNCTIONS: [(u8, CoreFunction); 8] = [
    (0o0, CoreFunction::inert("F2 none")),
    (
        0o1,
        CoreFunction {
            name: "BUS=0",
            early: None,
            late: Some(bus_zero),
        },
    ),
    (
        0o2,
        CoreFunction {
            name: "SH<0",
            early: None,
            late: Some(shifter_negative),
        },
    ),
    (
        0o3,
        CoreFunction {
            name: "SH=0",
            early: None,
            late: Some(shifter_zero),
        },
    ),
    (
        0o4,
        CoreFunction {
            name: "BUS",
            early: None,
            late: Some(bus_branch),
        },
    ),
    (
        0o5,
        CoreFunction {
            name: "ALUCY",
            early: None,
            late: Some(alu_carry),
        },
    ),
    (
        F2_STORE_MD,
        CoreFunction {
            name: "MD←",
            early: None,
            late: Some(store_md),
        },
    ),
    (0o7, CoreFunction::inert("F2 constant")),
];

pub(crate) fn install(tables: &mut DispatchTables, task: TaskNumber) {
    for (code, f) in &BS_FUNCTIONS {
        tables.install(task, Field::Bs, *code, f);
    }
    for (code, f) in &F1_FUNCTIONS {
        tables.install(task, Field::F1, *code, f);
    }
    if task != TaskNumber::EMULATOR {
        tables.install(task, Field::F1, 0o3, &BLOCK);
    }
    for (code, f) in &F2_FUNCTIONS {
        tables.install(task, Field::F2, *code, f);
    }
}

#[test]
fn test_priority_encoder() {
    assert_eq!(highest_priority(0), None);
    assert_eq!(highest_priority(1), Some(TaskNumber::EMULATOR));
    assert_eq!(highest_priority(0o201), Some(TaskNumber::DISPLAY_VERTICAL));
    assert_eq!(highest_priority(0o177777), Some(TaskNumber::MAX));
}
