//! Functions of the RAM-related tasks: the S registers and access
//! to the control RAM.  The emulator is always RAM-related; other
//! tasks are if the configuration says so.
//!
//! RDRAM and WRTRAM only latch a request here.  The transfer
//! happens in the following microinstruction.
use tracing::{event, Level};

use base::prelude::*;

use super::dispatch::{CoreFunction, DispatchTables};
use crate::device::Datapath;

fn read_s(dp: &mut Datapath<'_>) {
    let rsel = dp.cpu.rsel.index();
    // S register 0 of every bank is M.
    let value = if rsel == 0 {
        dp.cpu.m
    } else {
        dp.cpu.s[dp.cpu.s_bank()][rsel]
    };
    dp.drive_bus(value);
}

fn load_s_early(dp: &mut Datapath<'_>) {
    dp.drive_bus(0);
}

fn load_s_late(dp: &mut Datapath<'_>) {
    let (bank, rsel) = (dp.cpu.s_bank(), dp.cpu.rsel.index());
    dp.cpu.s[bank][rsel] = dp.cpu.m;
}

fn wrtram(dp: &mut Datapath<'_>) {
    dp.cpu.wrtram = true;
    dp.cpu.cram_addr = dp.cpu.alu;
    event!(Level::TRACE, "WRTRAM requested for {:06o}", dp.cpu.alu);
}

fn rdram(dp: &mut Datapath<'_>) {
    dp.cpu.rdram = true;
    dp.cpu.cram_addr = dp.cpu.alu;
    event!(Level::TRACE, "RDRAM requested for {:06o}", dp.cpu.alu);
}

fn loadsrb(dp: &mut Datapath<'_>) {
    let bank = (dp.cpu.bus >> 1) & 0o7;
    let me = dp.cpu.task;
    dp.cpu.set_s_bank(me, bank);
}

const BS_FUNCTIONS: [(u8, CoreFunction); 2] = [
    (
        0o3,
        CoreFunction {
            name: "←S",
            early: Some(read_s),
            late: None,
        },
    ),
    (
        0o4,
        CoreFunction {
            name: "S←",
            early: Some(load_s_early),
            late: Some(load_s_late),
        },
    ),
];

const F1_FUNCTIONS: [(u8, CoreFunction); 2] = [
    (
        0o11,
        CoreFunction {
            name: "WRTRAM",
            early: None,
            late: Some(wrtram),
        },
    ),
    (
        0o12,
        CoreFunction {
            name: "RDRAM",
            early: None,
            late: Some(rdram),
        },
    ),
];

const LOADSRB: CoreFunction = CoreFunction {
    name: "LOADSRB",
    early: None,
    late: Some(loadsrb),
};

pub(crate) fn install(tables: &mut DispatchTables, task: TaskNumber) {
    for (code, f) in &BS_FUNCTIONS {
        tables.install(task, Field::Bs, *code, f);
    }
    for (code, f) in &F1_FUNCTIONS {
        tables.install(task, Field::F1, *code, f);
    }
    if task != TaskNumber::EMULATOR {
        tables.install(task, Field::F1, 0o13, &LOADSRB);
    }
}
