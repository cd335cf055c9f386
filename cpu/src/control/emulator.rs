//! Functions specific to the emulator task.
//!
//! The emulator task interprets the Nova-like instruction set of
//! the Alto.  Its hardware support is the instruction register IR,
//! the skip flip-flop, the Nova carry bit, and the dispatch logic
//! which turns the fields of IR into microcode branches.
//!
//! IR bits are numbered as in the Alto Hardware Manual: bit 0 is
//! the most significant.
use tracing::{event, Level};

use base::prelude::*;

use super::common::{Shift, F1_LSH, F1_RSH};
use super::dispatch::{CoreFunction, DispatchTables};
use super::registers::Cpu;
use crate::device::Datapath;

pub(crate) const F2_BUSODD: u8 = 0o10;
pub(crate) const F2_MAGIC: u8 = 0o11;
pub(crate) const F2_LOADDNS: u8 = 0o12;
pub(crate) const F2_ACDEST: u8 = 0o13;
pub(crate) const F2_LOADIR: u8 = 0o14;
pub(crate) const F2_IDISP: u8 = 0o15;
pub(crate) const F2_ACSOURCE: u8 = 0o16;

/// Dispatch PROM base addresses for IDISP and ACSOURCE.
const IDISP_BASE: usize = 0o200;
const ACSOURCE_BASE: usize = 0;

fn is_emulator_function(cpu: &Cpu, f2: u8) -> bool {
    cpu.task == TaskNumber::EMULATOR && cpu.mir.f2() == f2
}

/// The bits MAGIC and DNS← shift into the shifter output in place
/// of zeroes.
pub(crate) fn shifted_in_bits(cpu: &Cpu, how: Shift) -> u16 {
    if cpu.task != TaskNumber::EMULATOR {
        return 0;
    }
    let bit = match cpu.mir.f2() {
        F2_MAGIC => match how {
            Shift::Left => cpu.t >> 15,
            Shift::Right => cpu.t & 1,
            Shift::Cycle8 => return 0,
        },
        F2_LOADDNS => u16::from(dns_base_carry(cpu)),
        _ => return 0,
    };
    match how {
        Shift::Left => bit,
        Shift::Right => bit << 15,
        Shift::Cycle8 => 0,
    }
}

/// True when DNS← is executing with the Nova no-load bit set, in
/// which case `R←` is suppressed.
pub(crate) fn dns_suppresses_load(cpu: &Cpu) -> bool {
    is_emulator_function(cpu, F2_LOADDNS) && cpu.emulator.no_load()
}

/// The carry the Nova instruction starts from: the carry bit
/// modified by the instruction's carry field, then complemented if
/// the ALU operation carried.
fn dns_base_carry(cpu: &Cpu) -> bool {
    let c = cpu.emulator.carry;
    let base = match cpu.emulator.carry_field() {
        0 => c,
        1 => false,
        2 => true,
        _ => !c,
    };
    base ^ cpu.laluc0
}

fn select_ac(dp: &mut Datapath<'_>, ac: u8) {
    dp.cpu.rsel = dp.cpu.rsel.with_low_two_bits(!ac & 0o3);
}

fn busodd(dp: &mut Datapath<'_>) {
    let bit = dp.cpu.bus & 1;
    dp.branch(bit);
}

fn acdest(dp: &mut Datapath<'_>) {
    let ac = dp.cpu.emulator.dest_ac();
    select_ac(dp, ac);
}

fn acsource_early(dp: &mut Datapath<'_>) {
    let ac = dp.cpu.emulator.source_ac();
    select_ac(dp, ac);
}

fn dispatch(dp: &mut Datapath<'_>, base: usize) {
    let emu = dp.cpu.emulator;
    let bits = if emu.is_arithmetic() {
        emu.shift_field() ^ 3
    } else {
        let address = base | usize::from((emu.ir >> 8) & 0o177);
        u16::from(dp.store.dispatch(address))
    };
    dp.branch(bits);
}

fn acsource_late(dp: &mut Datapath<'_>) {
    dispatch(dp, ACSOURCE_BASE);
}

fn idisp(dp: &mut Datapath<'_>) {
    dispatch(dp, IDISP_BASE);
}

fn loadir(dp: &mut Datapath<'_>) {
    let ir = dp.cpu.bus;
    dp.cpu.emulator.ir = ir;
    dp.cpu.emulator.skip = false;
    dp.branch(((ir >> 15) << 3) | ((ir >> 8) & 0o7));
}

fn loaddns(dp: &mut Datapath<'_>) {
    let cpu = &mut *dp.cpu;
    let base = dns_base_carry(cpu);
    let carry = match cpu.mir.f1() {
        F1_LSH => cpu.l & 0o100000 != 0,
        F1_RSH => cpu.l & 1 != 0,
        _ => base,
    };
    let zero = cpu.shifter == 0;
    cpu.emulator.skip = match cpu.emulator.skip_field() {
        0 => false,
        1 => true,
        2 => !carry,
        3 => carry,
        4 => zero,
        5 => !zero,
        6 => !carry || zero,
        _ => carry && !zero,
    };
    if !cpu.emulator.no_load() {
        cpu.emulator.carry = carry;
    }
}

fn read_disp(dp: &mut Datapath<'_>) {
    let ir = dp.cpu.emulator.ir;
    let disp = ir & 0o377;
    let value = if (ir >> 8) & 0o3 != 0 && disp & 0o200 != 0 {
        0o177400 | disp
    } else {
        disp
    };
    dp.drive_bus(value);
}

fn swmode(dp: &mut Datapath<'_>) {
    let layout = dp.store.layout();
    let next = dp.cpu.next;
    let target = if layout.is_rom_page(next.page()) {
        let bank = usize::from((dp.cpu.mir.next() >> 7) & 0o3) % layout.ram_pages();
        layout.ram_page(bank)
    } else {
        0
    };
    event!(
        Level::DEBUG,
        "SWMODE at {}: next page {} -> {}",
        dp.cpu.mpc,
        next.page(),
        target
    );
    dp.cpu.next = next.in_page(target);
}

fn loadrmr(dp: &mut Datapath<'_>) {
    dp.cpu.reset_mode = dp.cpu.bus;
}

fn loadesrb(dp: &mut Datapath<'_>) {
    let bank = (dp.cpu.bus >> 1) & 0o7;
    dp.cpu.set_s_bank(TaskNumber::EMULATOR, bank);
}

fn rsnf(dp: &mut Datapath<'_>) {
    let serial = u16::from(dp.config.ethernet_serial);
    dp.drive_bus(0o177400 | serial);
}

const BS_READ_DISP: CoreFunction = CoreFunction {
    name: "←DISP",
    early: Some(read_disp),
    late: None,
};

const F1_FUNCTIONS: [(u8, CoreFunction); 4] = [
    (
        0o10,
        CoreFunction {
            name: "SWMODE",
            early: None,
            late: Some(swmode),
        },
    ),
    (
        0o13,
        CoreFunction {
            name: "LOADRMR",
            early: None,
            late: Some(loadrmr),
        },
    ),
    (
        0o15,
        CoreFunction {
            name: "LOADESRB",
            early: None,
            late: Some(loadesrb),
        },
    ),
    (
        0o16,
        CoreFunction {
            name: "RSNF",
            early: Some(rsnf),
            late: None,
        },
    ),
];

const F2_FUNCTIONS: [(u8, CoreFunction); 7] = [
    (
        F2_BUSODD,
        CoreFunction {
            name: "BUSODD",
            early: None,
            late: Some(busodd),
        },
    ),
    (F2_MAGIC, CoreFunction::inert("MAGIC")),
    (
        F2_LOADDNS,
        CoreFunction {
            name: "DNS←",
            early: Some(acdest),
            late: Some(loaddns),
        },
    ),
    (
        F2_ACDEST,
        CoreFunction {
            name: "ACDEST",
            early: Some(acdest),
            late: None,
        },
    ),
    (
        F2_LOADIR,
        CoreFunction {
            name: "IR←",
            early: None,
            late: Some(loadir),
        },
    ),
    (
        F2_IDISP,
        CoreFunction {
            name: "IDISP",
            early: None,
            late: Some(idisp),
        },
    ),
    (
        F2_ACSOURCE,
        CoreFunction {
            name: "ACSOURCE",
            early: Some(acsource_early),
            late: Some(acsource_late),
        },
    ),
];

pub(crate) fn install(tables: &mut DispatchTables) {
    let emu = TaskNumber::EMULATOR;
    tables.install(emu, Field::Bs, 0o7, &BS_READ_DISP);
    for (code, f) in &F1_FUNCTIONS {
        tables.install(emu, Field::F1, *code, f);
    }
    for (code, f) in &F2_FUNCTIONS {
        tables.install(emu, Field::F2, *code, f);
    }
}
