use std::time::Duration;

use test_strategy::proptest;

use base::prelude::*;

use super::*;
use crate::config::Configuration;
use crate::device::DeviceManager;
use crate::memory::MainMemory;
use crate::microcode::{ControlStore, CONSTANT_PROM_WORDS, DISPATCH_PROM_BYTES};
use crate::timer::Timer;

/// Builds microinstructions for the tests.  Unless told otherwise
/// an instruction has no bus source and no functions, uses ALU
/// function BUS and loads nothing.
#[derive(Debug, Clone, Copy)]
struct Op(SymbolicMicroInstruction);

impl Op {
    fn new(next: u16) -> Op {
        Op(SymbolicMicroInstruction {
            rsel: 0,
            aluf: AluFunction::Bus,
            bs: 2,
            f1: 0,
            f2: 0,
            load_t: false,
            load_l: false,
            next,
        })
    }

    fn rsel(mut self, rsel: u8) -> Op {
        self.0.rsel = rsel;
        self
    }

    fn aluf(mut self, aluf: AluFunction) -> Op {
        self.0.aluf = aluf;
        self
    }

    fn bs(mut self, bs: u8) -> Op {
        self.0.bs = bs;
        self
    }

    fn f1(mut self, f1: u8) -> Op {
        self.0.f1 = f1;
        self
    }

    fn f2(mut self, f2: u8) -> Op {
        self.0.f2 = f2;
        self
    }

    fn load_t(mut self) -> Op {
        self.0.load_t = true;
        self
    }

    fn load_l(mut self) -> Op {
        self.0.load_l = true;
        self
    }

    fn word(self) -> u32 {
        MicroInstruction::try_from(&self.0)
            .expect("test microinstruction fields should be in range")
            .bits()
    }
}

struct Rig {
    control: ControlUnit,
    memory: MainMemory,
    timer: Timer,
    devices: DeviceManager,
}

impl Rig {
    fn new(config: Configuration, program: &[(MicroAddress, Op)], constants: &[(usize, u16)]) -> Rig {
        Rig::with_dispatch(config, program, constants, &[])
    }

    fn with_dispatch(
        config: Configuration,
        program: &[(MicroAddress, Op)],
        constants: &[(usize, u16)],
        dispatch: &[(usize, u8)],
    ) -> Rig {
        let mut image = vec![0_u32; config.layout.words()];
        for (addr, op) in program {
            image[addr.index()] = op.word();
        }
        let mut prom = vec![0o177777_u16; CONSTANT_PROM_WORDS];
        for (addr, value) in constants {
            prom[*addr] = *value;
        }
        let mut dprom = vec![0_u8; DISPATCH_PROM_BYTES];
        for (addr, value) in dispatch {
            dprom[*addr] = *value;
        }
        let store = ControlStore::new(config.layout, &image, &prom, &dprom)
            .expect("test images should have the right sizes");
        Rig {
            control: ControlUnit::new(config, store),
            memory: MainMemory::new(),
            timer: Timer::new(),
            devices: DeviceManager::new(),
        }
    }

    fn step(&mut self, cycles: u32) -> Duration {
        self.control.execute(
            CYCLE * cycles,
            &mut self.memory,
            &mut self.timer,
            &mut self.devices,
        )
    }

    fn cpu(&self) -> &Cpu {
        &self.control.cpu
    }

    fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.control.cpu
    }

    /// Make `task` the running task, about to execute `addr`.
    fn start_task(&mut self, task: TaskNumber, addr: MicroAddress) {
        let cpu = self.cpu_mut();
        cpu.task = task;
        cpu.next_task = task;
        cpu.next2_task = task;
        cpu.next = addr;
        cpu.next2 = 0;
    }
}

fn rom(offset: u16) -> MicroAddress {
    MicroAddress::new(0, offset)
}

#[proptest]
fn next_address_stays_in_page(
    #[strategy(0..0o2000u16)] start: u16,
    #[strategy(0..0o2000u16)] next: u16,
    branch: u16,
) {
    // ←R, BUS: branch on the low bits of R1.
    let here = MicroAddress::new(1, start);
    let mut rig = Rig::new(
        Configuration::default(),
        &[(here, Op::new(next).bs(0).rsel(1).f2(0o4))],
        &[],
    );
    rig.start_task(TaskNumber::EMULATOR, here);
    rig.cpu_mut().r[1] = branch;
    assert_eq!(rig.step(1), CYCLE);
    let expected = MicroAddress::new(1, next | (branch & 0o1777));
    assert_eq!(rig.cpu().next.or_offset(rig.cpu().next2), expected);
    rig.step(1);
    assert_eq!(rig.cpu().mpc, expected);
    assert_eq!(rig.cpu().mpc.page(), 1);
}

#[test]
fn test_task_switch_is_deferred_one_instruction() {
    let mut rig = Rig::new(
        Configuration::default(),
        &[
            (rom(0), Op::new(1).f1(0o2)),
            (rom(1), Op::new(2)),
            (rom(2), Op::new(2)),
            (rom(4), Op::new(4)),
        ],
        &[],
    );
    rig.cpu_mut().wake(TaskNumber::DISPLAY_WORD);
    rig.step(1);
    // TASK has sampled the wakeups, but the emulator keeps the
    // processor for one more instruction.
    assert_eq!(rig.cpu().task, TaskNumber::EMULATOR);
    assert_eq!(rig.cpu().next_task, TaskNumber::DISPLAY_WORD);
    rig.step(1);
    assert_eq!(rig.cpu().mpc, rom(1));
    assert_eq!(rig.cpu().task, TaskNumber::DISPLAY_WORD);
    assert_eq!(rig.cpu().tasks[0].next, rom(2));
    rig.step(1);
    assert_eq!(rig.cpu().mpc, rom(4));
    assert_eq!(rig.cpu().tasks[4].elapsed, CYCLE);
}

#[test]
fn test_no_switch_when_only_emulator_requests() {
    let mut rig = Rig::new(
        Configuration::default(),
        &[(rom(0), Op::new(1).f1(0o2)), (rom(1), Op::new(0))],
        &[],
    );
    rig.step(5);
    assert_eq!(rig.cpu().task, TaskNumber::EMULATOR);
    assert_eq!(rig.cpu().tasks[0].elapsed, CYCLE * 5);
}

#[test]
fn test_block_clears_own_wakeup() {
    let mut rig = Rig::new(
        Configuration::default(),
        &[(rom(0o100), Op::new(0o100).f1(0o3))],
        &[],
    );
    rig.cpu_mut().wake(TaskNumber::CURSOR);
    rig.start_task(TaskNumber::CURSOR, rom(0o100));
    rig.step(1);
    assert_eq!(rig.cpu().wakeups, TaskNumber::EMULATOR.mask());
}

#[test]
fn test_wrtram_then_rdram_through_microcode() {
    const HIGH: u16 = 0o123456;
    const LOW: u16 = 0o076543;
    const ADDR: u16 = 0o123;
    let program = [
        // L← (and M←) HIGH.
        (rom(0), Op::new(1).rsel(1).f1(0o7).load_l()),
        // WRTRAM with the address on the ALU.
        (rom(1), Op::new(2).rsel(2).f1(0o11).f2(0o7)),
        // The ALU supplies the low half of the word.
        (rom(2), Op::new(3).rsel(3).f2(0o7)),
        // RDRAM, high half.
        (rom(3), Op::new(4).rsel(4).f1(0o12).f2(0o7)),
        (rom(4), Op::new(5).load_l()),
        // RDRAM, low half.
        (rom(5), Op::new(6).rsel(2).f1(0o12).f2(0o7)),
        (rom(6), Op::new(7).load_t()),
        (rom(7), Op::new(7)),
    ];
    let constants = [
        (0o12, HIGH),
        (0o22, ADDR),
        (0o32, LOW),
        (0o42, ADDR | 0o2000),
    ];
    let mut rig = Rig::new(Configuration::default(), &program, &constants);
    rig.step(7);
    assert_eq!(rig.cpu().l, HIGH);
    assert_eq!(rig.cpu().t, LOW);
    let stored = rig.control.store().fetch(MicroAddress::new(1, ADDR));
    assert_eq!(
        stored.bits(),
        ((u32::from(HIGH) << 16) | u32::from(LOW)) ^ RAM_INVERSION_MASK
    );
}

#[test]
fn test_md_read_stalls_until_data_ready() {
    let mut rig = Rig::new(
        Configuration::default(),
        &[
            (rom(0), Op::new(1).rsel(1).f1(0o1).f2(0o7)),
            (rom(1), Op::new(2).bs(0o5).load_l()),
            (rom(2), Op::new(2)),
        ],
        &[(0o12, 0o1000)],
    );
    rig.memory.poke(0o1000, 0o4321);
    rig.step(2);
    assert_eq!(rig.cpu().mpc, rom(1));
    assert_eq!(rig.cpu().l, 0);
    rig.step(1);
    assert_eq!(rig.cpu().mpc, rom(1));
    assert_eq!(rig.cpu().l, 0o4321);
    rig.step(1);
    assert_eq!(rig.cpu().mpc, rom(2));
}

#[test]
fn test_loadir_and_dispatch() {
    // A non-arithmetic instruction dispatches through the PROM.
    let ir: u16 = 0o020000;
    let mut rig = Rig::with_dispatch(
        Configuration::default(),
        &[
            (rom(0), Op::new(1).bs(0).rsel(1).f2(0o14)),
            (rom(1), Op::new(0o20).f2(0o15)),
        ],
        &[],
        &[(0o240, 0o7)],
    );
    rig.cpu_mut().r[1] = ir;
    rig.step(1);
    assert_eq!(rig.cpu().emulator.ir, ir);
    assert_eq!(rig.cpu().next2, 0);
    rig.step(1);
    assert_eq!(rig.cpu().next.or_offset(rig.cpu().next2), rom(0o27));

    // An arithmetic instruction branches on IR[0], IR[5-7] and then
    // on its shift field.
    let ir: u16 = 0o100200;
    let mut rig = Rig::new(
        Configuration::default(),
        &[
            (rom(0), Op::new(1).bs(0).rsel(1).f2(0o14)),
            (rom(0o11), Op::new(0o20).f2(0o15)),
        ],
        &[],
    );
    rig.cpu_mut().r[1] = ir;
    rig.step(1);
    assert_eq!(rig.cpu().next.or_offset(rig.cpu().next2), rom(0o11));
    rig.step(1);
    assert_eq!(rig.cpu().next.or_offset(rig.cpu().next2), rom(0o21));
}

#[test]
fn test_acsource_selects_accumulator() {
    // IR[1-2] = 2 selects AC2, which lives in R1 (the complement).
    let mut rig = Rig::new(
        Configuration::default(),
        &[(rom(0), Op::new(0).bs(0).f2(0o16).load_t())],
        &[],
    );
    rig.cpu_mut().emulator.ir = 0o040000;
    rig.cpu_mut().r[1] = 0o555;
    rig.step(1);
    assert_eq!(rig.cpu().rsel.index(), 1);
    assert_eq!(rig.cpu().t, 0o555);
}

#[test]
fn test_dns_shift_carry_and_skip() {
    // ADD-class instruction: destination AC1, carry field "set",
    // skip SNC, left shift.
    let ir: u16 = 0o104043;
    let op = Op::new(0).bs(0o1).f1(0o4).f2(0o12);
    let mut rig = Rig::new(Configuration::default(), &[(rom(0), op)], &[]);
    rig.cpu_mut().emulator.ir = ir;
    rig.cpu_mut().l = 0o100001;
    rig.step(1);
    assert_eq!(rig.cpu().r[2], 0o3);
    assert!(rig.cpu().emulator.carry);
    assert!(rig.cpu().emulator.skip);

    // The same with the no-load bit set.
    let mut rig = Rig::new(Configuration::default(), &[(rom(0), op)], &[]);
    rig.cpu_mut().emulator.ir = ir | 0o10;
    rig.cpu_mut().l = 0o100001;
    rig.step(1);
    assert_eq!(rig.cpu().r[2], 0);
    assert!(!rig.cpu().emulator.carry);
    assert!(rig.cpu().emulator.skip);
}

#[test]
fn test_magic_shifts_in_t() {
    let mut rig = Rig::new(
        Configuration::default(),
        &[
            (rom(0), Op::new(1).bs(0o1).rsel(5).f1(0o4).f2(0o11)),
            (rom(1), Op::new(1).bs(0o1).rsel(6).f1(0o5).f2(0o11)),
        ],
        &[],
    );
    rig.cpu_mut().l = 0o000100;
    rig.cpu_mut().t = 0o100001;
    rig.step(2);
    assert_eq!(rig.cpu().r[5], 0o000201);
    assert_eq!(rig.cpu().r[6], 0o100040);
}

#[test]
fn test_disp_sign_extension() {
    for (ir, expected) in [(0o000377_u16, 0o377_u16), (0o000777, 0o177777), (0o001177, 0o177)] {
        let mut rig = Rig::new(
            Configuration::default(),
            &[(rom(0), Op::new(0).bs(0o7).load_t())],
            &[],
        );
        rig.cpu_mut().emulator.ir = ir;
        rig.step(1);
        assert_eq!(rig.cpu().t, expected, "IR={ir:06o}");
    }
}

#[test]
fn test_rsnf_reads_serial_number() {
    let mut rig = Rig::new(
        Configuration::default(),
        &[(rom(0), Op::new(0).f1(0o16).load_t())],
        &[],
    );
    rig.step(1);
    assert_eq!(rig.cpu().t, 0o177400 | 0o42);
}

#[test]
fn test_s_registers_and_bank_select() {
    let mut rig = Rig::new(
        Configuration::alto_ii_3k(),
        &[
            // Select S bank 3.
            (rom(0), Op::new(1).rsel(1).f1(0o15).f2(0o7)),
            // M← 0o707.
            (rom(1), Op::new(2).rsel(2).f2(0o7).load_l()),
            // S5← M.
            (rom(2), Op::new(3).rsel(5).bs(0o4)),
            // T← S5.
            (rom(3), Op::new(3).rsel(5).bs(0o3).load_t()),
        ],
        &[(0o12, 0o6), (0o22, 0o707)],
    );
    rig.step(4);
    assert_eq!(rig.cpu().tasks[0].s_bank, 3);
    assert_eq!(rig.cpu().s[3][5], 0o707);
    assert_eq!(rig.cpu().t, 0o707);
}

#[test]
fn test_swmode_changes_page() {
    let config = Configuration::alto_ii_3k();
    let mut rig = Rig::new(
        config,
        &[
            (rom(0), Op::new(0o205).f1(0o10)),
            (MicroAddress::new(2, 0o205), Op::new(0o3).f1(0o10)),
        ],
        &[],
    );
    rig.step(1);
    assert_eq!(rig.cpu().next, MicroAddress::new(2, 0o205));
    rig.step(1);
    assert_eq!(rig.cpu().mpc, MicroAddress::new(2, 0o205));
    assert_eq!(rig.cpu().next, rom(0o3));
}

#[test]
fn test_alu_carry_branch_uses_latched_carry() {
    let mut rig = Rig::new(
        Configuration::default(),
        &[
            // L← BUS+1 with BUS all ones: carry.
            (rom(0), Op::new(1).aluf(AluFunction::BusPlus1).load_l()),
            (rom(1), Op::new(0o10).f2(0o5)),
        ],
        &[],
    );
    rig.step(2);
    assert!(rig.cpu().laluc0);
    assert_eq!(rig.cpu().next.or_offset(rig.cpu().next2), rom(0o11));
}

#[test]
fn test_wrtram_uses_m_from_before_the_latch() {
    // The instruction which commits the write also loads L (and so
    // M); the stored high half must still be the old M.
    let mut rig = Rig::new(
        Configuration::default(),
        &[
            (rom(0), Op::new(1).rsel(1).f1(0o7).load_l()),
            (rom(1), Op::new(2).rsel(2).f1(0o11).f2(0o7)),
            (rom(2), Op::new(3).rsel(3).f2(0o7).load_l()),
            (rom(3), Op::new(3)),
        ],
        &[(0o12, 0o1111), (0o22, 0o10), (0o32, 0o2222)],
    );
    rig.step(3);
    assert_eq!(rig.cpu().m, 0o2222);
    assert_eq!(rig.control.store().read_for_rdram(0o2010), 0o1111);
    assert_eq!(rig.control.store().read_for_rdram(0o10), 0o2222);
}

#[test]
#[should_panic(expected = "undefined BS function 03 for task 04")]
fn test_undefined_bus_source_is_fatal() {
    let mut rig = Rig::new(
        Configuration::default(),
        &[(rom(0o100), Op::new(0o100).bs(0o3))],
        &[],
    );
    rig.start_task(TaskNumber::DISPLAY_WORD, rom(0o100));
    rig.step(1);
}

#[test]
#[should_panic(expected = "undefined F1 function 03 for task 00 (emu) at micro-PC 0:0000")]
fn test_emulator_has_no_block() {
    let mut rig = Rig::new(Configuration::default(), &[(rom(0), Op::new(0).f1(0o3))], &[]);
    rig.step(1);
}

#[test]
#[should_panic(expected = "found no task requesting service")]
fn test_task_with_no_wakeups_is_fatal() {
    let mut rig = Rig::new(Configuration::default(), &[(rom(0), Op::new(0).f1(0o2))], &[]);
    rig.cpu_mut().wakeups = 0;
    rig.step(1);
}

#[test]
fn test_ram_task_functions_follow_configuration() {
    let config = Configuration {
        ram_tasks: vec![TaskNumber::try_from(0o12_u8).expect("valid task")],
        ..Configuration::default()
    };
    let spare = TaskNumber::try_from(0o12_u8).expect("valid task");
    let mut rig = Rig::new(
        config,
        &[
            (rom(0o200), Op::new(0o201).rsel(1).f1(0o13).f2(0o7)),
            (rom(0o201), Op::new(0o201).rsel(7).bs(0o3).load_t()),
        ],
        &[(0o12, 0o177777)],
    );
    rig.start_task(spare, rom(0o200));
    rig.step(2);
    // A single S bank, so LOADSRB wraps to bank 0.
    assert_eq!(rig.cpu().tasks[spare.index()].s_bank, 0);
    assert_eq!(rig.cpu().t, 0);
}

#[test]
fn test_budget_smaller_than_a_cycle_runs_nothing() {
    let mut rig = Rig::new(Configuration::default(), &[], &[]);
    assert_eq!(rig.step(0), Duration::ZERO);
    let consumed = rig.control.execute(
        Duration::from_nanos(169),
        &mut rig.memory,
        &mut rig.timer,
        &mut rig.devices,
    );
    assert_eq!(consumed, Duration::ZERO);
    assert_eq!(rig.cpu().cycles, 0);
}
