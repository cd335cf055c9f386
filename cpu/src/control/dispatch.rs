//! Function dispatch tables.
//!
//! The meaning of a BS, F1 or F2 code depends on the task executing
//! the microinstruction, and each function has an early-phase and a
//! late-phase part.  So there is one table per field, indexed by
//! phase, task and code.  Codes which nothing implements are
//! `Undefined`; executing one is fatal.
use std::fmt::{self, Debug, Formatter};

use base::prelude::*;

use crate::device::{Datapath, DeviceId, FunctionSlot, Phase};
use crate::fault::{fatal, Fault};

pub(crate) type CoreFn = for<'a, 'b> fn(&'a mut Datapath<'b>);

/// What to do for one (phase, task, code) combination.
#[derive(Clone, Copy)]
pub(crate) enum Handler {
    /// The function has no effect in this phase.
    Idle,
    Core(&'static str, CoreFn),
    Device(DeviceId),
    Undefined,
}

impl Debug for Handler {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Handler::Idle => f.write_str("Idle"),
            Handler::Core(name, _) => write!(f, "Core({name})"),
            Handler::Device(id) => write!(f, "Device({id})"),
            Handler::Undefined => f.write_str("Undefined"),
        }
    }
}

/// A function implemented by the processor itself.
pub(crate) struct CoreFunction {
    pub(crate) name: &'static str,
    pub(crate) early: Option<CoreFn>,
    pub(crate) late: Option<CoreFn>,
}

impl CoreFunction {
    /// A function which does nothing in either phase (for example
    /// F1 code 0, or the constant codes whose effect is handled by
    /// the engine).
    pub(crate) const fn inert(name: &'static str) -> CoreFunction {
        CoreFunction {
            name,
            early: None,
            late: None,
        }
    }
}

const PHASES: usize = 2;
const BS_CODES: usize = Field::Bs.code_count();
const F1_CODES: usize = Field::F1.code_count();
const F2_CODES: usize = Field::F2.code_count();

pub(crate) struct DispatchTables {
    bs: [[[Handler; BS_CODES]; TASK_COUNT]; PHASES],
    f1: [[[Handler; F1_CODES]; TASK_COUNT]; PHASES],
    f2: [[[Handler; F2_CODES]; TASK_COUNT]; PHASES],
}

fn phase_index(phase: Phase) -> usize {
    match phase {
        Phase::Early => 0,
        Phase::Late => 1,
    }
}

impl DispatchTables {
    /// Tables with every slot undefined.
    pub(crate) fn empty() -> DispatchTables {
        DispatchTables {
            bs: [[[Handler::Undefined; BS_CODES]; TASK_COUNT]; PHASES],
            f1: [[[Handler::Undefined; F1_CODES]; TASK_COUNT]; PHASES],
            f2: [[[Handler::Undefined; F2_CODES]; TASK_COUNT]; PHASES],
        }
    }

    pub(crate) fn lookup(&self, phase: Phase, slot: FunctionSlot) -> Handler {
        let p = phase_index(phase);
        let t = slot.task.index();
        let c = usize::from(slot.code);
        match slot.field {
            Field::Bs => self.bs[p][t][c % BS_CODES],
            Field::F1 => self.f1[p][t][c % F1_CODES],
            Field::F2 => self.f2[p][t][c % F2_CODES],
        }
    }

    fn slot_mut(&mut self, phase: Phase, slot: FunctionSlot) -> &mut Handler {
        let p = phase_index(phase);
        let t = slot.task.index();
        let c = usize::from(slot.code);
        match slot.field {
            Field::Bs => &mut self.bs[p][t][c % BS_CODES],
            Field::F1 => &mut self.f1[p][t][c % F1_CODES],
            Field::F2 => &mut self.f2[p][t][c % F2_CODES],
        }
    }

    pub(crate) fn is_defined(&self, slot: FunctionSlot) -> bool {
        !matches!(self.lookup(Phase::Early, slot), Handler::Undefined)
    }

    fn set(&mut self, slot: FunctionSlot, early: Handler, late: Handler, claimant: String) {
        if self.is_defined(slot) {
            fatal(Fault::ConflictingClaim {
                task: slot.task,
                field: slot.field,
                code: slot.code,
                claimant,
            });
        }
        *self.slot_mut(Phase::Early, slot) = early;
        *self.slot_mut(Phase::Late, slot) = late;
    }

    pub(crate) fn install(&mut self, task: TaskNumber, field: Field, code: u8, f: &CoreFunction) {
        let as_handler = |run: Option<CoreFn>| match run {
            Some(run) => Handler::Core(f.name, run),
            None => Handler::Idle,
        };
        self.set(
            FunctionSlot::new(task, field, code),
            as_handler(f.early),
            as_handler(f.late),
            format!("core function {}", f.name),
        );
    }

    /// Route a slot to a device.
    pub(crate) fn claim(&mut self, slot: FunctionSlot, device: DeviceId, name: String) {
        self.set(slot, Handler::Device(device), Handler::Device(device), name);
    }
}

impl Debug for DispatchTables {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let defined = |table: &[[Handler; F1_CODES]]| -> usize {
            table
                .iter()
                .flatten()
                .filter(|h| !matches!(h, Handler::Undefined))
                .count()
        };
        let bs_defined: usize = self.bs[0]
            .iter()
            .flatten()
            .filter(|h| !matches!(h, Handler::Undefined))
            .count();
        f.debug_struct("DispatchTables")
            .field("bs_defined", &bs_defined)
            .field("f1_defined", &defined(&self.f1[0]))
            .field("f2_defined", &defined(&self.f2[0]))
            .finish()
    }
}

#[cfg(test)]
fn nothing(_dp: &mut Datapath<'_>) {}

#[test]
fn test_install_and_lookup() {
    let mut tables = DispatchTables::empty();
    let slot = FunctionSlot::new(TaskNumber::CURSOR, Field::F2, 0o11);
    assert!(!tables.is_defined(slot));
    tables.install(
        TaskNumber::CURSOR,
        Field::F2,
        0o11,
        &CoreFunction {
            name: "test",
            early: None,
            late: Some(nothing),
        },
    );
    assert!(tables.is_defined(slot));
    assert!(matches!(tables.lookup(Phase::Early, slot), Handler::Idle));
    assert!(matches!(tables.lookup(Phase::Late, slot), Handler::Core("test", _)));
    // Other tasks are unaffected.
    assert!(!tables.is_defined(FunctionSlot::new(TaskNumber::EMULATOR, Field::F2, 0o11)));
}

#[test]
fn test_every_code_has_a_slot() {
    let mut tables = DispatchTables::empty();
    for field in [Field::Bs, Field::F1, Field::F2] {
        for code in 0..field.code_count() {
            let code = u8::try_from(code).expect("field codes fit in a byte");
            let slot = FunctionSlot::new(TaskNumber::DISK_SECTOR, field, code);
            tables.claim(slot, DeviceId::new(0), format!("{field} {code:o}"));
            assert!(matches!(tables.lookup(Phase::Late, slot), Handler::Device(_)));
        }
    }
    // Every slot was distinct, so none of the claims conflicted.
    assert!(!tables.is_defined(FunctionSlot::new(TaskNumber::EMULATOR, Field::F1, 0o17)));
}

#[test]
#[should_panic(expected = "already implemented")]
fn test_conflicting_claim_is_fatal() {
    let mut tables = DispatchTables::empty();
    let slot = FunctionSlot::new(TaskNumber::ETHERNET, Field::Bs, 3);
    tables.claim(slot, DeviceId::new(0), "first".to_string());
    tables.claim(slot, DeviceId::new(1), "second".to_string());
}
