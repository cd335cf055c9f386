//! Conditions the hardware cannot get into.
//!
//! A real Alto cannot execute an undefined function or find no task
//! at all wanting the processor; if the simulator gets there, the
//! microcode image or the device configuration is broken.  We log
//! the diagnostic and stop the process.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use tracing::{event, Level};

use base::prelude::*;

use super::device::Phase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// A microinstruction selected a BS, F1 or F2 code that nothing
    /// implements for the running task.
    UndefinedFunction {
        task: TaskNumber,
        mpc: MicroAddress,
        field: Field,
        code: u8,
        phase: Phase,
    },
    /// `TASK` found no wakeup bit set.
    NoTaskRequesting { task: TaskNumber, mpc: MicroAddress },
    /// Two parties tried to implement the same function.
    ConflictingClaim {
        task: TaskNumber,
        field: Field,
        code: u8,
        claimant: String,
    },
    /// Two devices tried to own the same task.
    TaskAlreadyOwned {
        task: TaskNumber,
        owner: String,
        claimant: String,
    },
    /// A timer event was scheduled from a context with no device
    /// to receive it.
    TimerWithoutOwner { name: String },
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fault::UndefinedFunction {
                task,
                mpc,
                field,
                code,
                phase,
            } => write!(
                f,
                "undefined {field} function {code:02o} for task {task} ({}) at micro-PC {mpc} ({phase} phase)",
                task.name()
            ),
            Fault::NoTaskRequesting { task, mpc } => write!(
                f,
                "TASK at micro-PC {mpc} in task {task} found no task requesting service"
            ),
            Fault::ConflictingClaim {
                task,
                field,
                code,
                claimant,
            } => write!(
                f,
                "{claimant} claimed {field} function {code:02o} of task {task}, but it is already implemented"
            ),
            Fault::TaskAlreadyOwned {
                task,
                owner,
                claimant,
            } => write!(f, "{claimant} claimed task {task}, which already belongs to {owner}"),
            Fault::TimerWithoutOwner { name } => {
                write!(f, "timer event {name} was scheduled with no owning device")
            }
        }
    }
}

impl Error for Fault {}

/// Report a fault and stop.
pub(crate) fn fatal(fault: Fault) -> ! {
    event!(Level::ERROR, "fatal: {fault}");
    panic!("{fault}");
}

#[test]
fn test_undefined_function_names_everything() {
    let fault = Fault::UndefinedFunction {
        task: TaskNumber::DISPLAY_WORD,
        mpc: MicroAddress::new(0, 0o20),
        field: Field::Bs,
        code: 3,
        phase: Phase::Early,
    };
    assert_eq!(
        fault.to_string(),
        "undefined BS function 03 for task 04 (dwt) at micro-PC 0:0020 (early phase)"
    );
}
