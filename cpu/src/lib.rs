//! This crate emulates the Xerox Alto's microprogrammed processor:
//! the microcycle execution engine shared by sixteen hardware tasks,
//! and the discrete-event timer which drives peripheral logic.
#![crate_name = "cpu"]

mod alto;
mod alu;
mod config;
mod control;
mod device;
mod fault;
mod memory;
mod microcode;
mod snapshot;
mod timer;

pub use alto::{Alto, BuildError};
pub use alu::{alu, sn74181, AluOutput, Mode};
pub use config::{Configuration, ConfigurationError};
pub use control::timing::{cycles_covering, round_up_to_cycle, CYCLE, CYCLE_NS};
pub use control::{ControlUnit, Cpu, EmulatorState, TaskContext, TaskState, REGISTER_COUNT};
pub use device::{Datapath, Device, DeviceId, DeviceManager, FunctionSlot, Phase};
pub use fault::Fault;
pub use memory::{MainMemory, MEMORY_WORDS};
pub use microcode::{
    constant_words_from_bytes, microcode_words_from_bytes, ControlRamAddress, ControlStore,
    LoadError, StoreLayout, CONSTANT_PROM_WORDS, DISPATCH_PROM_BYTES,
};
pub use snapshot::{RestoreError, Snapshot};
pub use timer::{Timer, TimerEvent, TimerId, TimerState};
