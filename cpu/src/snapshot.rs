//! Saving and restoring machine state.
//!
//! A snapshot holds everything the processor owns: the CPU context,
//! the contents of the control RAM, main memory and the timer queue
//! (including the simulated clock and the event id counter).
//! Devices keep their own state and are not included.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use base::prelude::*;

use super::control::Cpu;
use super::memory::MainMemory;
use super::microcode::{LoadError, StoreLayout};
use super::timer::TimerState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub layout: StoreLayout,
    pub cpu: Cpu,
    pub control_ram: Vec<u32>,
    pub memory: MainMemory,
    pub timer: TimerState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    /// The snapshot was taken on a machine with a different
    /// control store.
    LayoutMismatch {
        machine: StoreLayout,
        snapshot: StoreLayout,
    },
    /// The snapshot has a different number of S register banks.
    SBankMismatch { machine: usize, snapshot: usize },
    /// A micro-address in the snapshot lies outside the control
    /// store.
    AddressOutOfRange {
        register: String,
        addr: MicroAddress,
        store_words: usize,
    },
    /// Main memory in the snapshot is the wrong size.
    MemorySize { expected: usize, found: usize },
    ControlRam(LoadError),
}

impl Display for RestoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            RestoreError::LayoutMismatch { machine, snapshot } => write!(
                f,
                "snapshot was taken with a {snapshot} control store but this machine has {machine}"
            ),
            RestoreError::SBankMismatch { machine, snapshot } => write!(
                f,
                "snapshot has {snapshot} S register banks but this machine has {machine}"
            ),
            RestoreError::AddressOutOfRange {
                register,
                addr,
                store_words,
            } => write!(
                f,
                "snapshot {register} is {addr}, outside the {store_words}-word control store"
            ),
            RestoreError::MemorySize { expected, found } => write!(
                f,
                "snapshot main memory has {found} words instead of {expected}"
            ),
            RestoreError::ControlRam(e) => write!(f, "cannot restore control RAM: {e}"),
        }
    }
}

impl Error for RestoreError {}

impl From<LoadError> for RestoreError {
    fn from(e: LoadError) -> RestoreError {
        RestoreError::ControlRam(e)
    }
}
