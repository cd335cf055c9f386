//! Machine configuration.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use base::prelude::*;

use super::microcode::StoreLayout;

/// Describes the hardware options of the simulated machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub layout: StoreLayout,
    /// Number of S register banks: 1 on an Alto I, 8 on an Alto II
    /// with the 3K RAM option.
    pub s_banks: usize,
    /// Tasks other than the emulator which may use the control RAM
    /// and S register functions.
    pub ram_tasks: Vec<TaskNumber>,
    /// Low byte of the Ethernet host address, as read by RSNF.
    pub ethernet_serial: u8,
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration {
            layout: StoreLayout::Rom1kRam1k,
            s_banks: 1,
            ram_tasks: Vec::new(),
            ethernet_serial: 0o42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    BadSBankCount(usize),
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ConfigurationError::BadSBankCount(n) => {
                write!(f, "an Alto has either 1 or 8 S register banks, not {n}")
            }
        }
    }
}

impl Error for ConfigurationError {}

impl Configuration {
    /// The usual configuration of an Alto II with 3K of control RAM.
    #[must_use]
    pub fn alto_ii_3k() -> Configuration {
        Configuration {
            layout: StoreLayout::Rom1kRam3k,
            s_banks: 8,
            ..Configuration::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self.s_banks {
            1 | 8 => Ok(()),
            n => Err(ConfigurationError::BadSBankCount(n)),
        }
    }

    /// True for tasks which have the RAM-related functions.  The
    /// emulator always does.
    #[must_use]
    pub fn is_ram_task(&self, task: TaskNumber) -> bool {
        task == TaskNumber::EMULATOR || self.ram_tasks.contains(&task)
    }
}

#[test]
fn test_validate() {
    assert!(Configuration::default().validate().is_ok());
    assert!(Configuration::alto_ii_3k().validate().is_ok());
    let bad = Configuration {
        s_banks: 3,
        ..Configuration::default()
    };
    assert_eq!(bad.validate(), Err(ConfigurationError::BadSBankCount(3)));
}
