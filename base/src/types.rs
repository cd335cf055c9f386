//! Small fixed-width numbers used by the Alto datapath.
//!
//! The hardware is full of narrow fields: a 4-bit task number, a
//! 5-bit register select, a 10-bit NEXT field.  Using bare integers
//! for these makes it far too easy to index the 32-entry R file with
//! a task number, so each gets its own type here.
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter, Octal};

use serde::{Deserialize, Serialize};

/// The number of hardware tasks sharing the datapath.
pub const TASK_COUNT: usize = 16;

/// The number of words in a page of the control store.  A
/// microinstruction's NEXT field can only address words within the
/// page holding that microinstruction.
pub const PAGE_SIZE: usize = 1024;

/// Mask selecting the within-page part of a micro-address.
pub const PAGE_OFFSET_MASK: u16 = 0o1777;

/// Signals that a number is out of range for the type it was being
/// converted into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionFailed {
    pub what: &'static str,
    pub value: u32,
    pub limit: u32,
}

impl Display for ConversionFailed {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "value {:#o} is too large for a {} (maximum is {:#o})",
            self.value, self.what, self.limit
        )
    }
}

impl Error for ConversionFailed {}

/// Identifies one of the sixteen hardware tasks.
///
/// Task assignments follow the Alto II.  Tasks 10 to 15 (octal 12 to
/// 17) have no standard owner and are available to RAM microcode.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskNumber(u8);

impl TaskNumber {
    /// The emulator task runs whenever nothing else wants the
    /// datapath.  Its wakeup is always set.
    pub const EMULATOR: TaskNumber = TaskNumber(0);
    pub const DISK_SECTOR: TaskNumber = TaskNumber(1);
    pub const ETHERNET: TaskNumber = TaskNumber(2);
    pub const MEMORY_REFRESH: TaskNumber = TaskNumber(3);
    pub const DISPLAY_WORD: TaskNumber = TaskNumber(4);
    pub const CURSOR: TaskNumber = TaskNumber(5);
    pub const DISPLAY_HORIZONTAL: TaskNumber = TaskNumber(6);
    pub const DISPLAY_VERTICAL: TaskNumber = TaskNumber(7);
    pub const PARITY: TaskNumber = TaskNumber(8);
    pub const DISK_WORD: TaskNumber = TaskNumber(9);
    pub const MAX: TaskNumber = TaskNumber(15);

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The bit representing this task in the wakeup bitmask.
    #[must_use]
    pub const fn mask(self) -> u16 {
        1_u16 << self.0
    }

    /// Enumerate all the tasks, lowest number first.
    pub fn all() -> impl Iterator<Item = TaskNumber> {
        (0..TASK_COUNT as u8).map(TaskNumber)
    }

    /// The mnemonic used for this task in Alto documentation.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "emu",
            1 => "ksec",
            2 => "ether",
            3 => "mrt",
            4 => "dwt",
            5 => "curt",
            6 => "dht",
            7 => "dvt",
            8 => "part",
            9 => "kwd",
            _ => "spare",
        }
    }
}

impl TryFrom<u8> for TaskNumber {
    type Error = ConversionFailed;

    fn try_from(n: u8) -> Result<TaskNumber, ConversionFailed> {
        if usize::from(n) < TASK_COUNT {
            Ok(TaskNumber(n))
        } else {
            Err(ConversionFailed {
                what: "task number",
                value: n.into(),
                limit: (TASK_COUNT - 1) as u32,
            })
        }
    }
}

impl TryFrom<u32> for TaskNumber {
    type Error = ConversionFailed;

    fn try_from(n: u32) -> Result<TaskNumber, ConversionFailed> {
        match u8::try_from(n) {
            Ok(small) => TaskNumber::try_from(small),
            Err(_) => Err(ConversionFailed {
                what: "task number",
                value: n,
                limit: (TASK_COUNT - 1) as u32,
            }),
        }
    }
}

impl From<TaskNumber> for u8 {
    fn from(t: TaskNumber) -> u8 {
        t.0
    }
}

impl From<TaskNumber> for usize {
    fn from(t: TaskNumber) -> usize {
        t.index()
    }
}

impl Display for TaskNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:02o}", self.0)
    }
}

impl Debug for TaskNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "TaskNumber({:02o} {})", self.0, self.name())
    }
}

/// The 5-bit register select field.  It indexes the 32 R registers
/// and (for RAM-related tasks) the 32 registers of an S bank.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RegisterSelect(u8);

impl RegisterSelect {
    pub const ZERO: RegisterSelect = RegisterSelect(0);

    /// Keep only the bottom 5 bits of `bits`.
    #[must_use]
    pub const fn from_low_bits(bits: u32) -> RegisterSelect {
        RegisterSelect((bits & 0o37) as u8)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Replace the two least significant bits.  The emulator's
    /// ACSOURCE and ACDEST functions use this to select one of the
    /// four Nova accumulators.
    #[must_use]
    pub const fn with_low_two_bits(self, bits: u8) -> RegisterSelect {
        RegisterSelect((self.0 & 0o34) | (bits & 0o3))
    }
}

impl From<RegisterSelect> for u8 {
    fn from(r: RegisterSelect) -> u8 {
        r.0
    }
}

impl Octal for RegisterSelect {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        Octal::fmt(&self.0, f)
    }
}

impl Debug for RegisterSelect {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "R{:02o}", self.0)
    }
}

/// A full control-store address: a page number and a 10-bit offset
/// within the page.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MicroAddress(u16);

impl MicroAddress {
    pub const ZERO: MicroAddress = MicroAddress(0);

    #[must_use]
    pub const fn new(page: usize, offset: u16) -> MicroAddress {
        MicroAddress(((page * PAGE_SIZE) as u16) | (offset & PAGE_OFFSET_MASK))
    }

    #[must_use]
    pub const fn page(self) -> usize {
        self.0 as usize / PAGE_SIZE
    }

    #[must_use]
    pub const fn offset(self) -> u16 {
        self.0 & PAGE_OFFSET_MASK
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The address with `bits` OR'ed into the within-page offset.
    /// The page never changes.
    #[must_use]
    pub const fn or_offset(self, bits: u16) -> MicroAddress {
        MicroAddress(self.0 | (bits & PAGE_OFFSET_MASK))
    }

    /// The address in the same page as `self` at offset `offset`.
    #[must_use]
    pub const fn in_same_page(self, offset: u16) -> MicroAddress {
        MicroAddress::new(self.page(), offset)
    }

    /// The address at the same offset within page `page`.
    #[must_use]
    pub const fn in_page(self, page: usize) -> MicroAddress {
        MicroAddress::new(page, self.offset())
    }
}

impl Octal for MicroAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        Octal::fmt(&self.0, f)
    }
}

impl Display for MicroAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:o}:{:04o}", self.page(), self.offset())
    }
}

impl Debug for MicroAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "MicroAddress({self})")
    }
}

#[test]
fn test_task_number_range() {
    assert!(TaskNumber::try_from(15_u8).is_ok());
    assert!(TaskNumber::try_from(16_u8).is_err());
    assert!(TaskNumber::try_from(0x1_0000_u32).is_err());
    assert_eq!(TaskNumber::all().count(), TASK_COUNT);
    assert_eq!(TaskNumber::DISPLAY_VERTICAL.mask(), 0o200);
    assert_eq!(TaskNumber::DISK_WORD.to_string(), "11");
}

#[test]
fn test_register_select_accumulator_bits() {
    let r = RegisterSelect::from_low_bits(0o77);
    assert_eq!(r.index(), 0o37);
    assert_eq!(r.with_low_two_bits(0).index(), 0o34);
    assert_eq!(RegisterSelect::ZERO.with_low_two_bits(0o7).index(), 0o3);
}

#[test]
fn test_micro_address_stays_in_page() {
    let a = MicroAddress::new(2, 0o1770);
    assert_eq!(a.page(), 2);
    assert_eq!(a.or_offset(0o17).offset(), 0o1777);
    assert_eq!(a.or_offset(0o7777).page(), 2);
    assert_eq!(a.in_page(0).index(), 0o1770);
    assert_eq!(a.in_same_page(5).to_string(), "2:0005");
}
