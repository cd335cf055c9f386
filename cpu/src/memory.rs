//! This module emulates the Alto's main memory.
//!
//! The Alto has 64K words of 16-bit main memory.  The processor
//! talks to it through two registers: MAR (memory address register)
//! and MD (memory data).  A microinstruction starts an access with
//! `MAR←`; the data becomes available two cycles later, and the
//! microcode reads it with `←MD` or supplies data to be written with
//! `MD←`.  Every access actually moves a pair of words: the word at
//! MAR and its partner at `MAR ^ 1`.  The second `←MD` (or `MD←`)
//! of an access therefore refers to the partner word.
//!
//! Microinstructions which touch memory too early do not fail; the
//! processor simply holds them (a "stall") until the memory is
//! ready.
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

pub const MEMORY_WORDS: usize = 1 << 16;

/// Cycles from `MAR←` until MD may be read or written.
const DATA_READY_CYCLES: u64 = 2;

/// Cycles from `MAR←` until another `MAR←` may be issued.
const ACCESS_CYCLES: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Access {
    mar: u16,
    started: u64,
    reads: u8,
    writes: u8,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainMemory {
    words: Vec<u16>,
    access: Option<Access>,
}

impl Default for MainMemory {
    fn default() -> Self {
        MainMemory::new()
    }
}

impl MainMemory {
    #[must_use]
    pub fn new() -> MainMemory {
        MainMemory {
            words: vec![0; MEMORY_WORDS],
            access: None,
        }
    }

    /// The number of words held.  Always `MEMORY_WORDS` unless the
    /// memory came from a damaged snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[must_use]
    pub fn peek(&self, addr: u16) -> u16 {
        self.words[usize::from(addr)]
    }

    pub fn poke(&mut self, addr: u16, value: u16) {
        self.words[usize::from(addr)] = value;
    }

    /// True if a `MAR←` in cycle `cycle` must wait for the previous
    /// access to finish.
    #[must_use]
    pub fn address_stall(&self, cycle: u64) -> bool {
        matches!(self.access, Some(a) if cycle < a.started + ACCESS_CYCLES)
    }

    /// True if `←MD` or `MD←` in cycle `cycle` must wait for the data.
    #[must_use]
    pub fn data_stall(&self, cycle: u64) -> bool {
        matches!(self.access, Some(a) if cycle < a.started + DATA_READY_CYCLES)
    }

    /// `MAR←`: start an access to `addr` in cycle `cycle`.
    pub fn start(&mut self, addr: u16, cycle: u64) {
        event!(Level::TRACE, "MAR← {:06o} in cycle {}", addr, cycle);
        self.access = Some(Access {
            mar: addr,
            started: cycle,
            reads: 0,
            writes: 0,
        });
    }

    /// `←MD`.
    pub fn read(&mut self) -> u16 {
        match self.access.as_mut() {
            Some(a) => {
                let addr = if a.reads == 0 { a.mar } else { a.mar ^ 1 };
                a.reads = a.reads.saturating_add(1);
                self.words[usize::from(addr)]
            }
            None => {
                event!(Level::WARN, "←MD with no memory access in progress");
                0o177777
            }
        }
    }

    /// `MD←`.
    pub fn write(&mut self, value: u16) {
        match self.access.as_mut() {
            Some(a) => {
                let addr = if a.writes == 0 { a.mar } else { a.mar ^ 1 };
                a.writes = a.writes.saturating_add(1);
                self.words[usize::from(addr)] = value;
            }
            None => {
                event!(
                    Level::WARN,
                    "MD← {:06o} with no memory access in progress; ignored",
                    value
                );
            }
        }
    }
}

impl std::fmt::Debug for MainMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainMemory")
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

#[test]
fn test_access_timing() {
    let mut mem = MainMemory::new();
    assert!(!mem.address_stall(0));
    assert!(!mem.data_stall(0));
    mem.start(0o1000, 10);
    assert!(mem.data_stall(11));
    assert!(!mem.data_stall(12));
    assert!(mem.address_stall(13));
    assert!(!mem.address_stall(14));
}

#[test]
fn test_double_word_access() {
    let mut mem = MainMemory::new();
    mem.poke(0o2000, 0o111);
    mem.poke(0o2001, 0o222);
    mem.start(0o2001, 1);
    assert_eq!(mem.read(), 0o222);
    assert_eq!(mem.read(), 0o111);
    mem.start(0o3000, 5);
    mem.write(0o7);
    mem.write(0o10);
    assert_eq!(mem.peek(0o3000), 0o7);
    assert_eq!(mem.peek(0o3001), 0o10);
}

#[test]
fn test_read_without_access() {
    let mut mem = MainMemory::new();
    assert_eq!(mem.read(), 0o177777);
    mem.write(5);
    assert_eq!(mem.peek(0), 0);
}
