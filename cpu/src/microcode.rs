//! The control store: microcode ROM and RAM, plus the two PROMs the
//! datapath consults while executing microinstructions.
//!
//! The store is a flat array of 1024-word pages.  ROM pages come
//! first, then RAM pages.  Words are held in their logical form; the
//! RAM board physically stores some bits inverted, so data moving
//! through RDRAM and WRTRAM is XOR'ed with [`RAM_INVERSION_MASK`].
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use base::prelude::*;

/// Size of the constant PROM, in 16-bit words.
pub const CONSTANT_PROM_WORDS: usize = 256;

/// Size of the emulator's instruction dispatch PROM, in bytes.
pub const DISPATCH_PROM_BYTES: usize = 256;

/// The supported arrangements of control-store ROM and RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StoreLayout {
    /// Alto I: 1K of ROM and 1K of RAM.
    #[default]
    Rom1kRam1k,
    /// Alto II with the 2K ROM option.
    Rom2kRam1k,
    /// Alto II with the 3K RAM option.
    Rom1kRam3k,
}

impl StoreLayout {
    #[must_use]
    pub const fn rom_pages(self) -> usize {
        match self {
            StoreLayout::Rom1kRam1k | StoreLayout::Rom1kRam3k => 1,
            StoreLayout::Rom2kRam1k => 2,
        }
    }

    #[must_use]
    pub const fn ram_pages(self) -> usize {
        match self {
            StoreLayout::Rom1kRam1k | StoreLayout::Rom2kRam1k => 1,
            StoreLayout::Rom1kRam3k => 3,
        }
    }

    #[must_use]
    pub const fn pages(self) -> usize {
        self.rom_pages() + self.ram_pages()
    }

    #[must_use]
    pub const fn words(self) -> usize {
        self.pages() * PAGE_SIZE
    }

    #[must_use]
    pub const fn is_rom_page(self, page: usize) -> bool {
        page < self.rom_pages()
    }

    /// The page in which RAM bank `bank` lives.
    #[must_use]
    pub const fn ram_page(self, bank: usize) -> usize {
        self.rom_pages() + bank
    }
}

impl Display for StoreLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            StoreLayout::Rom1kRam1k => "1K ROM, 1K RAM",
            StoreLayout::Rom2kRam1k => "2K ROM, 1K RAM",
            StoreLayout::Rom1kRam3k => "1K ROM, 3K RAM",
        })
    }
}

impl TryFrom<&str> for StoreLayout {
    type Error = LoadError;

    fn try_from(s: &str) -> Result<StoreLayout, LoadError> {
        match s {
            "1k1k" | "rom1k-ram1k" => Ok(StoreLayout::Rom1kRam1k),
            "2k1k" | "rom2k-ram1k" => Ok(StoreLayout::Rom2kRam1k),
            "1k3k" | "rom1k-ram3k" => Ok(StoreLayout::Rom1kRam3k),
            _ => Err(LoadError::UnknownLayout(s.to_owned())),
        }
    }
}

/// Problems found while building a [`ControlStore`] from images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The microcode image does not hold exactly one word for each
    /// location of the layout.
    WrongImageSize {
        layout: StoreLayout,
        expected: usize,
        got: usize,
    },
    /// A PROM image has the wrong number of entries.
    WrongPromSize {
        prom: &'static str,
        expected: usize,
        got: usize,
    },
    /// A byte image cannot be divided into whole words.
    RaggedImage {
        what: &'static str,
        word_bytes: usize,
        len: usize,
    },
    UnknownLayout(String),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            LoadError::WrongImageSize {
                layout,
                expected,
                got,
            } => write!(
                f,
                "microcode image for a {layout} control store should have {expected} words but has {got}"
            ),
            LoadError::WrongPromSize {
                prom,
                expected,
                got,
            } => write!(
                f,
                "{prom} PROM should have {expected} entries but has {got}"
            ),
            LoadError::RaggedImage {
                what,
                word_bytes,
                len,
            } => write!(
                f,
                "{what} image is {len} bytes long, which is not a multiple of the {word_bytes}-byte word size"
            ),
            LoadError::UnknownLayout(name) => write!(
                f,
                "unknown control store layout '{name}' (expected 1k1k, 2k1k or 1k3k)"
            ),
        }
    }
}

impl Error for LoadError {}

/// Decode a microcode image held as big-endian 32-bit words.
pub fn microcode_words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, LoadError> {
    if bytes.len() % 4 != 0 {
        return Err(LoadError::RaggedImage {
            what: "microcode",
            word_bytes: 4,
            len: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Decode a constant PROM image held as big-endian 16-bit words.
pub fn constant_words_from_bytes(bytes: &[u8]) -> Result<Vec<u16>, LoadError> {
    if bytes.len() % 2 != 0 {
        return Err(LoadError::RaggedImage {
            what: "constant PROM",
            word_bytes: 2,
            len: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

/// The decoded parts of a control-RAM address, as latched from the
/// ALU output by RDRAM and WRTRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRamAddress {
    pub bank: usize,
    pub rom: bool,
    pub high_half: bool,
    pub word: u16,
}

impl From<u16> for ControlRamAddress {
    fn from(a: u16) -> ControlRamAddress {
        ControlRamAddress {
            bank: usize::from((a >> 12) & 0o3),
            rom: (a >> 11) & 1 != 0,
            high_half: (a >> 10) & 1 != 0,
            word: a & PAGE_OFFSET_MASK,
        }
    }
}

pub struct ControlStore {
    layout: StoreLayout,
    words: Vec<u32>,
    constants: Vec<u16>,
    dispatch: Vec<u8>,
}

impl ControlStore {
    /// Build a control store.  `image` holds every page of the
    /// layout (ROM first) in logical form.
    pub fn new(
        layout: StoreLayout,
        image: &[u32],
        constants: &[u16],
        dispatch: &[u8],
    ) -> Result<ControlStore, LoadError> {
        if image.len() != layout.words() {
            return Err(LoadError::WrongImageSize {
                layout,
                expected: layout.words(),
                got: image.len(),
            });
        }
        if constants.len() != CONSTANT_PROM_WORDS {
            return Err(LoadError::WrongPromSize {
                prom: "constant",
                expected: CONSTANT_PROM_WORDS,
                got: constants.len(),
            });
        }
        if dispatch.len() != DISPATCH_PROM_BYTES {
            return Err(LoadError::WrongPromSize {
                prom: "dispatch",
                expected: DISPATCH_PROM_BYTES,
                got: dispatch.len(),
            });
        }
        event!(
            Level::DEBUG,
            "control store loaded: {layout}, {} words",
            image.len()
        );
        Ok(ControlStore {
            layout,
            words: image.to_vec(),
            constants: constants.to_vec(),
            dispatch: dispatch.to_vec(),
        })
    }

    #[must_use]
    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    /// Fetch the microinstruction at `addr`.  Micro-addresses are
    /// only ever formed within pages of the layout.
    #[must_use]
    pub fn fetch(&self, addr: MicroAddress) -> MicroInstruction {
        MicroInstruction::new(self.words[addr.index()])
    }

    #[must_use]
    pub fn constant(&self, address: usize) -> u16 {
        self.constants[address & (CONSTANT_PROM_WORDS - 1)]
    }

    #[must_use]
    pub fn dispatch(&self, address: usize) -> u8 {
        self.dispatch[address & (DISPATCH_PROM_BYTES - 1)]
    }

    /// Read half of a control-store word for RDRAM.  The result is
    /// in the RAM board's physical (partially inverted) form.
    pub fn read_for_rdram(&self, latched: u16) -> u16 {
        let a = ControlRamAddress::from(latched);
        let stored = if a.rom {
            self.words[usize::from(a.word)]
        } else if a.bank < self.layout.ram_pages() {
            self.words[MicroAddress::new(self.layout.ram_page(a.bank), a.word).index()]
        } else {
            event!(
                Level::WARN,
                "RDRAM from RAM bank {} but only {} RAM pages are fitted (address {:06o})",
                a.bank,
                self.layout.ram_pages(),
                latched
            );
            return 0o177777;
        };
        let physical = stored ^ RAM_INVERSION_MASK;
        if a.high_half {
            (physical >> 16) as u16
        } else {
            (physical & 0xFFFF) as u16
        }
    }

    /// Store a word written by WRTRAM.  `high` comes from M and
    /// `low` from the ALU.
    pub fn write_for_wrtram(&mut self, latched: u16, high: u16, low: u16) {
        let a = ControlRamAddress::from(latched);
        if a.rom {
            event!(
                Level::WARN,
                "WRTRAM to ROM (address {:06o}) ignored",
                latched
            );
            return;
        }
        if a.bank >= self.layout.ram_pages() {
            event!(
                Level::WARN,
                "WRTRAM to RAM bank {} but only {} RAM pages are fitted (address {:06o})",
                a.bank,
                self.layout.ram_pages(),
                latched
            );
            return;
        }
        let value = ((u32::from(high) << 16) | u32::from(low)) ^ RAM_INVERSION_MASK;
        let addr = MicroAddress::new(self.layout.ram_page(a.bank), a.word);
        event!(
            Level::TRACE,
            "WRTRAM {addr}: {:011o}",
            value
        );
        self.words[addr.index()] = value;
    }

    /// The contents of all RAM pages, in order.
    #[must_use]
    pub fn ram(&self) -> &[u32] {
        &self.words[self.layout.rom_pages() * PAGE_SIZE..]
    }

    /// Replace the contents of all RAM pages.
    pub fn restore_ram(&mut self, ram: &[u32]) -> Result<(), LoadError> {
        let start = self.layout.rom_pages() * PAGE_SIZE;
        let expected = self.words.len() - start;
        if ram.len() != expected {
            return Err(LoadError::WrongImageSize {
                layout: self.layout,
                expected,
                got: ram.len(),
            });
        }
        self.words[start..].copy_from_slice(ram);
        Ok(())
    }
}

impl std::fmt::Debug for ControlStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("ControlStore")
            .field("layout", &self.layout)
            .field("words", &self.words.len())
            .finish()
    }
}

#[cfg(test)]
fn blank_store(layout: StoreLayout) -> ControlStore {
    ControlStore::new(
        layout,
        &vec![0; layout.words()],
        &[0; CONSTANT_PROM_WORDS],
        &[0; DISPATCH_PROM_BYTES],
    )
    .expect("blank images have the right sizes")
}

#[test]
fn test_image_size_is_checked() {
    let err = ControlStore::new(
        StoreLayout::Rom2kRam1k,
        &[0; 2048],
        &[0; CONSTANT_PROM_WORDS],
        &[0; DISPATCH_PROM_BYTES],
    )
    .expect_err("2K words is too small for 2K ROM plus 1K RAM");
    assert_eq!(
        err,
        LoadError::WrongImageSize {
            layout: StoreLayout::Rom2kRam1k,
            expected: 3072,
            got: 2048
        }
    );
    let err = ControlStore::new(
        StoreLayout::Rom1kRam1k,
        &[0; 2048],
        &[0; 255],
        &[0; DISPATCH_PROM_BYTES],
    )
    .expect_err("short constant PROM");
    assert!(err.to_string().contains("constant PROM"));
}

#[test]
fn test_byte_images() {
    assert_eq!(
        microcode_words_from_bytes(&[0x01, 0x02, 0x03, 0x04, 0xFF, 0, 0, 0]),
        Ok(vec![0x0102_0304, 0xFF00_0000])
    );
    assert!(microcode_words_from_bytes(&[1, 2, 3]).is_err());
    assert_eq!(constant_words_from_bytes(&[0x80, 0x01]), Ok(vec![0x8001]));
    assert!(constant_words_from_bytes(&[0]).is_err());
}

#[test]
fn test_wrtram_rdram_round_trip_every_ram_bank() {
    let layout = StoreLayout::Rom1kRam3k;
    let mut store = blank_store(layout);
    for bank in 0..layout.ram_pages() {
        let base_addr = ((bank as u16) << 12) | 0o1234;
        let high = 0o123456_u16.wrapping_add(bank as u16);
        let low = 0o154321_u16.wrapping_sub(bank as u16);
        store.write_for_wrtram(base_addr, high, low);
        assert_eq!(store.read_for_rdram(base_addr | (1 << 10)), high);
        assert_eq!(store.read_for_rdram(base_addr), low);
        // The instruction fetched from that location is the logical
        // form of what was written.
        let fetched = store.fetch(MicroAddress::new(layout.ram_page(bank), 0o1234));
        assert_eq!(
            fetched.bits(),
            ((u32::from(high) << 16) | u32::from(low)) ^ RAM_INVERSION_MASK
        );
    }
}

#[test]
fn test_control_ram_out_of_range_and_rom() {
    let mut store = blank_store(StoreLayout::Rom1kRam1k);
    // Bank 2 does not exist.
    store.write_for_wrtram(2 << 12, 0o7777, 0o7777);
    assert_eq!(store.read_for_rdram(2 << 12), 0o177777);
    // Writes with the ROM bit set are ignored.
    store.write_for_wrtram(1 << 11, 0o177777, 0o177777);
    assert_eq!(store.fetch(MicroAddress::ZERO).bits(), 0);
    // Reads with the ROM bit set see ROM page 0, in physical form.
    assert_eq!(store.read_for_rdram((1 << 11) | (1 << 10)), (RAM_INVERSION_MASK >> 16) as u16);
    assert!(store.ram().iter().all(|w| *w == 0));
}
