//! Binary and symbolic representations of Alto microinstructions.
//!
//! A microinstruction occupies 32 bits.  Numbering the bits from the
//! most significant (bit 0) to the least significant (bit 31), as the
//! Alto Hardware Manual does, the fields are:
//!
//! | RSEL | ALUF | BS  | F1  | F2  |  T  |  L  | NEXT |
//! |------|------|-----|-----|-----|-----|-----|------|
//! |  5   |  4   |  3  |  4  |  4  |  1  |  1  |  10  |
//! | 0-4  | 5-8  |9-11 |12-15|16-19| 20  | 21  |22-31 |
//!
//! RSEL selects an R (or S) register.  ALUF selects the ALU function.
//! BS chooses the bus source, F1 and F2 select special functions
//! (their meaning partly depends on the task executing the
//! instruction).  T and L request that the T and L registers be
//! loaded.  NEXT gives the address of the following microinstruction
//! within the current 1024-word page.
use std::fmt::{self, Debug, Display, Formatter};

#[cfg(test)]
use test_strategy::{proptest, Arbitrary};

use serde::{Deserialize, Serialize};

use super::types::{ConversionFailed, RegisterSelect};

/// Bits of a microinstruction which the RAM board stores inverted:
/// the most significant bits of F1 and F2, and the LOAD L bit.
pub const RAM_INVERSION_MASK: u32 = (1 << 19) | (1 << 15) | (1 << 10);

/// The three microinstruction fields which select datapath
/// functions.  Each is dispatched through its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Bs,
    F1,
    F2,
}

impl Field {
    /// The number of distinct codes the field can hold.
    #[must_use]
    pub const fn code_count(self) -> usize {
        match self {
            Field::Bs => 8,
            Field::F1 | Field::F2 => 16,
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            Field::Bs => "BS",
            Field::F1 => "F1",
            Field::F2 => "F2",
        })
    }
}

/// The sixteen values of the ALUF field.  The last two are not
/// assigned a function by the ALU PROM.
#[repr(u8)]
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum AluFunction {
    Bus = 0o0,
    T = 0o1,
    BusOrT = 0o2,
    BusAndT = 0o3,
    BusXorT = 0o4,
    BusPlus1 = 0o5,
    BusMinus1 = 0o6,
    BusPlusT = 0o7,
    BusMinusT = 0o10,
    BusMinusTMinus1 = 0o11,
    BusPlusTPlus1 = 0o12,
    BusPlusSkip = 0o13,
    /// `BUS.T`; the same function as `BusAndT`, but T is loaded from
    /// the ALU output.
    BusDotT = 0o14,
    BusAndNotT = 0o15,
    Undefined16 = 0o16,
    Undefined17 = 0o17,
}

impl AluFunction {
    #[must_use]
    pub const fn from_bits(bits: u8) -> AluFunction {
        match bits & 0o17 {
            0o0 => AluFunction::Bus,
            0o1 => AluFunction::T,
            0o2 => AluFunction::BusOrT,
            0o3 => AluFunction::BusAndT,
            0o4 => AluFunction::BusXorT,
            0o5 => AluFunction::BusPlus1,
            0o6 => AluFunction::BusMinus1,
            0o7 => AluFunction::BusPlusT,
            0o10 => AluFunction::BusMinusT,
            0o11 => AluFunction::BusMinusTMinus1,
            0o12 => AluFunction::BusPlusTPlus1,
            0o13 => AluFunction::BusPlusSkip,
            0o14 => AluFunction::BusDotT,
            0o15 => AluFunction::BusAndNotT,
            0o16 => AluFunction::Undefined16,
            _ => AluFunction::Undefined17,
        }
    }

    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }
}

impl Display for AluFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            AluFunction::Bus => "BUS",
            AluFunction::T => "T",
            AluFunction::BusOrT => "BUS OR T",
            AluFunction::BusAndT => "BUS AND T",
            AluFunction::BusXorT => "BUS XOR T",
            AluFunction::BusPlus1 => "BUS+1",
            AluFunction::BusMinus1 => "BUS-1",
            AluFunction::BusPlusT => "BUS+T",
            AluFunction::BusMinusT => "BUS-T",
            AluFunction::BusMinusTMinus1 => "BUS-T-1",
            AluFunction::BusPlusTPlus1 => "BUS+T+1",
            AluFunction::BusPlusSkip => "BUS+SKIP",
            AluFunction::BusDotT => "BUS.T",
            AluFunction::BusAndNotT => "BUS AND NOT T",
            AluFunction::Undefined16 => "ALUF16",
            AluFunction::Undefined17 => "ALUF17",
        })
    }
}

/// A microinstruction in its packed 32-bit form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MicroInstruction(u32);

impl MicroInstruction {
    #[must_use]
    pub const fn new(bits: u32) -> MicroInstruction {
        MicroInstruction(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn rsel(self) -> RegisterSelect {
        RegisterSelect::from_low_bits(self.0 >> 27)
    }

    #[must_use]
    pub const fn aluf(self) -> AluFunction {
        AluFunction::from_bits(((self.0 >> 23) & 0o17) as u8)
    }

    #[must_use]
    pub const fn bs(self) -> u8 {
        ((self.0 >> 20) & 0o7) as u8
    }

    #[must_use]
    pub const fn f1(self) -> u8 {
        ((self.0 >> 16) & 0o17) as u8
    }

    #[must_use]
    pub const fn f2(self) -> u8 {
        ((self.0 >> 12) & 0o17) as u8
    }

    #[must_use]
    pub const fn load_t(self) -> bool {
        (self.0 >> 11) & 1 != 0
    }

    #[must_use]
    pub const fn load_l(self) -> bool {
        (self.0 >> 10) & 1 != 0
    }

    #[must_use]
    pub const fn next(self) -> u16 {
        (self.0 & 0o1777) as u16
    }

    /// The code held in `field`.
    #[must_use]
    pub const fn code(self, field: Field) -> u8 {
        match field {
            Field::Bs => self.bs(),
            Field::F1 => self.f1(),
            Field::F2 => self.f2(),
        }
    }

    /// True when this microinstruction takes its bus value from the
    /// constant PROM.  That happens when either function field holds
    /// 7 or the bus source is 4 or more (in which case the constant
    /// is AND'ed with whatever the bus source supplies).
    #[must_use]
    pub const fn uses_constant(self) -> bool {
        self.f1() == 0o7 || self.f2() == 0o7 || self.bs() >= 4
    }

    /// True when a function field selects the constant path, in
    /// which case no bus source is enabled at all.
    #[must_use]
    pub const fn constant_only(self) -> bool {
        self.f1() == 0o7 || self.f2() == 0o7
    }

    /// The address of this instruction's word in the constant PROM.
    #[must_use]
    pub const fn constant_address(self) -> usize {
        (((self.0 >> 27) as usize) << 3) | self.bs() as usize
    }
}

impl From<u32> for MicroInstruction {
    fn from(bits: u32) -> MicroInstruction {
        MicroInstruction(bits)
    }
}

impl From<MicroInstruction> for u32 {
    fn from(inst: MicroInstruction) -> u32 {
        inst.0
    }
}

impl Debug for MicroInstruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "MicroInstruction({:011o})", self.0)
    }
}

impl Display for MicroInstruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "RSEL={:02o} ALUF={:02o} BS={:o} F1={:02o} F2={:02o} T={} L={} NEXT={:04o}",
            self.rsel(),
            self.aluf().number(),
            self.bs(),
            self.f1(),
            self.f2(),
            u8::from(self.load_t()),
            u8::from(self.load_l()),
            self.next()
        )
    }
}

/// A microinstruction broken down into its component fields.
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolicMicroInstruction {
    #[cfg_attr(test, strategy(0..0o40u8))]
    pub rsel: u8,
    pub aluf: AluFunction,
    #[cfg_attr(test, strategy(0..0o10u8))]
    pub bs: u8,
    #[cfg_attr(test, strategy(0..0o20u8))]
    pub f1: u8,
    #[cfg_attr(test, strategy(0..0o20u8))]
    pub f2: u8,
    pub load_t: bool,
    pub load_l: bool,
    #[cfg_attr(test, strategy(0..0o2000u16))]
    pub next: u16,
}

impl From<MicroInstruction> for SymbolicMicroInstruction {
    fn from(inst: MicroInstruction) -> SymbolicMicroInstruction {
        SymbolicMicroInstruction {
            rsel: inst.rsel().into(),
            aluf: inst.aluf(),
            bs: inst.bs(),
            f1: inst.f1(),
            f2: inst.f2(),
            load_t: inst.load_t(),
            load_l: inst.load_l(),
            next: inst.next(),
        }
    }
}

impl TryFrom<&SymbolicMicroInstruction> for MicroInstruction {
    type Error = ConversionFailed;

    fn try_from(s: &SymbolicMicroInstruction) -> Result<MicroInstruction, ConversionFailed> {
        fn check(what: &'static str, value: u32, limit: u32) -> Result<u32, ConversionFailed> {
            if value > limit {
                Err(ConversionFailed { what, value, limit })
            } else {
                Ok(value)
            }
        }
        let rsel = check("RSEL field", s.rsel.into(), 0o37)?;
        let bs = check("BS field", s.bs.into(), 0o7)?;
        let f1 = check("F1 field", s.f1.into(), 0o17)?;
        let f2 = check("F2 field", s.f2.into(), 0o17)?;
        let next = check("NEXT field", s.next.into(), 0o1777)?;
        Ok(MicroInstruction(
            (rsel << 27)
                | (u32::from(s.aluf.number()) << 23)
                | (bs << 20)
                | (f1 << 16)
                | (f2 << 12)
                | (u32::from(s.load_t) << 11)
                | (u32::from(s.load_l) << 10)
                | next,
        ))
    }
}

#[cfg(test)]
#[proptest]
fn reversible_microinstruction_fields(input: SymbolicMicroInstruction) {
    match MicroInstruction::try_from(&input) {
        Ok(inst) => {
            assert_eq!(SymbolicMicroInstruction::from(inst), input);
        }
        Err(e) => {
            panic!("in-range fields {input:?} could not be packed: {e}");
        }
    }
}

#[test]
fn test_field_extraction() {
    // RSEL=37 ALUF=12 BS=5 F1=13 F2=6 T=1 L=0 NEXT=1234
    let w: u32 = (0o37 << 27) | (0o12 << 23) | (5 << 20) | (0o13 << 16) | (6 << 12) | (1 << 11) | 0o1234;
    let inst = MicroInstruction::new(w);
    assert_eq!(inst.rsel().index(), 0o37);
    assert_eq!(inst.aluf(), AluFunction::BusPlusTPlus1);
    assert_eq!(inst.bs(), 5);
    assert_eq!(inst.f1(), 0o13);
    assert_eq!(inst.f2(), 6);
    assert!(inst.load_t());
    assert!(!inst.load_l());
    assert_eq!(inst.next(), 0o1234);
    assert_eq!(inst.code(Field::F1), 0o13);
    assert!(inst.uses_constant());
    assert!(!inst.constant_only());
    assert_eq!(inst.constant_address(), (0o37 << 3) | 5);
}

#[test]
fn test_out_of_range_field_is_rejected() {
    let s = SymbolicMicroInstruction {
        rsel: 0,
        aluf: AluFunction::Bus,
        bs: 0o10,
        f1: 0,
        f2: 0,
        load_t: false,
        load_l: false,
        next: 0,
    };
    let err = MicroInstruction::try_from(&s).expect_err("BS=010 should not fit");
    assert_eq!(err.what, "BS field");
}
