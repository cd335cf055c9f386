//! The Alto's arithmetic and logic unit.
//!
//! The ALU is built from four cascaded SN74181 4-bit slices.  The
//! ALUF field of the microinstruction does not drive the 74181
//! select lines directly; it addresses a small PROM which supplies
//! the mode, the four select lines, the carry-in and a flag saying
//! whether T is loaded from the ALU output or from the bus.
//!
//! The model here works on all 16 bits at once.  In active-high
//! terms each bit of a 74181 computes two intermediate signals
//!
//! ```text
//! X = A | (B & S0) | (~B & S1)
//! Y = (A & B & S3) | (A & ~B & S2)
//! ```
//!
//! In arithmetic mode the output is `X + Y + Cin`; in logic mode it
//! is `~(X ^ Y)`.  The carry out is the carry from the top bit of
//! the arithmetic sum whatever the mode, just as on the chip.
use tracing::{event, Level};

#[cfg(test)]
use test_strategy::proptest;

use base::prelude::*;

/// The 74181's M input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Arithmetic,
    Logic,
}

/// What the ALU produced in one microcycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluOutput {
    pub result: u16,
    pub carry: bool,
    /// When set, a microinstruction with LOAD T set loads T from
    /// the ALU output rather than from the bus.
    pub t_from_alu: bool,
}

/// Evaluate a 16-bit 74181 cascade.  `select` holds S3 in bit 3
/// down to S0 in bit 0.
#[must_use]
pub fn sn74181(a: u16, b: u16, mode: Mode, select: u8, carry_in: bool) -> (u16, bool) {
    let ones = |bit: u8| -> u32 {
        if select & (1 << bit) != 0 {
            0xFFFF
        } else {
            0
        }
    };
    let a = u32::from(a);
    let b = u32::from(b);
    let not_b = !b & 0xFFFF;
    let x = a | (b & ones(0)) | (not_b & ones(1));
    let y = (a & b & ones(3)) | (a & not_b & ones(2));
    let sum = x + y + u32::from(carry_in);
    let carry = sum & 0x1_0000 != 0;
    let f = match mode {
        Mode::Arithmetic => sum,
        Mode::Logic => !(x ^ y),
    };
    ((f & 0xFFFF) as u16, carry)
}

/// Compute the ALU output for function `aluf` applied to `bus` and
/// `t`.  `skip` is the emulator's skip flip-flop, used as the carry
/// in for `BUS+SKIP`.
#[must_use]
pub fn alu(bus: u16, t: u16, aluf: AluFunction, skip: bool) -> AluOutput {
    use Mode::*;
    let (mode, select, carry_in, t_from_alu) = match aluf {
        AluFunction::Bus => (Logic, 0b1111, false, true),
        AluFunction::T => (Logic, 0b1010, false, false),
        AluFunction::BusOrT => (Logic, 0b1110, false, true),
        AluFunction::BusAndT => (Logic, 0b1011, false, false),
        AluFunction::BusXorT => (Logic, 0b0110, false, false),
        AluFunction::BusPlus1 => (Arithmetic, 0b0000, true, true),
        AluFunction::BusMinus1 => (Arithmetic, 0b1111, false, true),
        AluFunction::BusPlusT => (Arithmetic, 0b1001, false, false),
        AluFunction::BusMinusT => (Arithmetic, 0b0110, true, false),
        AluFunction::BusMinusTMinus1 => (Arithmetic, 0b0110, false, false),
        AluFunction::BusPlusTPlus1 => (Arithmetic, 0b1001, true, true),
        AluFunction::BusPlusSkip => (Arithmetic, 0b0000, skip, true),
        AluFunction::BusDotT => (Logic, 0b1011, false, true),
        AluFunction::BusAndNotT => (Logic, 0b0111, false, false),
        AluFunction::Undefined16 | AluFunction::Undefined17 => {
            // The ALU PROM contents for these codes are not
            // documented.  We treat them as BUS AND 0.
            event!(
                Level::WARN,
                "ALU function {:02o} is undefined; result forced to zero",
                aluf.number()
            );
            (Logic, 0b0011, false, false)
        }
    };
    let (result, carry) = sn74181(bus, t, mode, select, carry_in);
    AluOutput {
        result,
        carry,
        t_from_alu,
    }
}

#[cfg(test)]
fn reference(bus: u16, t: u16, aluf: AluFunction, skip: bool) -> (u16, Option<bool>, bool) {
    // Plain integer arithmetic.  The carry is only meaningful for
    // the arithmetic functions, so it is None for the others.
    let wide_bus = u32::from(bus);
    let wide_t = u32::from(t);
    let arith = |sum: u32| ((sum & 0xFFFF) as u16, Some(sum > 0xFFFF));
    let (value, carry) = match aluf {
        AluFunction::Bus => (bus, None),
        AluFunction::T => (t, None),
        AluFunction::BusOrT => (bus | t, None),
        AluFunction::BusAndT | AluFunction::BusDotT => (bus & t, None),
        AluFunction::BusXorT => (bus ^ t, None),
        AluFunction::BusPlus1 => arith(wide_bus + 1),
        AluFunction::BusMinus1 => arith(wide_bus + 0xFFFF),
        AluFunction::BusPlusT => arith(wide_bus + wide_t),
        AluFunction::BusMinusT => arith(wide_bus + (!wide_t & 0xFFFF) + 1),
        AluFunction::BusMinusTMinus1 => arith(wide_bus + (!wide_t & 0xFFFF)),
        AluFunction::BusPlusTPlus1 => arith(wide_bus + wide_t + 1),
        AluFunction::BusPlusSkip => arith(wide_bus + u32::from(skip)),
        AluFunction::BusAndNotT => (bus & !t, None),
        AluFunction::Undefined16 | AluFunction::Undefined17 => (0, Some(false)),
    };
    let t_from_alu = matches!(
        aluf,
        AluFunction::Bus
            | AluFunction::BusOrT
            | AluFunction::BusPlus1
            | AluFunction::BusMinus1
            | AluFunction::BusPlusTPlus1
            | AluFunction::BusPlusSkip
            | AluFunction::BusDotT
    );
    (value, carry, t_from_alu)
}

#[cfg(test)]
#[proptest]
fn alu_matches_integer_arithmetic(
    bus: u16,
    t: u16,
    #[strategy(0..0o20u8)] code: u8,
    skip: bool,
) {
    let aluf = AluFunction::from_bits(code);
    let out = alu(bus, t, aluf, skip);
    let (value, carry, t_from_alu) = reference(bus, t, aluf, skip);
    assert_eq!(
        out.result, value,
        "ALU function {aluf} with BUS={bus:06o} T={t:06o} skip={skip}"
    );
    if let Some(carry) = carry {
        assert_eq!(out.carry, carry, "carry for {aluf} with BUS={bus:06o} T={t:06o}");
    }
    assert_eq!(out.t_from_alu, t_from_alu);
}

#[test]
fn test_alu_function_table_corners() {
    let cases: &[(AluFunction, u16, u16, bool, u16, bool)] = &[
        // (function, bus, t, skip, result, carry)
        (AluFunction::BusPlus1, 0o177777, 0, false, 0, true),
        (AluFunction::BusPlus1, 0o100, 0, false, 0o101, false),
        (AluFunction::BusMinus1, 0, 0, false, 0o177777, false),
        (AluFunction::BusMinus1, 1, 0, false, 0, true),
        (AluFunction::BusPlusT, 0o177777, 1, false, 0, true),
        (AluFunction::BusMinusT, 5, 5, false, 0, true),
        (AluFunction::BusMinusT, 4, 5, false, 0o177777, false),
        (AluFunction::BusMinusTMinus1, 5, 5, false, 0o177777, false),
        (AluFunction::BusPlusTPlus1, 0o77777, 0o77777, false, 0o177777, false),
        (AluFunction::BusPlusSkip, 7, 0, true, 8, false),
        (AluFunction::BusPlusSkip, 7, 0, false, 7, false),
    ];
    for &(aluf, bus, t, skip, result, carry) in cases {
        let out = alu(bus, t, aluf, skip);
        assert_eq!(
            (out.result, out.carry),
            (result, carry),
            "{aluf} BUS={bus:06o} T={t:06o} skip={skip}"
        );
    }
}

#[test]
fn test_logic_functions_ignore_carry_in() {
    for (select, expect) in [
        (0b1111_u8, 0o170360_u16),
        (0b1010, 0o125252),
        (0b1110, 0o175372),
        (0b1011, 0o120240),
        (0b0110, 0o055132),
        (0b0111, 0o050120),
        (0b0011, 0),
    ] {
        for carry_in in [false, true] {
            let (f, _) = sn74181(0o170360, 0o125252, Mode::Logic, select, carry_in);
            assert_eq!(f, expect, "select {select:04b} carry_in {carry_in}");
        }
    }
}

#[test]
fn test_undefined_functions_yield_zero() {
    for aluf in [AluFunction::Undefined16, AluFunction::Undefined17] {
        let out = alu(0o177777, 0o177777, aluf, true);
        assert_eq!(out.result, 0);
        assert!(!out.carry);
        assert!(!out.t_from_alu);
    }
}
