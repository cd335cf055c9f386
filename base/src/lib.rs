//! The `base` crate defines the Alto-related things which are useful
//! in both a simulator and other associated tools.  The idea is that
//! if you want to write a microcode assembler or disassembler, it
//! would depend on the base crate but would not need to depend on
//! the simulator library itself.

mod types;

pub mod collections;
pub mod microinstruction;
pub mod prelude;
