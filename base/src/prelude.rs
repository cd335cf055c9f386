//! The prelude exports the types which are useful in representing
//! things to do with the Alto's microprogrammed processor.
pub use super::microinstruction::*;
pub use super::types::*;
