//! Microcycle timing.
//!
//! Every microinstruction takes one cycle of the processor clock,
//! 170 nanoseconds on the Alto II.  Simulated time only ever
//! advances in whole cycles while microcode is running.
use std::time::Duration;

pub const CYCLE_NS: u64 = 170;
pub const CYCLE: Duration = Duration::from_nanos(CYCLE_NS);

/// The number of whole cycles needed to cover `d`.
#[must_use]
pub fn cycles_covering(d: Duration) -> u64 {
    let ns = d.as_nanos();
    let cycles = ns.div_ceil(u128::from(CYCLE_NS));
    u64::try_from(cycles).unwrap_or(u64::MAX)
}

/// `d` rounded up to a whole number of cycles.
#[must_use]
pub fn round_up_to_cycle(d: Duration) -> Duration {
    Duration::from_nanos(cycles_covering(d).saturating_mul(CYCLE_NS))
}

#[test]
fn test_round_up_to_cycle() {
    assert_eq!(round_up_to_cycle(Duration::ZERO), Duration::ZERO);
    assert_eq!(round_up_to_cycle(Duration::from_nanos(1)), CYCLE);
    assert_eq!(round_up_to_cycle(CYCLE), CYCLE);
    assert_eq!(round_up_to_cycle(Duration::from_nanos(171)), CYCLE * 2);
    assert_eq!(cycles_covering(Duration::from_micros(17)), 100);
}
