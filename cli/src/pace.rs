//! Keeps simulated time in step with the wall clock.
use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{event, Level};

/// Paces a simulation.  With a multiplier of 2.0 the simulation is
/// held back to twice real time; with no multiplier it runs as fast
/// as it can.
#[derive(Debug)]
pub struct Pacer {
    multiplier: Option<f64>,
    origin: Instant,
}

impl Pacer {
    pub fn new(multiplier: Option<f64>) -> Pacer {
        Pacer {
            multiplier,
            origin: Instant::now(),
        }
    }

    /// The wall-clock time (since the pacer was created) at which
    /// the simulation should reach `simulated`.
    fn deadline(&self, simulated: Duration) -> Option<Duration> {
        self.multiplier
            .map(|m| Duration::from_secs_f64(simulated.as_secs_f64() / m))
    }

    /// Block until the wall clock catches up with `simulated`.
    pub fn wait_until(&self, simulated: Duration) {
        let Some(deadline) = self.deadline(simulated) else {
            return;
        };
        let elapsed = self.origin.elapsed();
        match deadline.checked_sub(elapsed) {
            Some(ahead) => sleep(ahead),
            None => {
                event!(
                    Level::TRACE,
                    "simulation is {:?} behind the wall clock",
                    elapsed - deadline
                );
            }
        }
    }
}

#[test]
fn test_deadline_scales_with_multiplier() {
    let fast = Pacer::new(Some(4.0));
    assert_eq!(
        fast.deadline(Duration::from_millis(40)),
        Some(Duration::from_millis(10))
    );
    assert_eq!(Pacer::new(None).deadline(Duration::from_secs(1)), None);
}
