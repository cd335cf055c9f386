//! Discrete-event timer.
//!
//! Peripheral logic does not run on every microcycle.  Instead each
//! device schedules a callback for the simulated time at which it
//! next needs attention (the end of a disk sector, a display
//! scanline, the arrival of an Ethernet packet).  The timer keeps
//! those events in fire-time order and owns the simulated clock.
//!
//! The execution engine runs in slices.  When an event becomes due
//! inside the running slice, the timer raises its "leave" flag so
//! that the engine stops at the next microcycle boundary and the
//! host can fire the event.
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use base::collections::pq::EarliestFirstQueue;

use super::device::DeviceId;

/// Identifies a scheduled event.  Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(u64);

impl Display for TimerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "#{}", self.0)
    }
}

/// A pending event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerEvent {
    pub id: TimerId,
    pub when: Duration,
    pub owner: DeviceId,
    pub arg: i32,
    pub name: String,
}

/// Serialisable image of the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub now: Duration,
    pub slice_end: Duration,
    pub leave: bool,
    pub next_id: u64,
    pub events: Vec<TimerEvent>,
}

#[derive(Debug, Default)]
pub struct Timer {
    now: Duration,
    slice_end: Duration,
    leave: bool,
    next_id: u64,
    // Equal fire times are broken by id, giving insertion order.
    queue: EarliestFirstQueue<TimerId, (Duration, TimerId)>,
    events: BTreeMap<TimerId, TimerEvent>,
}

impl Timer {
    #[must_use]
    pub fn new() -> Timer {
        Timer::default()
    }

    /// The current simulated time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now
    }

    pub(crate) fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    pub(crate) fn set_now(&mut self, now: Duration) {
        self.now = now;
    }

    /// Schedule an event `delay` after the current simulated time.
    pub fn insert(&mut self, owner: DeviceId, delay: Duration, arg: i32, name: &str) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let when = self.now + delay;
        if when <= self.slice_end {
            self.leave = true;
        }
        event!(
            Level::TRACE,
            "timer: scheduled {name} {id} for {owner} at {when:?} (arg {arg})"
        );
        self.queue.push(id, (when, id));
        self.events.insert(
            id,
            TimerEvent {
                id,
                when,
                owner,
                arg,
                name: name.to_owned(),
            },
        );
        id
    }

    /// Cancel a pending event.  Returns false if there is no such
    /// event (perhaps because it already fired).
    pub fn remove(&mut self, id: TimerId) -> bool {
        match self.events.remove(&id) {
            Some(ev) => {
                self.queue.remove(&id);
                event!(Level::TRACE, "timer: cancelled {} {id}", ev.name);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.events.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn next_due_time(&self) -> Option<Duration> {
        self.queue.peek().map(|(_, (when, _))| *when)
    }

    /// How long until the earliest pending event falls due.  Zero
    /// if an event is already due.
    #[must_use]
    pub fn time_until_next(&self) -> Option<Duration> {
        self.next_due_time()
            .map(|when| when.saturating_sub(self.now))
    }

    /// Remove and return the earliest event, if it is due.
    pub(crate) fn pop_due(&mut self) -> Option<TimerEvent> {
        match self.next_due_time() {
            Some(when) if when <= self.now => {
                let (id, _) = self.queue.pop()?;
                self.events.remove(&id)
            }
            _ => None,
        }
    }

    /// Note the start of an execution slice of length `budget`.
    pub(crate) fn begin_slice(&mut self, budget: Duration) {
        self.slice_end = self.now + budget;
        self.leave = false;
    }

    /// True when the engine should return at the next microcycle
    /// boundary: either an event was inserted inside the running
    /// slice, or the earliest pending event is due.
    #[must_use]
    pub fn leave_requested(&self) -> bool {
        self.leave || matches!(self.next_due_time(), Some(when) if when <= self.now)
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        TimerState {
            now: self.now,
            slice_end: self.slice_end,
            leave: self.leave,
            next_id: self.next_id,
            events: self.events.values().cloned().collect(),
        }
    }

    #[must_use]
    pub fn from_state(state: TimerState) -> Timer {
        let mut queue = EarliestFirstQueue::new();
        let mut events = BTreeMap::new();
        for ev in state.events {
            queue.push(ev.id, (ev.when, ev.id));
            events.insert(ev.id, ev);
        }
        Timer {
            now: state.now,
            slice_end: state.slice_end,
            leave: state.leave,
            next_id: state.next_id,
            queue,
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_strategy::proptest;

    use super::super::device::DeviceId;
    use super::{Timer, TimerEvent};

    fn ns(n: u64) -> Duration {
        Duration::from_nanos(n)
    }

    fn drain(timer: &mut Timer) -> Vec<TimerEvent> {
        std::iter::from_fn(|| timer.pop_due()).collect()
    }

    #[proptest]
    fn events_fire_in_time_then_insertion_order(
        #[strategy(proptest::collection::vec(0..2000u64, 0..40))] delays: Vec<u64>,
        #[strategy(0..3000u64)] now: u64,
    ) {
        let mut timer = Timer::new();
        let ids: Vec<_> = delays
            .iter()
            .map(|d| timer.insert(DeviceId::new(0), ns(*d), 0, "t"))
            .collect();
        timer.set_now(ns(now));
        let fired = drain(&mut timer);
        for ev in &fired {
            assert!(ev.when <= ns(now), "{ev:?} fired before it was due");
        }
        for pair in fired.windows(2) {
            assert!((pair[0].when, pair[0].id) < (pair[1].when, pair[1].id));
        }
        let expected_count = delays.iter().filter(|d| **d <= now).count();
        assert_eq!(fired.len(), expected_count);
        assert_eq!(timer.len(), delays.len() - expected_count);
        for (id, d) in ids.iter().zip(delays.iter()) {
            assert_eq!(timer.is_pending(*id), *d > now);
        }
    }

    #[test]
    fn test_equal_times_fire_in_insertion_order() {
        let mut timer = Timer::new();
        let a = timer.insert(DeviceId::new(1), ns(100), 1, "a");
        let b = timer.insert(DeviceId::new(0), ns(100), 2, "b");
        let c = timer.insert(DeviceId::new(2), ns(50), 3, "c");
        timer.set_now(ns(100));
        let order: Vec<_> = drain(&mut timer).into_iter().map(|e| e.id).collect();
        assert_eq!(order, vec![c, a, b]);
    }

    #[test]
    fn test_remove() {
        let mut timer = Timer::new();
        let a = timer.insert(DeviceId::new(0), ns(10), 0, "a");
        let b = timer.insert(DeviceId::new(0), ns(20), 0, "b");
        assert!(timer.remove(a));
        assert!(!timer.remove(a));
        assert_eq!(timer.time_until_next(), Some(ns(20)));
        timer.set_now(ns(30));
        assert_eq!(timer.time_until_next(), Some(Duration::ZERO));
        assert_eq!(drain(&mut timer).len(), 1);
        assert!(!timer.remove(b));
        assert_eq!(timer.time_until_next(), None);
    }

    #[test]
    fn test_leave_flag() {
        let mut timer = Timer::new();
        timer.begin_slice(ns(1700));
        assert!(!timer.leave_requested());
        // Beyond the end of the slice: no need to stop early.
        timer.insert(DeviceId::new(0), ns(2000), 0, "late");
        assert!(!timer.leave_requested());
        // Inside the slice.
        timer.insert(DeviceId::new(0), ns(1700), 0, "inside");
        assert!(timer.leave_requested());
        // A new slice only leaves at once if something is due now.
        timer.begin_slice(ns(170));
        assert!(!timer.leave_requested());
        timer.insert(DeviceId::new(0), Duration::ZERO, 0, "now");
        assert!(timer.leave_requested());
        timer.begin_slice(ns(170));
        assert!(timer.leave_requested());
    }

    #[test]
    fn test_queued_event_requests_leave_once_due() {
        let mut timer = Timer::new();
        timer.insert(DeviceId::new(0), ns(500), 0, "queued");
        timer.begin_slice(ns(1700));
        assert!(!timer.leave_requested());
        timer.advance(ns(340));
        assert!(!timer.leave_requested());
        timer.advance(ns(170));
        assert!(timer.leave_requested());
    }

    #[test]
    fn test_state_round_trip_preserves_order() {
        let mut timer = Timer::new();
        timer.insert(DeviceId::new(3), ns(40), 7, "x");
        timer.insert(DeviceId::new(4), ns(40), 8, "y");
        timer.advance(ns(10));
        let mut copy = Timer::from_state(timer.state());
        assert_eq!(copy.state(), timer.state());
        copy.set_now(ns(40));
        timer.set_now(ns(40));
        assert_eq!(drain(&mut copy), drain(&mut timer));
        // The id counter carries over, so new ids don't collide.
        let next = copy.insert(DeviceId::new(0), ns(1), 0, "z");
        assert_eq!(next, timer.insert(DeviceId::new(0), ns(1), 0, "z"));
    }
}
